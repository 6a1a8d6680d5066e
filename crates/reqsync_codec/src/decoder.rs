//! CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;
use std::collections::BTreeMap;

/// Decode CBOR bytes into a [`Value`].
///
/// # Errors
///
/// Returns an error for malformed input, floats, tags, non-text map keys,
/// or integers outside the `i64` range.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let cbor: Cbor = ciborium::de::from_reader(bytes)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    from_cbor_value(cbor)
}

fn from_cbor_value(cbor: Cbor) -> CodecResult<Value> {
    match cbor {
        Cbor::Null => Ok(Value::Null),
        Cbor::Bool(b) => Ok(Value::Bool(b)),
        Cbor::Integer(n) => i64::try_from(n)
            .map(Value::Integer)
            .map_err(|_| CodecError::IntegerOverflow),
        Cbor::Bytes(b) => Ok(Value::Bytes(b)),
        Cbor::Text(s) => Ok(Value::Text(s)),
        Cbor::Float(_) => Err(CodecError::FloatForbidden),
        Cbor::Array(items) => items
            .into_iter()
            .map(from_cbor_value)
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        Cbor::Map(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                let Cbor::Text(key) = k else {
                    return Err(CodecError::invalid_structure("map keys must be text"));
                };
                map.insert(key, from_cbor_value(v)?);
            }
            Ok(Value::Map(map))
        }
        Cbor::Tag(tag, _) => Err(CodecError::unsupported_type(format!("tag {tag}"))),
        _ => Err(CodecError::unsupported_type("unknown")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_float() {
        // half-precision float 1.0
        assert_eq!(from_cbor(&[0xf9, 0x3c, 0x00]), Err(CodecError::FloatForbidden));
    }

    #[test]
    fn rejects_integer_map_keys() {
        // {1: 2}
        assert!(matches!(
            from_cbor(&[0xa1, 0x01, 0x02]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(
            from_cbor(&[0x62, b'a']),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn rejects_u64_beyond_i64() {
        let bytes = [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(from_cbor(&bytes), Err(CodecError::IntegerOverflow));
    }
}
