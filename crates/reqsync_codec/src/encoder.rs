//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;

/// Encode a value to canonical CBOR bytes.
///
/// Output is deterministic:
/// - map keys are emitted in canonical order (length-first, then bytewise)
/// - integers use the shortest encoding
/// - all items have definite length
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(&to_cbor(value), &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

fn to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer((*n).into()),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor).collect()),
        Value::Map(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| Value::cmp_canonical_keys(a.0, b.0));
            Cbor::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (Cbor::Text(k.clone()), to_cbor(v)))
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integer_single_byte() {
        assert_eq!(to_canonical_cbor(&Value::Integer(10)).unwrap(), vec![0x0a]);
    }

    #[test]
    fn map_keys_emitted_length_first() {
        let value = Value::empty_map().with("bb", 1i64).with("c", 2i64);
        let bytes = to_canonical_cbor(&value).unwrap();
        // map(2), "c" first (shorter), then "bb"
        assert_eq!(bytes[0], 0xa2);
        assert_eq!(&bytes[1..3], &[0x61, b'c']);
    }

    #[test]
    fn deterministic_output() {
        let a = Value::empty_map().with("x", "1").with("y", true);
        let b = Value::empty_map().with("y", true).with("x", "1");
        assert_eq!(to_canonical_cbor(&a).unwrap(), to_canonical_cbor(&b).unwrap());
    }
}
