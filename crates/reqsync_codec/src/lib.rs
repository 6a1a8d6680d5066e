//! # reqsync codec
//!
//! Dynamic field values and canonical CBOR encoding for reqsync.
//!
//! [`Value`] is the shared currency of the workspace: entity dictionary
//! projections (snapshots, backups) and remote record fields are both
//! expressed with it. Encoding is deterministic so identical projections
//! produce identical bytes.
//!
//! ## Usage
//!
//! ```
//! use reqsync_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::empty_map().with("name", "GET").with("isCustom", false);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::from_cbor;
pub use encoder::to_canonical_cbor;
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
