//! Codec errors.

use thiserror::Error;

/// Result alias used across the codec.
pub type CodecResult<T> = Result<T, CodecError>;

/// Failure turning a [`Value`](crate::Value) into CBOR bytes or back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// ciborium rejected the value while writing.
    #[error("cannot encode value: {message}")]
    EncodingFailed {
        /// Writer error text.
        message: String,
    },

    /// The input is not well-formed CBOR.
    #[error("cannot decode bytes: {message}")]
    DecodingFailed {
        /// Reader error text.
        message: String,
    },

    /// Dictionaries and records carry no floats.
    #[error("floats are not allowed in reqsync documents")]
    FloatForbidden,

    /// Well-formed CBOR of the wrong shape: a non-text map key, a missing
    /// field, or a field of the wrong type.
    #[error("unexpected document shape: {message}")]
    InvalidStructure {
        /// What was expected.
        message: String,
    },

    /// A CBOR item the value model has no variant for.
    #[error("no value variant for CBOR {type_name}")]
    UnsupportedType {
        /// CBOR item name.
        type_name: String,
    },

    /// An integer outside the `i64` range.
    #[error("integer out of i64 range")]
    IntegerOverflow,
}

impl CodecError {
    /// [`CodecError::EncodingFailed`] from any message.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// [`CodecError::DecodingFailed`] from any message.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// [`CodecError::InvalidStructure`] from any message.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// [`CodecError::UnsupportedType`] naming the CBOR item.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// A required map field is absent.
    pub fn missing_field(name: &str) -> Self {
        Self::invalid_structure(format!("missing field `{name}`"))
    }
}
