//! Record error types.

use thiserror::Error;

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised while building or reading records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Wire encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] reqsync_codec::CodecError),

    /// Addressing or model error.
    #[error(transparent)]
    Core(#[from] reqsync_core::CoreError),

    /// A required field is absent.
    #[error("{record_type} record is missing field {field:?}")]
    MissingField {
        /// Record type.
        record_type: String,
        /// Field name.
        field: String,
    },

    /// A field holds a different kind of payload than expected.
    #[error("field {field:?} is not a {expected}")]
    WrongFieldKind {
        /// Field name.
        field: String,
        /// Expected payload kind.
        expected: &'static str,
    },

    /// The record type names no known entity.
    #[error("unknown record type {name:?}")]
    UnknownRecordType {
        /// The record type.
        name: String,
    },
}

impl RecordError {
    /// Creates a missing field error.
    pub fn missing_field(record_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            record_type: record_type.into(),
            field: field.into(),
        }
    }

    /// Creates a wrong field kind error.
    pub fn wrong_kind(field: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongFieldKind {
            field: field.into(),
            expected,
        }
    }
}
