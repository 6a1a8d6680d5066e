//! Error types for reqsync core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in reqsync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Field codec error.
    #[error("codec error: {0}")]
    Codec(#[from] reqsync_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Identifier is malformed.
    #[error("invalid id {id:?}: {reason}")]
    InvalidId {
        /// The offending identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Identifier carries a type tag no entity uses.
    #[error("unknown type tag {tag:?}")]
    UnknownTypeTag {
        /// The two-character tag.
        tag: String,
    },

    /// Identifier names a different entity type than the caller expected.
    #[error("id {id} is not a {expected}")]
    KindMismatch {
        /// The identifier.
        id: String,
        /// The expected record type.
        expected: &'static str,
    },

    /// Entity not found.
    #[error("entity not found: {id}")]
    EntityNotFound {
        /// The entity id that was not found.
        id: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Key material could not be obtained from the key provider.
    #[error("key unavailable: {message}")]
    KeyUnavailable {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid id error.
    pub fn invalid_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an entity not found error.
    pub fn not_found(id: impl ToString) -> Self {
        Self::EntityNotFound { id: id.to_string() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates a key unavailable error.
    pub fn key_unavailable(message: impl Into<String>) -> Self {
        Self::KeyUnavailable {
            message: message.into(),
        }
    }

    /// Returns true for malformed ids and unknown type tags.
    pub fn is_addressing(&self) -> bool {
        matches!(
            self,
            Self::InvalidId { .. } | Self::UnknownTypeTag { .. } | Self::KindMismatch { .. }
        )
    }
}
