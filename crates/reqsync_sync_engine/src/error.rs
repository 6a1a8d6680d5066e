//! Error types for the sync engine.

use reqsync_core::ZoneHandle;
use reqsync_record::Conflict;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote partition of a workspace does not exist.
    #[error("zone {zone} does not exist")]
    ZoneMissing {
        /// The absent zone.
        zone: ZoneHandle,
    },

    /// The remote record changed since it was last read.
    #[error("record conflict on {}", .0.key)]
    RecordConflict(Box<Conflict>),

    /// A temporary asset file could not be written or read.
    #[error("asset I/O error: {message}")]
    AssetIo {
        /// Error message.
        message: String,
    },

    /// The record store rejected a write.
    #[error("save failed: {message}")]
    SaveFailure {
        /// Error message.
        message: String,
    },

    /// Local store or addressing error.
    #[error("local store error: {0}")]
    Core(#[from] reqsync_core::CoreError),

    /// Wire codec error.
    #[error("codec error: {0}")]
    Codec(#[from] reqsync_codec::CodecError),

    /// Malformed record.
    #[error("record error: {0}")]
    Record(#[from] reqsync_record::RecordError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an asset I/O error.
    pub fn asset_io(message: impl ToString) -> Self {
        Self::AssetIo {
            message: message.to_string(),
        }
    }

    /// Creates a save failure.
    pub fn save_failure(message: impl Into<String>) -> Self {
        Self::SaveFailure {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(conflict: Conflict) -> Self {
        Self::RecordConflict(Box::new(conflict))
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { retryable: true, .. })
    }

    /// Returns true for malformed ids and unknown type tags, including
    /// those surfacing through record decoding.
    pub fn is_addressing(&self) -> bool {
        match self {
            SyncError::Core(e) | SyncError::Record(reqsync_record::RecordError::Core(e)) => {
                e.is_addressing()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::{CoreError, EntityKind, TypedId};

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(!SyncError::save_failure("quota").is_retryable());
    }

    #[test]
    fn error_display() {
        let zone = reqsync_core::zone_of(&TypedId::mint(EntityKind::Workspace)).unwrap();
        let err = SyncError::ZoneMissing { zone: zone.clone() };
        assert!(err.to_string().contains(zone.name()));

        let err = SyncError::asset_io("disk full");
        assert_eq!(err.to_string(), "asset I/O error: disk full");
    }

    #[test]
    fn addressing_passes_through() {
        let err = SyncError::from(CoreError::UnknownTypeTag { tag: "zz".into() });
        assert!(err.is_addressing());
        assert!(!SyncError::save_failure("x").is_addressing());
    }
}
