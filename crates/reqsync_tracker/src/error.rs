//! Error types for edit tracking.

use reqsync_core::{CoreError, TypedId};
use thiserror::Error;

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors raised by edit sessions and their tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracked request does not exist in the session's context.
    #[error("request not found: {0}")]
    RequestNotFound(TypedId),

    /// The rescheduler's worker thread could not be started.
    #[error("rescheduler unavailable: {message}")]
    SchedulerUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// Store error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl TrackerError {
    /// Creates a scheduler error.
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::SchedulerUnavailable {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::EntityKind;

    #[test]
    fn display() {
        let id = TypedId::mint(EntityKind::Request);
        let err = TrackerError::RequestNotFound(id.clone());
        assert_eq!(err.to_string(), format!("request not found: {id}"));
        assert!(TrackerError::scheduler("spawn failed")
            .to_string()
            .contains("spawn failed"));
    }

    #[test]
    fn from_core() {
        let err: TrackerError = CoreError::invalid_operation("nope").into();
        assert!(matches!(err, TrackerError::Core(_)));
    }
}
