//! Error taxonomy for the cancellation engine.
//!
//! Internal failures are typed and thrown to drive the fallback loop; the
//! public initiation entry point intercepts every variant and converts it
//! into a structured result before crossing the API boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;
use crate::types::Method;

/// Stable machine-readable error codes carried in failed outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    AlreadyCancelled,
    CancellationInProgress,
    AllMethodsFailed,
    FallbackDisabled,
    UnsupportedMethod,
    OrchestrationFailed,
    SchedulingValidationFailed,
    RequestNotFound,
}

impl ErrorCode {
    /// Get the wire representation of this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyCancelled => "ALREADY_CANCELLED",
            Self::CancellationInProgress => "CANCELLATION_IN_PROGRESS",
            Self::AllMethodsFailed => "ALL_METHODS_FAILED",
            Self::FallbackDisabled => "FALLBACK_DISABLED",
            Self::UnsupportedMethod => "UNSUPPORTED_METHOD",
            Self::OrchestrationFailed => "ORCHESTRATION_FAILED",
            Self::SchedulingValidationFailed => "SCHEDULING_VALIDATION_FAILED",
            Self::RequestNotFound => "REQUEST_NOT_FOUND",
        }
    }
}

/// Errors raised inside the cancellation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("subscription is already cancelled")]
    AlreadyCancelled,

    #[error("a cancellation is already in progress for this subscription")]
    InProgress,

    #[error("all cancellation methods failed: {0}")]
    AllMethodsFailed(String),

    #[error("fallback disabled, {0} method failed: {1}")]
    FallbackDisabled(Method, String),

    #[error("method {0} is not supported for this provider")]
    UnsupportedMethod(Method),

    #[error("orchestration failed: {0}")]
    Orchestration(String),

    #[error("scheduled time must be strictly in the future")]
    InvalidSchedule,

    #[error("cancellation request not found or not in an eligible state")]
    RequestNotFound,

    #[error(transparent)]
    Storage(StorageError),
}

impl EngineError {
    /// Map this error to its stable wire code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyCancelled => ErrorCode::AlreadyCancelled,
            Self::InProgress => ErrorCode::CancellationInProgress,
            Self::AllMethodsFailed(_) => ErrorCode::AllMethodsFailed,
            Self::FallbackDisabled(_, _) => ErrorCode::FallbackDisabled,
            Self::UnsupportedMethod(_) => ErrorCode::UnsupportedMethod,
            Self::Orchestration(_) => ErrorCode::OrchestrationFailed,
            Self::InvalidSchedule => ErrorCode::SchedulingValidationFailed,
            Self::RequestNotFound => ErrorCode::RequestNotFound,
            Self::Storage(e) => match e {
                StorageError::ActiveRequestExists(_) => ErrorCode::CancellationInProgress,
                _ => ErrorCode::OrchestrationFailed,
            },
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        // A uniqueness violation is the authoritative in-progress signal.
        match e {
            StorageError::ActiveRequestExists(_) => Self::InProgress,
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorCode::CancellationInProgress.as_str(), "CANCELLATION_IN_PROGRESS");
        assert_eq!(ErrorCode::AllMethodsFailed.as_str(), "ALL_METHODS_FAILED");
        assert_eq!(
            serde_json::to_string(&ErrorCode::FallbackDisabled).unwrap(),
            "\"FALLBACK_DISABLED\""
        );
    }

    #[test]
    fn test_uniqueness_violation_maps_to_in_progress() {
        let err: EngineError = StorageError::ActiveRequestExists("sub-1".to_string()).into();
        assert_eq!(err.code(), ErrorCode::CancellationInProgress);
    }

    #[test]
    fn test_storage_failure_maps_to_orchestration_failed() {
        let err: EngineError = StorageError::Unavailable("down".to_string()).into();
        assert_eq!(err.code(), ErrorCode::OrchestrationFailed);
    }
}
