//! Method executors.
//!
//! Each executor wraps exactly one external collaborator behind a uniform
//! result contract: it maps the collaborator response into [`MethodOutcome`],
//! writes one success/failure audit entry, and on failure raises a typed
//! [`ExecutorError`] so the chain executor can apply fallback policy.

pub mod api;
pub mod automation;
pub mod manual;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Method, NotificationPreferences, Priority, RequestStatus};

/// Context handed to an executor for one attempt.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub orchestration_id: Uuid,
    pub request_id: Uuid,
    pub user_id: String,
    pub subscription_id: String,
    /// Provider display name, for audit metadata
    pub subscription_name: String,
    pub priority: Priority,
    pub notes: Option<String>,
    pub notification_preferences: NotificationPreferences,
}

/// Unified result of one successful method execution.
#[derive(Debug, Clone)]
pub struct MethodOutcome {
    pub method: Method,
    /// Resulting request status: `completed`, `processing` or `requires_manual`
    pub status: RequestStatus,
    pub message: String,
    pub confirmation_code: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub refund_amount: Option<f64>,
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Manual-track instructions, when the method produced them
    pub instructions: Option<Vec<String>>,
    /// Collaborator-side request/workflow identifier
    pub external_request_id: Option<String>,
}

/// A failed method attempt, wrapped for the fallback loop.
#[derive(Debug, Error)]
#[error("{method} cancellation failed: {message}")]
pub struct ExecutorError {
    pub method: Method,
    pub message: String,
}

impl ExecutorError {
    #[must_use]
    pub fn new(method: Method, message: impl Into<String>) -> Self {
        Self {
            method,
            message: message.into(),
        }
    }
}

/// One cancellation strategy.
#[async_trait]
pub trait MethodExecutor: Send + Sync {
    /// The method this executor implements.
    fn method(&self) -> Method;

    /// Run one cancellation attempt.
    async fn execute(&self, request: &ExecutionRequest) -> Result<MethodOutcome, ExecutorError>;
}

#[cfg(test)]
pub(crate) fn test_execution_request() -> ExecutionRequest {
    ExecutionRequest {
        orchestration_id: Uuid::new_v4(),
        request_id: Uuid::new_v4(),
        user_id: "user-1".to_string(),
        subscription_id: "sub-1".to_string(),
        subscription_name: "Netflix".to_string(),
        priority: Priority::Normal,
        notes: None,
        notification_preferences: NotificationPreferences::default(),
    }
}
