//! Collaborator service contracts.
//!
//! The engine consumes four external collaborators through these traits:
//! the provider-API cancellation service, the browser-automation workflow
//! service, the manual-instruction service, and the platform audit logger.
//! The engine never cares how they are implemented; the binary wires in the
//! HTTP clients from [`http`], tests wire in scripted fakes.

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::{NotificationPreferences, Priority};

/// Errors surfaced by collaborator services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport-level failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collaborator rejected the call
    #[error("service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The collaborator returned data the engine cannot use
    #[error("invalid service response: {0}")]
    InvalidResponse(String),

    /// The collaborator is not reachable or not configured
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Parameters for a provider-API cancellation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCancelRequest {
    pub subscription_id: String,
    pub priority: Priority,
    pub notes: Option<String>,
}

/// Response from the provider-API cancellation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCancelResponse {
    /// Collaborator-side request ID
    pub request_id: String,
    /// Collaborator status string ("completed", "accepted", ...)
    pub status: String,
    pub confirmation_code: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub refund_amount: Option<f64>,
}

/// Provider-API cancellation collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiCancellationService: Send + Sync {
    async fn initiate(
        &self,
        user_id: &str,
        request: &ApiCancelRequest,
    ) -> Result<ApiCancelResponse, ServiceError>;
}

/// Parameters for starting a browser-automation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRequest {
    pub subscription_id: String,
    pub priority: Priority,
    pub notes: Option<String>,
    pub notification_preferences: NotificationPreferences,
}

/// Response from the automation workflow service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationResponse {
    /// Collaborator-side request ID
    pub request_id: String,
    /// Workflow run identifier, when one was created
    pub workflow_id: Option<String>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// Browser-automation workflow collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutomationWorkflowService: Send + Sync {
    async fn initiate(
        &self,
        user_id: &str,
        request: &AutomationRequest,
    ) -> Result<AutomationResponse, ServiceError>;
}

/// Parameters for generating manual instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualRequest {
    pub subscription_id: String,
    pub notes: Option<String>,
}

/// Response from the manual-instruction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualResponse {
    /// Collaborator-side request ID
    pub request_id: String,
    /// Step-by-step instructions for the user
    pub instructions: Vec<String>,
}

/// Human-reported outcome of a manual cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualConfirmation {
    pub was_successful: bool,
    pub confirmation_code: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Manual-instruction collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManualInstructionService: Send + Sync {
    async fn provide_instructions(
        &self,
        user_id: &str,
        request: &ManualRequest,
    ) -> Result<ManualResponse, ServiceError>;

    async fn confirm(
        &self,
        user_id: &str,
        request_id: &str,
        confirmation: &ManualConfirmation,
    ) -> Result<(), ServiceError>;
}

/// Result of an audited operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
}

/// One platform audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: String,
    pub action: String,
    pub resource: String,
    pub result: AuditResult,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    /// Build a success entry.
    #[must_use]
    pub fn success(user_id: &str, action: &str, resource: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            result: AuditResult::Success,
            error: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Build a failure entry.
    #[must_use]
    pub fn failure(user_id: &str, action: &str, resource: &str, error: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            result: AuditResult::Failure,
            error: Some(error.to_string()),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach structured metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Platform audit logger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, entry: AuditEntry) -> Result<(), ServiceError>;
}

/// Write an audit entry without letting a failure mask the primary result.
pub async fn audit_best_effort(logger: &dyn AuditLogger, entry: AuditEntry) {
    let action = entry.action.clone();
    if let Err(e) = logger.log(entry).await {
        warn!(action = %action, error = %e, "Audit log write failed");
    }
}

/// Audit logger that only emits tracing events; used when no audit
/// collaborator is configured.
#[derive(Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, entry: AuditEntry) -> Result<(), ServiceError> {
        tracing::info!(
            user_id = %entry.user_id,
            action = %entry.action,
            resource = %entry.resource,
            result = ?entry.result,
            "audit"
        );
        Ok(())
    }
}
