//! Core types for cancellation orchestration.
//!
//! This module defines the primary data structures for:
//! - Cancellation methods and their selection preferences
//! - Durable cancellation requests and their append-only logs
//! - The public result shape returned by the initiation entry point

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;

/// Channel used to cancel a subscription with its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Direct provider-API cancellation call
    Api,
    /// Browser-automation workflow
    #[serde(alias = "web_automation", alias = "browser_automation")]
    Automation,
    /// Human following generated instructions
    Manual,
}

impl Method {
    /// Get the method's name as a string.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Automation => "automation",
            Self::Manual => "manual",
        }
    }

    /// All methods, in default fallback precedence order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Api, Self::Automation, Self::Manual]
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Execution priority forwarded to collaborator services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Get display name for this priority.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// Status of a durable cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Created, not yet executing
    Pending,
    /// An orchestration is executing (or an external workflow is running)
    Processing,
    /// Persisted for future execution by the job scheduler
    Scheduled,
    /// Manual instructions generated, awaiting human confirmation
    RequiresManual,
    /// Cancellation confirmed
    Completed,
    /// All methods exhausted or attempt cut short
    Failed,
    /// Aborted by the user
    Cancelled,
}

impl RequestStatus {
    /// Get the status name as a string.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Scheduled => "scheduled",
            Self::RequiresManual => "requires_manual",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status counts against the one-in-flight invariant.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Scheduled)
    }

    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Log level for cancellation audit trail entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Durable record of one cancellation intent and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRequest {
    /// Unique request ID
    pub id: Uuid,
    /// Owning user
    pub user_id: String,
    /// Target subscription
    pub subscription_id: String,
    /// Normalized provider key (for analytics grouping)
    pub provider: String,
    /// Method chosen at initiation (updated when fallback lands elsewhere)
    pub method: Method,
    /// Execution priority
    pub priority: Priority,
    /// Current status
    pub status: RequestStatus,
    /// Number of method attempts made so far
    pub attempts: u32,
    /// Provider confirmation code, when one was issued
    pub confirmation_code: Option<String>,
    /// When the cancellation takes effect
    pub effective_date: Option<DateTime<Utc>>,
    /// Refund reported by the provider, in account currency units
    pub refund_amount: Option<f64>,
    /// Free-form notes from the user
    pub user_notes: Option<String>,
    /// Scheduling snapshot and orchestration linkage
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
    /// When the request reached `completed`
    pub completed_at: Option<DateTime<Utc>>,
}

impl CancellationRequest {
    /// Create a new request in `pending` state.
    #[must_use]
    pub fn new(
        user_id: &str,
        subscription_id: &str,
        provider: &str,
        method: Method,
        priority: Priority,
        user_notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            subscription_id: subscription_id.to_string(),
            provider: provider.to_string(),
            method,
            priority,
            status: RequestStatus::Pending,
            attempts: 0,
            confirmation_code: None,
            effective_date: None,
            refund_amount: None,
            user_notes,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// The orchestration this request was last executed under, if any.
    #[must_use]
    pub fn orchestration_id(&self) -> Option<Uuid> {
        self.metadata
            .get("orchestration_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Append-only audit entry tied to a request and (optionally) an orchestration.
///
/// Entries are never mutated or deleted; the per-request sequence number makes
/// them the authoritative replay source for a timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationLog {
    /// Unique log entry ID
    pub id: Uuid,
    /// Request this entry belongs to
    pub request_id: Uuid,
    /// Orchestration session, when the entry was produced by one
    pub orchestration_id: Option<Uuid>,
    /// Monotonic per-request sequence number
    pub seq: u64,
    /// Machine-readable action (e.g. `method_attempt`, `method_failed`)
    pub action: String,
    /// Entry level
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
    /// Structured context
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Minimal view of a subscription owned by the surrounding platform.
///
/// The engine only reads ownership/name/state and flips the subscription to
/// cancelled on confirmed success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription ID (owned by the detection pipeline)
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Provider display name (e.g. "Netflix Premium")
    pub name: String,
    /// Free-form platform status string
    pub status: String,
    /// Whether the subscription is currently active
    pub is_active: bool,
}

/// Method preference supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodPreference {
    /// Let the consensus heuristic decide
    #[default]
    Auto,
    Api,
    Automation,
    Manual,
}

impl MethodPreference {
    /// The concrete method requested, if not `auto`.
    #[must_use]
    pub fn as_method(self) -> Option<Method> {
        match self {
            Self::Auto => None,
            Self::Api => Some(Method::Api),
            Self::Automation => Some(Method::Automation),
            Self::Manual => Some(Method::Manual),
        }
    }
}

impl From<Method> for MethodPreference {
    fn from(method: Method) -> Self {
        match method {
            Method::Api => Self::Api,
            Method::Automation => Self::Automation,
            Method::Manual => Self::Manual,
        }
    }
}

/// How the user wants to hear about automation progress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: bool,
    pub push: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            push: false,
        }
    }
}

/// Caller-supplied options for one cancellation initiation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationOptions {
    /// Preferred method ("auto" lets the heuristic decide)
    pub preferred_method: MethodPreference,
    /// Whether the chain may fall back after a method failure
    pub allow_fallback: AllowFallback,
    /// Execution priority
    pub priority: Priority,
    /// Free-form notes forwarded to collaborators
    pub user_notes: Option<String>,
    /// Execute at this future instant instead of now
    pub schedule_for: Option<DateTime<Utc>>,
    /// IANA timezone the schedule was expressed in (stored verbatim)
    pub timezone: Option<String>,
    /// Automation progress notification preferences
    pub notification_preferences: NotificationPreferences,
}

/// Newtype so `allow_fallback` defaults to `true` under `#[serde(default)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowFallback(pub bool);

impl Default for AllowFallback {
    fn default() -> Self {
        Self(true)
    }
}

/// Execution metadata attached to every initiation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeMetadata {
    /// Number of methods actually invoked
    pub attempts_used: u32,
    /// Why the chain moved past earlier methods, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    /// Whether live progress subscriptions were registered for this run
    pub real_time_updates_enabled: bool,
}

/// Where the caller can poll or stream progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingLinks {
    /// Durable request status endpoint
    pub status_check_endpoint: String,
    /// Live orchestration update endpoint
    pub live_update_endpoint: String,
}

/// Structured error carried inside a failed outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Result object returned by `initiate_cancellation` and `retry_cancellation`.
///
/// Always returned, never thrown: every failure path is converted into
/// `{success: false, error: {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub success: bool,
    pub orchestration_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_instructions: Option<Vec<String>>,
    pub metadata: OutcomeMetadata,
    pub tracking: TrackingLinks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}
