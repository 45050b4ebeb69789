//! Notification event types for cancellation orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// Get the embed color for this severity.
    #[must_use]
    pub const fn color(&self) -> u32 {
        match self {
            Self::Info => 0x0034_98db,     // Blue
            Self::Warning => 0x00f3_9c12,  // Orange
            Self::Critical => 0x00e7_4c3c, // Red
        }
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Lifecycle events published by the cancellation engine.
///
/// The orchestration tracker publishes these as each live session moves
/// through its state machine; scheduling and user-initiated operations
/// publish their own terminal events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CancellationEvent {
    /// An orchestration session has started executing.
    OrchestrationStarted {
        orchestration_id: Uuid,
        user_id: String,
        subscription_id: String,
        method: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A method attempt within the fallback chain has started.
    MethodAttemptStarted {
        orchestration_id: Uuid,
        method: String,
        attempt: u32,
        chain_length: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A method attempt failed; the chain may fall back to the next method.
    MethodFailed {
        orchestration_id: Uuid,
        method: String,
        attempt: u32,
        error: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A method attempt succeeded and the chain stopped.
    MethodSucceeded {
        orchestration_id: Uuid,
        method: String,
        attempts_used: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The orchestration finished with a confirmed or in-flight cancellation.
    OrchestrationCompleted {
        orchestration_id: Uuid,
        request_id: Uuid,
        method: String,
        confirmation_code: Option<String>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The orchestration exhausted its fallback chain or was cut short.
    OrchestrationFailed {
        orchestration_id: Uuid,
        request_id: Uuid,
        error: String,
        attempts_used: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Manual instructions were generated; a human has to finish the job.
    ManualInstructionsReady {
        orchestration_id: Uuid,
        request_id: Uuid,
        step_count: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A cancellation was persisted for future execution.
    CancellationScheduled {
        request_id: Uuid,
        subscription_id: String,
        scheduled_for: DateTime<Utc>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A human reported the outcome of a manual cancellation.
    ManualConfirmed {
        request_id: Uuid,
        was_successful: bool,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The user aborted a pending/processing cancellation request.
    RequestCancelled {
        request_id: Uuid,
        user_id: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl CancellationEvent {
    /// Get the severity of this event.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::MethodFailed { .. } => Severity::Warning,
            Self::OrchestrationFailed { .. } => Severity::Critical,
            _ => Severity::Info,
        }
    }

    /// Get a short title for this event.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::OrchestrationStarted { method, .. } => {
                format!("Cancellation Started ({method})")
            }
            Self::MethodAttemptStarted {
                method,
                attempt,
                chain_length,
                ..
            } => {
                format!("Attempting {method} ({attempt}/{chain_length})")
            }
            Self::MethodFailed { method, .. } => format!("Method Failed: {method}"),
            Self::MethodSucceeded { method, .. } => format!("Method Succeeded: {method}"),
            Self::OrchestrationCompleted { method, .. } => {
                format!("Cancellation Completed ({method})")
            }
            Self::OrchestrationFailed { .. } => "Cancellation Failed".to_string(),
            Self::ManualInstructionsReady { .. } => "Manual Instructions Ready".to_string(),
            Self::CancellationScheduled { .. } => "Cancellation Scheduled".to_string(),
            Self::ManualConfirmed { was_successful, .. } => {
                if *was_successful {
                    "Manual Cancellation Confirmed".to_string()
                } else {
                    "Manual Cancellation Unsuccessful".to_string()
                }
            }
            Self::RequestCancelled { .. } => "Cancellation Request Aborted".to_string(),
        }
    }

    /// Get a human-readable description for this event.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::OrchestrationStarted {
                subscription_id,
                method,
                ..
            } => {
                format!("Cancelling subscription `{subscription_id}` via {method}")
            }
            Self::MethodAttemptStarted {
                method,
                attempt,
                chain_length,
                ..
            } => {
                format!("Attempting {method} cancellation, method {attempt} of {chain_length}")
            }
            Self::MethodFailed { method, error, .. } => {
                format!("{method} cancellation failed: {error}")
            }
            Self::MethodSucceeded {
                method,
                attempts_used,
                ..
            } => {
                format!("{method} cancellation succeeded after {attempts_used} attempt(s)")
            }
            Self::OrchestrationCompleted {
                method,
                confirmation_code,
                ..
            } => match confirmation_code {
                Some(code) => format!("Cancelled via {method}, confirmation `{code}`"),
                None => format!("Cancelled via {method}"),
            },
            Self::OrchestrationFailed {
                error,
                attempts_used,
                ..
            } => {
                format!("All attempts exhausted ({attempts_used}): {error}")
            }
            Self::ManualInstructionsReady { step_count, .. } => {
                format!("{step_count} manual steps generated; waiting for user confirmation")
            }
            Self::CancellationScheduled { scheduled_for, .. } => {
                format!(
                    "Execution scheduled for {}",
                    scheduled_for.format("%Y-%m-%d %H:%M UTC")
                )
            }
            Self::ManualConfirmed { was_successful, .. } => {
                if *was_successful {
                    "User confirmed the subscription was cancelled".to_string()
                } else {
                    "User reported the manual cancellation did not work".to_string()
                }
            }
            Self::RequestCancelled { user_id, .. } => {
                format!("Request aborted by user `{user_id}`")
            }
        }
    }

    /// Get the timestamp of this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::OrchestrationStarted { timestamp, .. }
            | Self::MethodAttemptStarted { timestamp, .. }
            | Self::MethodFailed { timestamp, .. }
            | Self::MethodSucceeded { timestamp, .. }
            | Self::OrchestrationCompleted { timestamp, .. }
            | Self::OrchestrationFailed { timestamp, .. }
            | Self::ManualInstructionsReady { timestamp, .. }
            | Self::CancellationScheduled { timestamp, .. }
            | Self::ManualConfirmed { timestamp, .. }
            | Self::RequestCancelled { timestamp, .. } => *timestamp,
        }
    }
}
