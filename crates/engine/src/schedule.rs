//! Scheduled cancellation helpers.
//!
//! The engine persists future-dated requests without starting execution; an
//! external job scheduler re-invokes the normal initiation path when the
//! moment arrives. Exactly-once execution is that scheduler's problem, not
//! ours.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::capability::ProviderCapability;
use crate::error::EngineError;
use crate::types::Method;

/// Validate that a schedule instant is strictly in the future.
pub fn validate_schedule(
    schedule_for: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    if schedule_for <= now {
        return Err(EngineError::InvalidSchedule);
    }
    Ok(())
}

/// Build the metadata snapshot embedded in a scheduled request.
///
/// Carries everything the scheduler's later re-initiation needs to reproduce
/// the decision: the chosen method, the capability snapshot it was based on,
/// and the caller's timezone (stored verbatim; validation is UTC-only).
#[must_use]
pub fn scheduling_metadata(
    orchestration_id: Uuid,
    schedule_for: DateTime<Utc>,
    timezone: Option<&str>,
    method: Method,
    capability: &ProviderCapability,
) -> serde_json::Value {
    serde_json::json!({
        "orchestration_id": orchestration_id.to_string(),
        "scheduled_for": schedule_for.to_rfc3339(),
        "timezone": timezone,
        "method": method.name(),
        "capability": capability,
    })
}
