//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the cancellation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed wait between fallback attempts, in seconds
    pub attempt_backoff_secs: u64,
    /// Capability cache entry lifetime, in seconds
    pub capability_ttl_secs: u64,
    /// Base path for durable status-check endpoints
    pub status_endpoint_base: String,
    /// Base path for live orchestration update endpoints
    pub orchestration_endpoint_base: String,
    /// Whether live progress subscriptions are offered to callers
    pub real_time_updates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attempt_backoff_secs: 2,
            capability_ttl_secs: 3600,
            status_endpoint_base: "/api/cancellations".into(),
            orchestration_endpoint_base: "/api/orchestrations".into(),
            real_time_updates: true,
        }
    }
}

impl EngineConfig {
    /// Inter-attempt backoff as a `Duration`.
    #[must_use]
    pub fn attempt_backoff(&self) -> Duration {
        Duration::from_secs(self.attempt_backoff_secs)
    }

    /// Capability cache TTL as a `chrono::Duration`.
    #[must_use]
    pub fn capability_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.capability_ttl_secs as i64)
    }
}
