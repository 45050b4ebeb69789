//! Fallback chain execution.
//!
//! The chain runner is the core transition function of the orchestration
//! state machine: it iterates the method chain strictly sequentially, stops
//! on the first success, and applies fallback policy on failure. Given the
//! chain and the ordered sequence of executor outcomes, the result is
//! deterministic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use notify::CancellationEvent;

use crate::error::EngineError;
use crate::executor::{ExecutionRequest, MethodExecutor, MethodOutcome};
use crate::storage::{LogStore, NewLogEntry};
use crate::tracker::{OrchestrationStatus, OrchestrationTracker, OrchestrationUpdate};
use crate::types::{LogLevel, Method};

/// Result of driving one fallback chain to completion.
pub enum ChainResult {
    /// A method succeeded; remaining methods were not attempted.
    Success {
        outcome: MethodOutcome,
        attempts_used: u32,
        /// Why earlier methods were skipped over, when any failed first
        fallback_reason: Option<String>,
    },
    /// No method succeeded, or policy cut the chain short.
    Failure {
        error: EngineError,
        attempts_used: u32,
    },
}

/// Drives sequential method attempts across a fallback chain.
pub struct ChainRunner {
    executors: HashMap<Method, Arc<dyn MethodExecutor>>,
    logs: Arc<dyn LogStore>,
    tracker: Arc<OrchestrationTracker>,
    backoff: Duration,
}

impl ChainRunner {
    /// Create a new chain runner.
    #[must_use]
    pub fn new(
        executors: HashMap<Method, Arc<dyn MethodExecutor>>,
        logs: Arc<dyn LogStore>,
        tracker: Arc<OrchestrationTracker>,
        backoff: Duration,
    ) -> Self {
        Self {
            executors,
            logs,
            tracker,
            backoff,
        }
    }

    /// Run the chain until a method succeeds, all are exhausted, or the
    /// caller's fallback policy stops it.
    pub async fn run(
        &self,
        chain: &[Method],
        request: &ExecutionRequest,
        allow_fallback: bool,
    ) -> ChainResult {
        let total = chain.len() as u32;
        let mut last_error: Option<String> = None;

        for (index, method) in chain.iter().copied().enumerate() {
            let attempt = index as u32 + 1;

            let attempt_message =
                format!("attempting {method} method {attempt} of {total}");
            self.append_log(
                request,
                Some(method),
                "method_attempt",
                LogLevel::Info,
                attempt_message.clone(),
            )
            .await;
            self.tracker
                .emit_update(
                    request.orchestration_id,
                    &OrchestrationUpdate {
                        orchestration_id: request.orchestration_id,
                        status: OrchestrationStatus::Executing,
                        method: Some(method),
                        message: attempt_message,
                        timestamp: Utc::now(),
                    },
                    Some(CancellationEvent::MethodAttemptStarted {
                        orchestration_id: request.orchestration_id,
                        method: method.name().to_string(),
                        attempt,
                        chain_length: total,
                        timestamp: Utc::now(),
                    }),
                )
                .await;

            let result = match self.executors.get(&method) {
                Some(executor) => executor.execute(request).await,
                None => Err(crate::executor::ExecutorError::new(
                    method,
                    "no executor registered for this method",
                )),
            };

            match result {
                Ok(outcome) => {
                    info!(
                        orchestration = %request.orchestration_id,
                        method = method.name(),
                        attempt,
                        "Cancellation method succeeded"
                    );
                    self.append_log(
                        request,
                        Some(method),
                        "method_succeeded",
                        LogLevel::Success,
                        outcome.message.clone(),
                    )
                    .await;
                    self.tracker
                        .emit_update(
                            request.orchestration_id,
                            &OrchestrationUpdate {
                                orchestration_id: request.orchestration_id,
                                status: OrchestrationStatus::Executing,
                                method: Some(method),
                                message: outcome.message.clone(),
                                timestamp: Utc::now(),
                            },
                            Some(CancellationEvent::MethodSucceeded {
                                orchestration_id: request.orchestration_id,
                                method: method.name().to_string(),
                                attempts_used: attempt,
                                timestamp: Utc::now(),
                            }),
                        )
                        .await;

                    return ChainResult::Success {
                        outcome,
                        attempts_used: attempt,
                        fallback_reason: last_error,
                    };
                }
                Err(e) => {
                    warn!(
                        orchestration = %request.orchestration_id,
                        method = method.name(),
                        attempt,
                        error = %e.message,
                        "Cancellation method failed"
                    );
                    self.append_log(
                        request,
                        Some(method),
                        "method_failed",
                        LogLevel::Error,
                        e.to_string(),
                    )
                    .await;
                    self.tracker
                        .emit_update(
                            request.orchestration_id,
                            &OrchestrationUpdate {
                                orchestration_id: request.orchestration_id,
                                status: OrchestrationStatus::Executing,
                                method: Some(method),
                                message: e.to_string(),
                                timestamp: Utc::now(),
                            },
                            Some(CancellationEvent::MethodFailed {
                                orchestration_id: request.orchestration_id,
                                method: method.name().to_string(),
                                attempt,
                                error: e.message.clone(),
                                timestamp: Utc::now(),
                            }),
                        )
                        .await;

                    if attempt == total {
                        return ChainResult::Failure {
                            error: EngineError::AllMethodsFailed(e.message),
                            attempts_used: total,
                        };
                    }

                    if !allow_fallback {
                        return ChainResult::Failure {
                            error: EngineError::FallbackDisabled(method, e.message),
                            attempts_used: attempt,
                        };
                    }

                    last_error = Some(format!("{method} failed: {}", e.message));
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }

        // Unreachable for non-empty chains; the builder guarantees one.
        ChainResult::Failure {
            error: EngineError::Orchestration("empty fallback chain".to_string()),
            attempts_used: 0,
        }
    }

    /// Append a chain log entry; failures are logged and swallowed so they
    /// never mask the primary result.
    async fn append_log(
        &self,
        request: &ExecutionRequest,
        method: Option<Method>,
        action: &str,
        level: LogLevel,
        message: String,
    ) {
        let mut entry = NewLogEntry::new(
            request.request_id,
            Some(request.orchestration_id),
            action,
            level,
            message,
        );
        if let Some(method) = method {
            entry.metadata = serde_json::json!({ "method": method.name() });
        }
        if let Err(e) = self.logs.append(entry).await {
            warn!(
                request = %request.request_id,
                action,
                error = %e,
                "Failed to append cancellation log"
            );
        }
    }
}
