//! In-memory orchestration tracking.
//!
//! The tracker owns the live-session registry: one entry per orchestration,
//! created at initiation and evicted at terminal status. Progress updates fan
//! out to per-session subscriber callbacks and publish lifecycle events
//! through the injected [`Notifier`].
//!
//! This state is deliberately never persisted. After a restart a session can
//! only be reconstructed by replaying the durable request and its logs, which
//! the engine's status read does.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use notify::{CancellationEvent, Notifier};

use crate::types::Method;

/// Status of a live orchestration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    /// Registered, chain not yet running
    Starting,
    /// A method attempt is executing
    Executing,
    /// Finished with a confirmed or in-flight cancellation
    Completed,
    /// Finished without a successful method
    Failed,
    /// Finished by handing the user manual instructions
    RequiresManual,
}

impl OrchestrationStatus {
    /// Get the status name as a string.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RequiresManual => "requires_manual",
        }
    }

    /// Whether the session is finished.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RequiresManual)
    }
}

/// One progress update delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationUpdate {
    pub orchestration_id: Uuid,
    pub status: OrchestrationStatus,
    pub method: Option<Method>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Subscriber callback invoked for every update of one session.
pub type UpdateCallback = Arc<dyn Fn(&OrchestrationUpdate) + Send + Sync>;

/// Handle returned by `subscribe`; pass back to `unsubscribe`.
///
/// Subscribing to an unknown or already-finished orchestration yields a
/// no-op handle instead of an error.
#[derive(Debug, Clone)]
pub struct UpdateSubscription {
    orchestration_id: Uuid,
    token: Option<u64>,
}

impl UpdateSubscription {
    /// Whether this handle is attached to a live session.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.token.is_some()
    }
}

/// Live session state.
struct LiveOrchestration {
    user_id: String,
    request_id: Uuid,
    subscription_id: String,
    status: OrchestrationStatus,
    method: Option<Method>,
    started_at: DateTime<Utc>,
    last_update: DateTime<Utc>,
    subscribers: HashMap<u64, UpdateCallback>,
}

/// Read-only view of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationSnapshot {
    pub orchestration_id: Uuid,
    pub request_id: Uuid,
    pub user_id: String,
    pub subscription_id: String,
    pub status: OrchestrationStatus,
    pub method: Option<Method>,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub subscriber_count: usize,
}

/// Registry of live orchestration sessions.
pub struct OrchestrationTracker {
    sessions: RwLock<HashMap<Uuid, LiveOrchestration>>,
    next_token: AtomicU64,
    notifier: Arc<Notifier>,
}

impl OrchestrationTracker {
    /// Create a new tracker publishing lifecycle events to `notifier`.
    #[must_use]
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            notifier,
        }
    }

    /// Register a new live session and publish the started event.
    pub async fn register(
        &self,
        orchestration_id: Uuid,
        user_id: &str,
        request_id: Uuid,
        subscription_id: &str,
        method: Method,
    ) {
        let now = Utc::now();
        let session = LiveOrchestration {
            user_id: user_id.to_string(),
            request_id,
            subscription_id: subscription_id.to_string(),
            status: OrchestrationStatus::Starting,
            method: Some(method),
            started_at: now,
            last_update: now,
            subscribers: HashMap::new(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(orchestration_id, session);
        drop(sessions);

        debug!(orchestration = %orchestration_id, "Registered orchestration session");

        self.notifier.notify(CancellationEvent::OrchestrationStarted {
            orchestration_id,
            user_id: user_id.to_string(),
            subscription_id: subscription_id.to_string(),
            method: method.name().to_string(),
            timestamp: now,
        });
    }

    /// Update a session's status and fan the update out to subscribers.
    pub async fn update_status(
        &self,
        orchestration_id: Uuid,
        status: OrchestrationStatus,
        method: Option<Method>,
        message: &str,
    ) {
        let update = OrchestrationUpdate {
            orchestration_id,
            status,
            method,
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        self.emit_update(orchestration_id, &update, None).await;
    }

    /// Fan an update out to subscribers and optionally publish a lifecycle
    /// event.
    ///
    /// Updates for unknown sessions are dropped with a warning; the event is
    /// still published so external consumers stay informed.
    pub async fn emit_update(
        &self,
        orchestration_id: Uuid,
        update: &OrchestrationUpdate,
        event: Option<CancellationEvent>,
    ) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&orchestration_id) {
            session.status = update.status;
            if update.method.is_some() {
                session.method = update.method;
            }
            session.last_update = update.timestamp;

            let callbacks: Vec<UpdateCallback> = session.subscribers.values().cloned().collect();
            drop(sessions);

            for callback in callbacks {
                callback(update);
            }
        } else {
            drop(sessions);
            warn!(
                orchestration = %orchestration_id,
                "Progress update for unknown orchestration"
            );
        }

        if let Some(event) = event {
            self.notifier.notify(event);
        }
    }

    /// Finalize a session: emit the last update, publish the terminal event
    /// and evict the entry.
    pub async fn finalize(
        &self,
        orchestration_id: Uuid,
        status: OrchestrationStatus,
        message: &str,
        event: Option<CancellationEvent>,
    ) {
        let update = OrchestrationUpdate {
            orchestration_id,
            status,
            method: None,
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        self.emit_update(orchestration_id, &update, event).await;

        let mut sessions = self.sessions.write().await;
        if sessions.remove(&orchestration_id).is_some() {
            debug!(
                orchestration = %orchestration_id,
                status = status.name(),
                "Evicted finished orchestration session"
            );
        }
    }

    /// Subscribe to updates for a session.
    ///
    /// Unknown or already-finished sessions yield a no-op handle.
    pub async fn subscribe(
        &self,
        orchestration_id: Uuid,
        callback: UpdateCallback,
    ) -> UpdateSubscription {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&orchestration_id) {
            Some(session) if !session.status.is_terminal() => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                session.subscribers.insert(token, callback);
                UpdateSubscription {
                    orchestration_id,
                    token: Some(token),
                }
            }
            _ => UpdateSubscription {
                orchestration_id,
                token: None,
            },
        }
    }

    /// Remove a subscriber. No-op handles and finished sessions are ignored.
    pub async fn unsubscribe(&self, subscription: &UpdateSubscription) {
        let Some(token) = subscription.token else {
            return;
        };
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&subscription.orchestration_id) {
            session.subscribers.remove(&token);
        }
    }

    /// Read-only snapshot of a live session.
    pub async fn snapshot(&self, orchestration_id: Uuid) -> Option<OrchestrationSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.get(&orchestration_id).map(|s| OrchestrationSnapshot {
            orchestration_id,
            request_id: s.request_id,
            user_id: s.user_id.clone(),
            subscription_id: s.subscription_id.clone(),
            status: s.status,
            method: s.method,
            started_at: s.started_at,
            last_update: s.last_update,
            subscriber_count: s.subscribers.len(),
        })
    }

    /// Number of live sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop any finished sessions that were not evicted through `finalize`.
    pub async fn cleanup(&self) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.status.is_terminal());
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Cleaned up {removed} finished orchestration sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn tracker() -> OrchestrationTracker {
        OrchestrationTracker::new(Arc::new(Notifier::disabled()))
    }

    #[tokio::test]
    async fn test_register_and_snapshot() {
        let tracker = tracker();
        let orchestration_id = Uuid::new_v4();
        let request_id = Uuid::new_v4();

        tracker
            .register(orchestration_id, "user-1", request_id, "sub-1", Method::Api)
            .await;

        let snapshot = tracker.snapshot(orchestration_id).await.unwrap();
        assert_eq!(snapshot.status, OrchestrationStatus::Starting);
        assert_eq!(snapshot.method, Some(Method::Api));
        assert_eq!(snapshot.subscriber_count, 0);
        assert_eq!(tracker.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_updates_fan_out_to_subscribers() {
        let tracker = tracker();
        let orchestration_id = Uuid::new_v4();
        tracker
            .register(orchestration_id, "user-1", Uuid::new_v4(), "sub-1", Method::Api)
            .await;

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = tracker
            .subscribe(
                orchestration_id,
                Arc::new(move |update| {
                    sink.lock().unwrap().push(update.message.clone());
                }),
            )
            .await;
        assert!(subscription.is_active());

        tracker
            .update_status(
                orchestration_id,
                OrchestrationStatus::Executing,
                Some(Method::Api),
                "attempting api method 1 of 2",
            )
            .await;

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["attempting api method 1 of 2"]
        );

        tracker.unsubscribe(&subscription).await;
        tracker
            .update_status(
                orchestration_id,
                OrchestrationStatus::Executing,
                Some(Method::Api),
                "second update",
            )
            .await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_is_noop() {
        let tracker = tracker();
        let subscription = tracker
            .subscribe(Uuid::new_v4(), Arc::new(|_| {}))
            .await;
        assert!(!subscription.is_active());
        // Unsubscribing a no-op handle must not panic.
        tracker.unsubscribe(&subscription).await;
    }

    #[tokio::test]
    async fn test_finalize_evicts_session() {
        let tracker = tracker();
        let orchestration_id = Uuid::new_v4();
        tracker
            .register(orchestration_id, "user-1", Uuid::new_v4(), "sub-1", Method::Api)
            .await;

        tracker
            .finalize(
                orchestration_id,
                OrchestrationStatus::Completed,
                "done",
                None,
            )
            .await;

        assert!(tracker.snapshot(orchestration_id).await.is_none());
        assert_eq!(tracker.active_count().await, 0);

        // Subscribing after finalize yields a no-op handle.
        let subscription = tracker
            .subscribe(orchestration_id, Arc::new(|_| {}))
            .await;
        assert!(!subscription.is_active());
    }
}
