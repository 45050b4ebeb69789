//! End-to-end tests for the cancellation engine: full orchestrations driven
//! through scripted collaborator services over the in-memory stores.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use engine::analytics::Timeframe;
use engine::capability::{Difficulty, StoredProvider};
use engine::engine::{CollaboratorServices, EngineStores, RetryOptions};
use engine::error::ErrorCode;
use engine::services::{
    ApiCancelRequest, ApiCancelResponse, ApiCancellationService, AuditEntry, AuditLogger,
    AutomationRequest, AutomationResponse, AutomationWorkflowService, ManualConfirmation,
    ManualInstructionService, ManualRequest, ManualResponse, ServiceError,
};
use engine::storage::{
    LogStore, MemoryLogStore, MemoryProviderRegistry, MemoryRequestStore,
    MemorySubscriptionStore, ProviderRegistry, RequestStore, SubscriptionStore,
};
use engine::types::{
    AllowFallback, CancellationOptions, CancellationRequest, Method, MethodPreference, Priority,
    RequestStatus, Subscription,
};
use engine::{CancellationEngine, EngineConfig};

// =============================================================================
// Scripted collaborator fakes
// =============================================================================

struct ScriptedApi {
    script: Mutex<VecDeque<Result<ApiCancelResponse, String>>>,
    calls: AtomicU32,
}

impl ScriptedApi {
    fn new(script: Vec<Result<ApiCancelResponse, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn ok() -> Result<ApiCancelResponse, String> {
        Ok(ApiCancelResponse {
            request_id: "ext-api-1".to_string(),
            status: "completed".to_string(),
            confirmation_code: Some("CONF-1".to_string()),
            effective_date: None,
            refund_amount: Some(4.99),
        })
    }
}

#[async_trait]
impl ApiCancellationService for ScriptedApi {
    async fn initiate(
        &self,
        _user_id: &str,
        _request: &ApiCancelRequest,
    ) -> Result<ApiCancelResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ServiceError::Unavailable(message)),
            None => Err(ServiceError::Unavailable("unscripted api call".to_string())),
        }
    }
}

struct ScriptedAutomation {
    script: Mutex<VecDeque<Result<AutomationResponse, String>>>,
    calls: AtomicU32,
}

impl ScriptedAutomation {
    fn new(script: Vec<Result<AutomationResponse, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn ok() -> Result<AutomationResponse, String> {
        Ok(AutomationResponse {
            request_id: "ext-auto-1".to_string(),
            workflow_id: Some("wf-1".to_string()),
            estimated_completion: Some(Utc::now() + Duration::minutes(20)),
        })
    }
}

#[async_trait]
impl AutomationWorkflowService for ScriptedAutomation {
    async fn initiate(
        &self,
        _user_id: &str,
        _request: &AutomationRequest,
    ) -> Result<AutomationResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ServiceError::Unavailable(message)),
            None => Err(ServiceError::Unavailable(
                "unscripted automation call".to_string(),
            )),
        }
    }
}

struct FakeManual {
    fail: bool,
    calls: AtomicU32,
}

impl FakeManual {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManualInstructionService for FakeManual {
    async fn provide_instructions(
        &self,
        _user_id: &str,
        _request: &ManualRequest,
    ) -> Result<ManualResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::Unavailable(
                "instruction data missing".to_string(),
            ));
        }
        Ok(ManualResponse {
            request_id: "ext-manual-1".to_string(),
            instructions: vec![
                "Log in to the provider account".to_string(),
                "Open the membership settings page".to_string(),
                "Select cancel and confirm".to_string(),
            ],
        })
    }

    async fn confirm(
        &self,
        _user_id: &str,
        _request_id: &str,
        _confirmation: &ManualConfirmation,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

struct NullAudit;

#[async_trait]
impl AuditLogger for NullAudit {
    async fn log(&self, _entry: AuditEntry) -> Result<(), ServiceError> {
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    engine: CancellationEngine,
    requests: Arc<MemoryRequestStore>,
    logs: Arc<MemoryLogStore>,
    subscriptions: Arc<MemorySubscriptionStore>,
    api: Arc<ScriptedApi>,
    automation: Arc<ScriptedAutomation>,
    manual: Arc<FakeManual>,
}

async fn harness(
    api_script: Vec<Result<ApiCancelResponse, String>>,
    automation_script: Vec<Result<AutomationResponse, String>>,
    manual_fails: bool,
) -> Harness {
    let requests = Arc::new(MemoryRequestStore::new());
    let logs = Arc::new(MemoryLogStore::new());
    let subscriptions = Arc::new(MemorySubscriptionStore::new());
    let registry = Arc::new(MemoryProviderRegistry::new());

    subscriptions
        .upsert(Subscription {
            id: "sub-1".to_string(),
            user_id: "user-1".to_string(),
            name: "Netflix".to_string(),
            status: "active".to_string(),
            is_active: true,
        })
        .await
        .unwrap();
    subscriptions
        .upsert(Subscription {
            id: "sub-gym".to_string(),
            user_id: "user-1".to_string(),
            name: "Cornelius Gym".to_string(),
            status: "active".to_string(),
            is_active: true,
        })
        .await
        .unwrap();

    registry
        .upsert(StoredProvider {
            key: "netflix".to_string(),
            display_name: "Netflix".to_string(),
            supports_api: true,
            supports_automation: true,
            api_success_rate: 0.9,
            automation_success_rate: 0.8,
            api_estimated_minutes: 2,
            automation_estimated_minutes: 12,
            manual_estimated_minutes: 10,
            difficulty: Difficulty::Easy,
            requires_2fa: false,
            has_retention_offers: true,
        })
        .await
        .unwrap();

    let api = Arc::new(ScriptedApi::new(api_script));
    let automation = Arc::new(ScriptedAutomation::new(automation_script));
    let manual = Arc::new(FakeManual::new(manual_fails));

    let engine = CancellationEngine::new(
        EngineConfig {
            attempt_backoff_secs: 0,
            ..EngineConfig::default()
        },
        EngineStores {
            requests: Arc::clone(&requests) as Arc<dyn RequestStore>,
            logs: Arc::clone(&logs) as Arc<dyn LogStore>,
            subscriptions: Arc::clone(&subscriptions) as Arc<dyn SubscriptionStore>,
            providers: registry,
        },
        CollaboratorServices {
            api: Arc::clone(&api) as Arc<dyn ApiCancellationService>,
            automation: Arc::clone(&automation) as Arc<dyn AutomationWorkflowService>,
            manual: Arc::clone(&manual) as Arc<dyn ManualInstructionService>,
            audit: Arc::new(NullAudit),
        },
        Arc::new(notify::Notifier::disabled()),
    );

    Harness {
        engine,
        requests,
        logs,
        subscriptions,
        api,
        automation,
        manual,
    }
}

fn options() -> CancellationOptions {
    CancellationOptions::default()
}

// =============================================================================
// Initiation flows
// =============================================================================

#[tokio::test]
async fn api_success_completes_subscription() {
    let h = harness(vec![ScriptedApi::ok()], vec![], false).await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status, RequestStatus::Completed);
    assert_eq!(outcome.method, Some(Method::Api));
    assert_eq!(outcome.metadata.attempts_used, 1);
    assert_eq!(outcome.confirmation_code.as_deref(), Some("CONF-1"));
    assert_eq!(outcome.refund_amount, Some(4.99));
    assert!(outcome.error.is_none());
    assert_eq!(h.api.calls(), 1);
    assert_eq!(h.automation.calls(), 0);

    // Durable request reflects the terminal state.
    let request_id = outcome.request_id.unwrap();
    let request = h.requests.get(request_id).await.unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Completed);
    assert_eq!(request.attempts, 1);
    assert!(request.completed_at.is_some());

    // The subscription flipped to cancelled.
    let subscription = h.subscriptions.get("sub-1").await.unwrap().unwrap();
    assert!(!subscription.is_active);
    assert_eq!(subscription.status, "cancelled");

    // Tracking endpoints point at the request and orchestration.
    assert!(outcome
        .tracking
        .status_check_endpoint
        .contains(&request_id.to_string()));
    assert!(outcome
        .tracking
        .live_update_endpoint
        .contains(&outcome.orchestration_id.to_string()));
}

#[tokio::test]
async fn api_failure_falls_back_to_automation() {
    let h = harness(
        vec![Err("provider API timeout".to_string())],
        vec![ScriptedAutomation::ok()],
        false,
    )
    .await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.method, Some(Method::Automation));
    assert_eq!(outcome.status, RequestStatus::Processing);
    assert_eq!(outcome.metadata.attempts_used, 2);
    assert!(outcome
        .metadata
        .fallback_reason
        .as_ref()
        .unwrap()
        .contains("provider API timeout"));

    // Automation only starts the workflow; the subscription is untouched.
    let subscription = h.subscriptions.get("sub-1").await.unwrap().unwrap();
    assert!(subscription.is_active);

    // The timeline carries the failed -> succeeded pair in order.
    let request_id = outcome.request_id.unwrap();
    let timeline = h.logs.for_request(request_id).await.unwrap();
    let actions: Vec<&str> = timeline.iter().map(|l| l.action.as_str()).collect();
    let failed_pos = actions.iter().position(|a| *a == "method_failed").unwrap();
    let succeeded_pos = actions.iter().position(|a| *a == "method_succeeded").unwrap();
    assert!(failed_pos < succeeded_pos);
}

#[tokio::test]
async fn fallback_disabled_stops_after_primary() {
    let h = harness(
        vec![Err("provider API down".to_string())],
        vec![ScriptedAutomation::ok()],
        false,
    )
    .await;

    let mut opts = options();
    opts.allow_fallback = AllowFallback(false);

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", opts)
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.metadata.attempts_used, 1);
    assert_eq!(
        outcome.error.as_ref().unwrap().code,
        ErrorCode::FallbackDisabled
    );
    assert_eq!(h.automation.calls(), 0);

    let request = h
        .requests
        .get(outcome.request_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Failed);
}

#[tokio::test]
async fn all_methods_failed_exhausts_chain() {
    let h = harness(
        vec![Err("api down".to_string())],
        vec![Err("no automation workers".to_string())],
        true,
    )
    .await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_ref().unwrap().code,
        ErrorCode::AllMethodsFailed
    );
    // Chain was api -> automation -> manual, all invoked.
    assert_eq!(outcome.metadata.attempts_used, 3);
    assert_eq!(h.api.calls(), 1);
    assert_eq!(h.automation.calls(), 1);
    assert_eq!(h.manual.calls(), 1);
}

#[tokio::test]
async fn in_flight_request_rejected_before_any_executor() {
    let h = harness(vec![], vec![], false).await;

    // A pending request for the subscription already exists.
    let mut pending = CancellationRequest::new(
        "user-1",
        "sub-1",
        "netflix",
        Method::Api,
        Priority::Normal,
        None,
    );
    pending.status = RequestStatus::Pending;
    h.requests.insert(pending).await.unwrap();

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_ref().unwrap().code,
        ErrorCode::CancellationInProgress
    );
    assert_eq!(h.api.calls(), 0);
    assert_eq!(h.automation.calls(), 0);
    assert_eq!(h.manual.calls(), 0);
}

#[tokio::test]
async fn unknown_subscription_is_not_found() {
    let h = harness(vec![], vec![], false).await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-unknown", options())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_ref().unwrap().code, ErrorCode::NotFound);
}

#[tokio::test]
async fn foreign_subscription_is_not_found() {
    let h = harness(vec![], vec![], false).await;

    let outcome = h
        .engine
        .initiate_cancellation("user-2", "sub-1", options())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_ref().unwrap().code, ErrorCode::NotFound);
}

// =============================================================================
// Scheduling
// =============================================================================

#[tokio::test]
async fn future_schedule_persists_without_executing() {
    let h = harness(vec![], vec![], false).await;

    let mut opts = options();
    opts.schedule_for = Some(Utc::now() + Duration::days(2));
    opts.timezone = Some("Europe/Berlin".to_string());

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", opts)
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status, RequestStatus::Scheduled);
    assert_eq!(outcome.metadata.attempts_used, 0);
    assert_eq!(h.api.calls(), 0);
    assert_eq!(h.automation.calls(), 0);
    assert_eq!(h.manual.calls(), 0);

    let request = h
        .requests
        .get(outcome.request_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Scheduled);
    assert_eq!(request.metadata["timezone"], "Europe/Berlin");
    assert_eq!(request.metadata["method"], "api");
    assert_eq!(request.metadata["capability"]["provider_key"], "netflix");

    // Exactly one log entry, and no live session.
    let timeline = h.logs.for_request(request.id).await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].action, "cancellation_scheduled");
    assert_eq!(h.engine.tracker().active_count().await, 0);
}

#[tokio::test]
async fn past_schedule_is_rejected() {
    let h = harness(vec![], vec![], false).await;

    let mut opts = options();
    opts.schedule_for = Some(Utc::now() - Duration::minutes(5));

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", opts)
        .await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_ref().unwrap().code,
        ErrorCode::SchedulingValidationFailed
    );
    assert_eq!(h.api.calls(), 0);
}

#[tokio::test]
async fn scheduled_request_blocks_new_initiations() {
    let h = harness(vec![ScriptedApi::ok()], vec![], false).await;

    let mut opts = options();
    opts.schedule_for = Some(Utc::now() + Duration::days(1));
    let scheduled = h
        .engine
        .initiate_cancellation("user-1", "sub-1", opts)
        .await;
    assert!(scheduled.success);

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_ref().unwrap().code,
        ErrorCode::CancellationInProgress
    );
}

// =============================================================================
// Manual track
// =============================================================================

#[tokio::test]
async fn manual_track_requires_confirmation() {
    let h = harness(vec![], vec![], false).await;

    // Heuristic class for a gym is "other": manual is the only method.
    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-gym", options())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status, RequestStatus::RequiresManual);
    assert_eq!(outcome.method, Some(Method::Manual));
    assert_eq!(outcome.manual_instructions.as_ref().unwrap().len(), 3);
    assert_eq!(outcome.metadata.attempts_used, 1);

    // Not cancelled yet; a human has to do the work first.
    let subscription = h.subscriptions.get("sub-gym").await.unwrap().unwrap();
    assert!(subscription.is_active);

    let request_id = outcome.request_id.unwrap();
    let request = h
        .engine
        .confirm_manual(
            "user-1",
            request_id,
            ManualConfirmation {
                was_successful: true,
                confirmation_code: Some("GYM-123".to_string()),
                effective_date: None,
                notes: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Completed);
    assert_eq!(request.confirmation_code.as_deref(), Some("GYM-123"));

    let subscription = h.subscriptions.get("sub-gym").await.unwrap().unwrap();
    assert!(!subscription.is_active);
}

#[tokio::test]
async fn unsuccessful_manual_confirmation_fails_request() {
    let h = harness(vec![], vec![], false).await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-gym", options())
        .await;
    let request_id = outcome.request_id.unwrap();

    let request = h
        .engine
        .confirm_manual(
            "user-1",
            request_id,
            ManualConfirmation {
                was_successful: false,
                confirmation_code: None,
                effective_date: None,
                notes: Some("retention desk refused".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Failed);
    let subscription = h.subscriptions.get("sub-gym").await.unwrap().unwrap();
    assert!(subscription.is_active);
}

#[tokio::test]
async fn confirm_on_non_manual_request_is_rejected() {
    let h = harness(vec![ScriptedApi::ok()], vec![], false).await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;
    let request_id = outcome.request_id.unwrap();

    let err = h
        .engine
        .confirm_manual(
            "user-1",
            request_id,
            ManualConfirmation {
                was_successful: true,
                confirmation_code: None,
                effective_date: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn retry_on_completed_request_is_rejected() {
    let h = harness(vec![ScriptedApi::ok()], vec![], false).await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;
    let request_id = outcome.request_id.unwrap();

    let retry = h
        .engine
        .retry_cancellation("user-1", request_id, RetryOptions::default())
        .await;

    assert!(!retry.success);
    assert_eq!(
        retry.error.as_ref().unwrap().code,
        ErrorCode::RequestNotFound
    );

    // Nothing was mutated.
    let request = h.requests.get(request_id).await.unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Completed);
}

#[tokio::test]
async fn retry_failed_request_succeeds_second_time() {
    // Everything fails the first time through.
    let h = harness(
        vec![Err("api down".to_string()), ScriptedApi::ok()],
        vec![Err("no workers".to_string())],
        true,
    )
    .await;

    let first = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;
    assert!(!first.success);
    let request_id = first.request_id.unwrap();

    let retry = h
        .engine
        .retry_cancellation("user-1", request_id, RetryOptions::default())
        .await;

    assert!(retry.success);
    assert_eq!(retry.status, RequestStatus::Completed);
    assert_eq!(retry.request_id, Some(request_id));

    // Attempts accumulate across the original run and the retry.
    let request = h.requests.get(request_id).await.unwrap().unwrap();
    assert_eq!(request.attempts, 4);
    assert_eq!(request.status, RequestStatus::Completed);
}

#[tokio::test]
async fn retry_with_unsupported_forced_method_is_rejected() {
    let h = harness(vec![], vec![], true).await;

    // Fail the manual-only provider first.
    let first = h
        .engine
        .initiate_cancellation("user-1", "sub-gym", options())
        .await;
    assert!(!first.success);
    let request_id = first.request_id.unwrap();

    let retry = h
        .engine
        .retry_cancellation(
            "user-1",
            request_id,
            RetryOptions {
                method: Some(Method::Api),
                escalate: false,
            },
        )
        .await;

    assert!(!retry.success);
    assert_eq!(
        retry.error.as_ref().unwrap().code,
        ErrorCode::UnsupportedMethod
    );
}

#[tokio::test]
async fn forced_retry_method_disables_fallback() {
    // First run fails everything; retry forces automation, which also fails.
    let h = harness(
        vec![Err("api down".to_string()), ScriptedApi::ok()],
        vec![
            Err("no workers".to_string()),
            Err("still no workers".to_string()),
        ],
        true,
    )
    .await;

    let first = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;
    assert!(!first.success);

    let retry = h
        .engine
        .retry_cancellation(
            "user-1",
            first.request_id.unwrap(),
            RetryOptions {
                method: Some(Method::Automation),
                escalate: false,
            },
        )
        .await;

    assert!(!retry.success);
    assert_eq!(
        retry.error.as_ref().unwrap().code,
        ErrorCode::FallbackDisabled
    );
    assert_eq!(retry.metadata.attempts_used, 1);
    // The scripted API success was never consumed by the forced retry.
    assert_eq!(h.api.calls(), 1);
}

// =============================================================================
// User-initiated abort
// =============================================================================

#[tokio::test]
async fn pending_request_can_be_aborted() {
    let h = harness(vec![], vec![], false).await;

    let mut pending = CancellationRequest::new(
        "user-1",
        "sub-1",
        "netflix",
        Method::Api,
        Priority::Normal,
        None,
    );
    pending.status = RequestStatus::Pending;
    let request_id = pending.id;
    h.requests.insert(pending).await.unwrap();

    let request = h
        .engine
        .cancel_cancellation_request("user-1", request_id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Cancelled);

    // A second abort is rejected: the request is no longer pending/processing.
    let err = h
        .engine
        .cancel_cancellation_request("user-1", request_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    // But a cancelled request is retryable.
    let retry = h
        .engine
        .retry_cancellation("user-1", request_id, RetryOptions::default())
        .await;
    // Scripted API is empty, so the retry fails, but it was accepted and ran.
    assert!(retry.metadata.attempts_used > 0);
}

#[tokio::test]
async fn abort_of_foreign_request_is_rejected() {
    let h = harness(vec![], vec![], false).await;

    let mut pending = CancellationRequest::new(
        "user-1",
        "sub-1",
        "netflix",
        Method::Api,
        Priority::Normal,
        None,
    );
    pending.status = RequestStatus::Pending;
    let request_id = pending.id;
    h.requests.insert(pending).await.unwrap();

    let err = h
        .engine
        .cancel_cancellation_request("user-2", request_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RequestNotFound);
}

// =============================================================================
// Status reads and analytics
// =============================================================================

#[tokio::test]
async fn orchestration_status_replays_after_session_eviction() {
    let h = harness(vec![ScriptedApi::ok()], vec![], false).await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;

    // The session was evicted at terminal status; the read must replay from
    // the durable request and logs.
    let view = h
        .engine
        .get_orchestration_status(outcome.orchestration_id)
        .await
        .unwrap();

    assert!(!view.live);
    assert_eq!(view.status, "completed");
    assert_eq!(view.request_id, outcome.request_id);
    assert!(!view.timeline.is_empty());
}

#[tokio::test]
async fn unknown_orchestration_is_not_found() {
    let h = harness(vec![], vec![], false).await;
    let err = h
        .engine
        .get_orchestration_status(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn subscribe_to_unknown_orchestration_is_noop() {
    let h = harness(vec![], vec![], false).await;
    let subscription = h
        .engine
        .subscribe_to_updates(uuid::Uuid::new_v4(), Arc::new(|_| {}))
        .await;
    assert!(!subscription.is_active());
    h.engine.unsubscribe(&subscription).await;
}

#[tokio::test]
async fn cancellation_status_returns_request_and_timeline() {
    let h = harness(vec![ScriptedApi::ok()], vec![], false).await;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;
    let request_id = outcome.request_id.unwrap();

    let view = h
        .engine
        .get_cancellation_status("user-1", request_id)
        .await
        .unwrap();
    assert_eq!(view.request.id, request_id);
    assert!(view
        .timeline
        .iter()
        .any(|l| l.action == "method_succeeded"));

    // Sequence numbers form a strict timeline.
    let seqs: Vec<u64> = view.timeline.iter().map(|l| l.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
}

#[tokio::test]
async fn analytics_reflect_request_history() {
    let h = harness(
        vec![ScriptedApi::ok(), Err("api down".to_string())],
        vec![Err("no workers".to_string())],
        true,
    )
    .await;

    // One completed API cancellation.
    let first = h
        .engine
        .initiate_cancellation("user-1", "sub-1", options())
        .await;
    assert!(first.success);

    // One exhausted chain on the gym (manual-only, instruction data missing).
    let second = h
        .engine
        .initiate_cancellation("user-1", "sub-gym", options())
        .await;
    assert!(!second.success);

    let analytics = h.engine.get_unified_analytics("user-1", Timeframe::Week).await;

    assert_eq!(analytics.summary.total_requests, 2);
    assert_eq!(analytics.summary.completed, 1);
    assert_eq!(analytics.summary.failed, 1);
    assert!((analytics.summary.success_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(analytics.method_breakdown.api, 1);
    assert_eq!(analytics.method_breakdown.manual, 1);
    assert_eq!(analytics.trend.len(), 7);
    assert_eq!(analytics.trend.last().unwrap().requests, 2);

    let netflix = analytics
        .providers
        .iter()
        .find(|p| p.provider == "netflix")
        .unwrap();
    assert!((netflix.success_rate - 1.0).abs() < f64::EPSILON);
    assert!(netflix.avg_completion_minutes.is_some());
}

#[tokio::test]
async fn preferred_method_overrides_heuristic() {
    let h = harness(vec![], vec![ScriptedAutomation::ok()], false).await;

    let mut opts = options();
    opts.preferred_method = MethodPreference::Automation;

    let outcome = h
        .engine
        .initiate_cancellation("user-1", "sub-1", opts)
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.method, Some(Method::Automation));
    assert_eq!(h.api.calls(), 0);
}

#[tokio::test]
async fn capability_endpoint_reports_registry_data() {
    let h = harness(vec![], vec![], false).await;

    let capability = h
        .engine
        .get_provider_capabilities("Netflix")
        .await
        .unwrap();
    assert!(capability.supports_api);
    assert_eq!(
        capability.source,
        engine::capability::CapabilitySource::Database
    );

    let heuristic = h
        .engine
        .get_provider_capabilities("Some Unknown Box")
        .await
        .unwrap();
    assert_eq!(
        heuristic.source,
        engine::capability::CapabilitySource::Heuristic
    );
    assert!(heuristic.supports_manual);
}
