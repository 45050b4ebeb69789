//! Cancellation orchestration facade.
//!
//! `CancellationEngine` wires the leaf components together and exposes the
//! public operations. The initiation entry point never returns an error to
//! the caller: every failure path is intercepted and converted into a
//! structured outcome.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use notify::{CancellationEvent, Notifier};

use crate::analytics::{AnalyticsAggregator, Timeframe, UnifiedAnalytics};
use crate::capability::{CapabilityAssessor, ProviderCapability};
use crate::chain::{ChainResult, ChainRunner};
use crate::config::EngineConfig;
use crate::eligibility::EligibilityValidator;
use crate::error::EngineError;
use crate::executor::api::ApiMethodExecutor;
use crate::executor::automation::AutomationMethodExecutor;
use crate::executor::manual::ManualMethodExecutor;
use crate::executor::{ExecutionRequest, MethodExecutor, MethodOutcome};
use crate::schedule::{scheduling_metadata, validate_schedule};
use crate::selector::{build_fallback_chain, select_method};
use crate::services::{
    audit_best_effort, ApiCancellationService, AuditEntry, AuditLogger,
    AutomationWorkflowService, ManualConfirmation, ManualInstructionService,
};
use crate::storage::{
    LogStore, NewLogEntry, ProviderRegistry, RequestStore, SubscriptionStore,
};
use crate::tracker::{
    OrchestrationStatus, OrchestrationTracker, UpdateCallback, UpdateSubscription,
};
use crate::types::{
    CancellationLog, CancellationOptions, CancellationOutcome, CancellationRequest, LogLevel,
    Method, MethodPreference, OutcomeError, OutcomeMetadata, RequestStatus, Subscription,
    TrackingLinks,
};

/// Durable storage handles for the engine.
pub struct EngineStores {
    pub requests: Arc<dyn RequestStore>,
    pub logs: Arc<dyn LogStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub providers: Arc<dyn ProviderRegistry>,
}

/// External collaborator handles for the engine.
pub struct CollaboratorServices {
    pub api: Arc<dyn ApiCancellationService>,
    pub automation: Arc<dyn AutomationWorkflowService>,
    pub manual: Arc<dyn ManualInstructionService>,
    pub audit: Arc<dyn AuditLogger>,
}

/// Options for retrying a failed or user-cancelled request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Force this method for the retry (disables fallback)
    pub method: Option<Method>,
    /// Escalate to automation when no explicit method is forced
    pub escalate: bool,
}

/// Durable request status plus its replayable timeline.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationStatusView {
    pub request: CancellationRequest,
    pub timeline: Vec<CancellationLog>,
}

/// Orchestration status: live session when one exists, otherwise a replay
/// of the durable request and its logs.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationStatusView {
    pub orchestration_id: Uuid,
    /// Whether an in-memory session backed this view
    pub live: bool,
    pub status: String,
    pub method: Option<Method>,
    pub request_id: Option<Uuid>,
    pub last_update: Option<chrono::DateTime<Utc>>,
    pub timeline: Vec<CancellationLog>,
}

/// The cancellation orchestration engine.
pub struct CancellationEngine {
    config: EngineConfig,
    requests: Arc<dyn RequestStore>,
    logs: Arc<dyn LogStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    assessor: CapabilityAssessor,
    eligibility: EligibilityValidator,
    analytics: AnalyticsAggregator,
    tracker: Arc<OrchestrationTracker>,
    chain_runner: ChainRunner,
    manual_service: Arc<dyn ManualInstructionService>,
    audit: Arc<dyn AuditLogger>,
    notifier: Arc<Notifier>,
}

impl CancellationEngine {
    /// Assemble the engine from its stores, collaborators and notifier.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        stores: EngineStores,
        services: CollaboratorServices,
        notifier: Arc<Notifier>,
    ) -> Self {
        let tracker = Arc::new(OrchestrationTracker::new(Arc::clone(&notifier)));
        let assessor =
            CapabilityAssessor::new(Arc::clone(&stores.providers), config.capability_ttl());
        let eligibility = EligibilityValidator::new(
            Arc::clone(&stores.subscriptions),
            Arc::clone(&stores.requests),
            Arc::clone(&services.audit),
        );
        let analytics = AnalyticsAggregator::new(Arc::clone(&stores.requests));

        let mut executors: HashMap<Method, Arc<dyn MethodExecutor>> = HashMap::new();
        executors.insert(
            Method::Api,
            Arc::new(ApiMethodExecutor::new(
                Arc::clone(&services.api),
                Arc::clone(&services.audit),
            )),
        );
        executors.insert(
            Method::Automation,
            Arc::new(AutomationMethodExecutor::new(
                Arc::clone(&services.automation),
                Arc::clone(&services.audit),
            )),
        );
        executors.insert(
            Method::Manual,
            Arc::new(ManualMethodExecutor::new(
                Arc::clone(&services.manual),
                Arc::clone(&services.audit),
            )),
        );

        let chain_runner = ChainRunner::new(
            executors,
            Arc::clone(&stores.logs),
            Arc::clone(&tracker),
            config.attempt_backoff(),
        );

        Self {
            config,
            requests: stores.requests,
            logs: stores.logs,
            subscriptions: stores.subscriptions,
            assessor,
            eligibility,
            analytics,
            tracker,
            chain_runner,
            manual_service: services.manual,
            audit: services.audit,
            notifier,
        }
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Initiate a cancellation. Always returns a structured outcome.
    pub async fn initiate_cancellation(
        &self,
        user_id: &str,
        subscription_id: &str,
        options: CancellationOptions,
    ) -> CancellationOutcome {
        let orchestration_id = Uuid::new_v4();
        info!(
            orchestration = %orchestration_id,
            user_id,
            subscription = subscription_id,
            "Initiating cancellation"
        );

        match self
            .try_initiate(orchestration_id, user_id, subscription_id, &options)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    orchestration = %orchestration_id,
                    subscription = subscription_id,
                    error = %e,
                    "Cancellation rejected before execution"
                );
                self.failure_outcome(orchestration_id, None, &e, 0)
            }
        }
    }

    /// Retry a failed or user-cancelled request. Always returns a structured
    /// outcome.
    pub async fn retry_cancellation(
        &self,
        user_id: &str,
        request_id: Uuid,
        options: RetryOptions,
    ) -> CancellationOutcome {
        let orchestration_id = Uuid::new_v4();
        info!(
            orchestration = %orchestration_id,
            request = %request_id,
            "Retrying cancellation"
        );

        match self
            .try_retry(orchestration_id, user_id, request_id, &options)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(request = %request_id, error = %e, "Retry rejected");
                self.failure_outcome(orchestration_id, Some(request_id), &e, 0)
            }
        }
    }

    /// Finalize a manual-track request from a human-reported outcome.
    pub async fn confirm_manual(
        &self,
        user_id: &str,
        request_id: Uuid,
        confirmation: ManualConfirmation,
    ) -> Result<CancellationRequest, EngineError> {
        let mut request = self.owned_request(user_id, request_id).await?;

        if request.status != RequestStatus::RequiresManual {
            return Err(EngineError::Validation(
                "request is not awaiting manual confirmation".to_string(),
            ));
        }

        // Tell the instruction collaborator; its bookkeeping must not block
        // finalizing our own state.
        if let Some(external_id) = request
            .metadata
            .get("external_request_id")
            .and_then(|v| v.as_str())
        {
            if let Err(e) = self
                .manual_service
                .confirm(user_id, external_id, &confirmation)
                .await
            {
                warn!(request = %request_id, error = %e, "Manual service confirmation failed");
            }
        }

        let now = Utc::now();
        if confirmation.was_successful {
            request.status = RequestStatus::Completed;
            request.completed_at = Some(now);
            request.confirmation_code = confirmation.confirmation_code.clone();
            request.effective_date = confirmation.effective_date;

            if let Err(e) = self.subscriptions.mark_cancelled(&request.subscription_id).await {
                error!(
                    subscription = %request.subscription_id,
                    error = %e,
                    "Failed to mark subscription cancelled after manual confirmation"
                );
            }

            self.append_log(
                &request,
                "manual_confirmed",
                LogLevel::Success,
                "user confirmed the subscription was cancelled".to_string(),
            )
            .await;
        } else {
            request.status = RequestStatus::Failed;
            self.append_log(
                &request,
                "manual_confirmed",
                LogLevel::Warning,
                "user reported the manual cancellation did not work".to_string(),
            )
            .await;
        }
        request.updated_at = now;
        self.requests.update(&request).await?;

        self.notifier.notify(CancellationEvent::ManualConfirmed {
            request_id,
            was_successful: confirmation.was_successful,
            timestamp: now,
        });
        audit_best_effort(
            self.audit.as_ref(),
            AuditEntry::success(user_id, "cancellation_manual_confirm", &request.subscription_id),
        )
        .await;

        Ok(request)
    }

    /// User-initiated abort of a pending/processing request.
    ///
    /// A pure durable-state transition: an executor call already in flight is
    /// not interrupted.
    pub async fn cancel_cancellation_request(
        &self,
        user_id: &str,
        request_id: Uuid,
    ) -> Result<CancellationRequest, EngineError> {
        let mut request = self.owned_request(user_id, request_id).await?;

        if !matches!(
            request.status,
            RequestStatus::Pending | RequestStatus::Processing
        ) {
            return Err(EngineError::Validation(format!(
                "only pending or processing requests can be aborted (status: {})",
                request.status.name()
            )));
        }

        request.status = RequestStatus::Cancelled;
        request.updated_at = Utc::now();
        self.requests.update(&request).await?;

        self.append_log(
            &request,
            "request_cancelled",
            LogLevel::Info,
            "cancellation request aborted by user".to_string(),
        )
        .await;
        self.notifier.notify(CancellationEvent::RequestCancelled {
            request_id,
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        });
        audit_best_effort(
            self.audit.as_ref(),
            AuditEntry::success(user_id, "cancellation_request_abort", &request.subscription_id),
        )
        .await;

        Ok(request)
    }

    /// Durable request status with its replayable timeline.
    pub async fn get_cancellation_status(
        &self,
        user_id: &str,
        request_id: Uuid,
    ) -> Result<CancellationStatusView, EngineError> {
        let request = self.owned_request(user_id, request_id).await?;
        let timeline = self.logs.for_request(request_id).await?;
        Ok(CancellationStatusView { request, timeline })
    }

    /// Live orchestration status, falling back to a durable replay when the
    /// in-memory session is gone.
    pub async fn get_orchestration_status(
        &self,
        orchestration_id: Uuid,
    ) -> Result<OrchestrationStatusView, EngineError> {
        if let Some(snapshot) = self.tracker.snapshot(orchestration_id).await {
            let timeline = self.logs.for_orchestration(orchestration_id).await?;
            return Ok(OrchestrationStatusView {
                orchestration_id,
                live: true,
                status: snapshot.status.name().to_string(),
                method: snapshot.method,
                request_id: Some(snapshot.request_id),
                last_update: Some(snapshot.last_update),
                timeline,
            });
        }

        let timeline = self.logs.for_orchestration(orchestration_id).await?;
        let Some(first) = timeline.first() else {
            return Err(EngineError::NotFound(format!(
                "orchestration {orchestration_id}"
            )));
        };

        let request = self.requests.get(first.request_id).await?;
        let (status, method) = request.as_ref().map_or_else(
            || ("unknown".to_string(), None),
            |r| (r.status.name().to_string(), Some(r.method)),
        );

        Ok(OrchestrationStatusView {
            orchestration_id,
            live: false,
            status,
            method,
            request_id: Some(first.request_id),
            last_update: timeline.last().map(|l| l.created_at),
            timeline,
        })
    }

    /// Subscribe to live progress updates for an orchestration.
    ///
    /// Unknown or finished orchestrations yield a no-op handle.
    pub async fn subscribe_to_updates(
        &self,
        orchestration_id: Uuid,
        callback: UpdateCallback,
    ) -> UpdateSubscription {
        self.tracker.subscribe(orchestration_id, callback).await
    }

    /// Remove a progress subscription.
    pub async fn unsubscribe(&self, subscription: &UpdateSubscription) {
        self.tracker.unsubscribe(subscription).await;
    }

    /// Derived analytics for a user over a timeframe. Never errors.
    pub async fn get_unified_analytics(
        &self,
        user_id: &str,
        timeframe: Timeframe,
    ) -> UnifiedAnalytics {
        self.analytics.unified(user_id, timeframe).await
    }

    /// Capability assessment for a provider display name.
    pub async fn get_provider_capabilities(
        &self,
        provider_name: &str,
    ) -> Result<ProviderCapability, EngineError> {
        self.assessor.assess(provider_name).await
    }

    /// The live-session tracker (for servers embedding the engine).
    #[must_use]
    pub fn tracker(&self) -> &Arc<OrchestrationTracker> {
        &self.tracker
    }

    /// The subscription store (for service plumbing around the engine).
    #[must_use]
    pub fn subscriptions(&self) -> &Arc<dyn SubscriptionStore> {
        &self.subscriptions
    }

    // =========================================================================
    // Initiation pipeline
    // =========================================================================

    async fn try_initiate(
        &self,
        orchestration_id: Uuid,
        user_id: &str,
        subscription_id: &str,
        options: &CancellationOptions,
    ) -> Result<CancellationOutcome, EngineError> {
        let subscription = self
            .eligibility
            .validate_ownership(user_id, subscription_id)
            .await?;
        self.eligibility.validate_eligibility(&subscription).await?;

        let capability = self.assessor.assess(&subscription.name).await?;
        let primary = select_method(&capability, options.preferred_method);

        if let Some(schedule_for) = options.schedule_for {
            return self
                .schedule(
                    orchestration_id,
                    user_id,
                    &subscription,
                    &capability,
                    primary,
                    schedule_for,
                    options,
                )
                .await;
        }

        let mut request = CancellationRequest::new(
            user_id,
            subscription_id,
            &capability.provider_key,
            primary,
            options.priority,
            options.user_notes.clone(),
        );
        request.metadata = serde_json::json!({
            "orchestration_id": orchestration_id.to_string(),
        });

        // The insert enforces the one-active-request rule; a violation maps
        // to CANCELLATION_IN_PROGRESS before any executor runs.
        self.requests.insert(request.clone()).await?;
        self.append_log(
            &request,
            "cancellation_initiated",
            LogLevel::Info,
            format!("cancellation initiated with {primary} as primary method"),
        )
        .await;

        Ok(self
            .run_orchestration(
                orchestration_id,
                user_id,
                &subscription,
                request,
                &capability,
                primary,
                options,
                false,
            )
            .await)
    }

    async fn try_retry(
        &self,
        orchestration_id: Uuid,
        user_id: &str,
        request_id: Uuid,
        options: &RetryOptions,
    ) -> Result<CancellationOutcome, EngineError> {
        let mut request = self
            .requests
            .get(request_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or(EngineError::RequestNotFound)?;

        if !matches!(
            request.status,
            RequestStatus::Failed | RequestStatus::Cancelled
        ) {
            return Err(EngineError::RequestNotFound);
        }

        let subscription = self
            .eligibility
            .validate_ownership(user_id, &request.subscription_id)
            .await?;
        self.eligibility.validate_eligibility(&subscription).await?;

        let capability = self.assessor.assess(&subscription.name).await?;

        let (primary, forced) = if let Some(method) = options.method {
            if !capability.supports(method) {
                return Err(EngineError::UnsupportedMethod(method));
            }
            (method, true)
        } else if options.escalate && capability.supports(Method::Automation) {
            (Method::Automation, false)
        } else {
            (select_method(&capability, MethodPreference::Auto), false)
        };

        request.status = RequestStatus::Pending;
        request.method = primary;
        request.updated_at = Utc::now();
        request.completed_at = None;
        request.metadata = serde_json::json!({
            "orchestration_id": orchestration_id.to_string(),
            "retry_of": request.orchestration_id().map(|id| id.to_string()),
        });
        self.requests.update(&request).await?;

        self.append_log(
            &request,
            "cancellation_retry",
            LogLevel::Info,
            format!(
                "retrying cancellation with {primary}{}",
                if forced { " (forced)" } else { "" }
            ),
        )
        .await;

        let retry_options = CancellationOptions {
            preferred_method: primary.into(),
            priority: request.priority,
            user_notes: request.user_notes.clone(),
            ..CancellationOptions::default()
        };

        Ok(self
            .run_orchestration(
                orchestration_id,
                user_id,
                &subscription,
                request,
                &capability,
                primary,
                &retry_options,
                forced,
            )
            .await)
    }

    /// Persist a scheduled request without running anything.
    #[allow(clippy::too_many_arguments)]
    async fn schedule(
        &self,
        orchestration_id: Uuid,
        user_id: &str,
        subscription: &Subscription,
        capability: &ProviderCapability,
        method: Method,
        schedule_for: chrono::DateTime<Utc>,
        options: &CancellationOptions,
    ) -> Result<CancellationOutcome, EngineError> {
        let now = Utc::now();
        validate_schedule(schedule_for, now)?;

        let mut request = CancellationRequest::new(
            user_id,
            &subscription.id,
            &capability.provider_key,
            method,
            options.priority,
            options.user_notes.clone(),
        );
        request.status = RequestStatus::Scheduled;
        request.metadata = scheduling_metadata(
            orchestration_id,
            schedule_for,
            options.timezone.as_deref(),
            method,
            capability,
        );

        self.requests.insert(request.clone()).await?;
        self.append_log(
            &request,
            "cancellation_scheduled",
            LogLevel::Info,
            format!(
                "cancellation scheduled for {} via {method}",
                schedule_for.to_rfc3339()
            ),
        )
        .await;

        self.notifier.notify(CancellationEvent::CancellationScheduled {
            request_id: request.id,
            subscription_id: subscription.id.clone(),
            scheduled_for: schedule_for,
            timestamp: now,
        });
        audit_best_effort(
            self.audit.as_ref(),
            AuditEntry::success(user_id, "cancellation_schedule", &subscription.id)
                .with_metadata(serde_json::json!({ "scheduled_for": schedule_for.to_rfc3339() })),
        )
        .await;

        info!(
            request = %request.id,
            scheduled_for = %schedule_for,
            "Cancellation scheduled"
        );

        Ok(CancellationOutcome {
            success: true,
            orchestration_id,
            request_id: Some(request.id),
            status: RequestStatus::Scheduled,
            method: Some(method),
            message: format!(
                "Cancellation scheduled for {}",
                schedule_for.format("%Y-%m-%d %H:%M UTC")
            ),
            estimated_completion: Some(schedule_for),
            confirmation_code: None,
            effective_date: None,
            refund_amount: None,
            manual_instructions: None,
            metadata: OutcomeMetadata {
                attempts_used: 0,
                fallback_reason: None,
                real_time_updates_enabled: false,
            },
            tracking: self.tracking_links(Some(request.id), orchestration_id),
            error: None,
        })
    }

    /// Register the live session, drive the fallback chain and finalize both
    /// the durable request and the tracker.
    #[allow(clippy::too_many_arguments)]
    async fn run_orchestration(
        &self,
        orchestration_id: Uuid,
        user_id: &str,
        subscription: &Subscription,
        mut request: CancellationRequest,
        capability: &ProviderCapability,
        primary: Method,
        options: &CancellationOptions,
        forced: bool,
    ) -> CancellationOutcome {
        self.tracker
            .register(orchestration_id, user_id, request.id, &subscription.id, primary)
            .await;

        request.status = RequestStatus::Processing;
        request.updated_at = Utc::now();
        self.update_request_best_effort(&request).await;

        let chain = build_fallback_chain(primary, capability);
        let allow_fallback = options.allow_fallback.0 && !forced;

        let execution = ExecutionRequest {
            orchestration_id,
            request_id: request.id,
            user_id: user_id.to_string(),
            subscription_id: subscription.id.clone(),
            subscription_name: subscription.name.clone(),
            priority: options.priority,
            notes: options.user_notes.clone(),
            notification_preferences: options.notification_preferences,
        };

        match self
            .chain_runner
            .run(&chain, &execution, allow_fallback)
            .await
        {
            ChainResult::Success {
                outcome,
                attempts_used,
                fallback_reason,
            } => {
                self.finalize_success(
                    orchestration_id,
                    &mut request,
                    capability,
                    &outcome,
                    attempts_used,
                    fallback_reason,
                )
                .await
            }
            ChainResult::Failure {
                error,
                attempts_used,
            } => {
                self.finalize_failure(orchestration_id, &mut request, &error, attempts_used)
                    .await
            }
        }
    }

    async fn finalize_success(
        &self,
        orchestration_id: Uuid,
        request: &mut CancellationRequest,
        capability: &ProviderCapability,
        outcome: &MethodOutcome,
        attempts_used: u32,
        fallback_reason: Option<String>,
    ) -> CancellationOutcome {
        let now = Utc::now();

        request.method = outcome.method;
        request.status = outcome.status;
        request.attempts += attempts_used;
        request.confirmation_code = outcome.confirmation_code.clone();
        request.effective_date = outcome.effective_date;
        request.refund_amount = outcome.refund_amount;
        request.updated_at = now;
        if outcome.status == RequestStatus::Completed {
            request.completed_at = Some(now);
        }
        if let Some(external_id) = &outcome.external_request_id {
            request.metadata["external_request_id"] =
                serde_json::Value::String(external_id.clone());
        }
        self.update_request_best_effort(request).await;

        // Only a confirmed success flips the subscription; automation
        // completions are reported later by the workflow collaborator, and
        // manual tracks wait for human confirmation.
        if outcome.status == RequestStatus::Completed {
            if let Err(e) = self.subscriptions.mark_cancelled(&request.subscription_id).await {
                error!(
                    subscription = %request.subscription_id,
                    error = %e,
                    "Failed to mark subscription cancelled"
                );
            }
        }

        let (tracker_status, event) = match outcome.status {
            RequestStatus::RequiresManual => (
                OrchestrationStatus::RequiresManual,
                CancellationEvent::ManualInstructionsReady {
                    orchestration_id,
                    request_id: request.id,
                    step_count: outcome
                        .instructions
                        .as_ref()
                        .map_or(0, |steps| steps.len() as u32),
                    timestamp: now,
                },
            ),
            _ => (
                OrchestrationStatus::Completed,
                CancellationEvent::OrchestrationCompleted {
                    orchestration_id,
                    request_id: request.id,
                    method: outcome.method.name().to_string(),
                    confirmation_code: outcome.confirmation_code.clone(),
                    timestamp: now,
                },
            ),
        };
        self.tracker
            .finalize(orchestration_id, tracker_status, &outcome.message, Some(event))
            .await;

        let estimated_completion = outcome.estimated_completion.or_else(|| {
            let minutes = capability.estimated_minutes(outcome.method);
            (minutes > 0).then(|| now + Duration::minutes(i64::from(minutes)))
        });

        CancellationOutcome {
            success: true,
            orchestration_id,
            request_id: Some(request.id),
            status: outcome.status,
            method: Some(outcome.method),
            message: outcome.message.clone(),
            estimated_completion,
            confirmation_code: outcome.confirmation_code.clone(),
            effective_date: outcome.effective_date,
            refund_amount: outcome.refund_amount,
            manual_instructions: outcome.instructions.clone(),
            metadata: OutcomeMetadata {
                attempts_used,
                fallback_reason,
                real_time_updates_enabled: self.config.real_time_updates,
            },
            tracking: self.tracking_links(Some(request.id), orchestration_id),
            error: None,
        }
    }

    async fn finalize_failure(
        &self,
        orchestration_id: Uuid,
        request: &mut CancellationRequest,
        error: &EngineError,
        attempts_used: u32,
    ) -> CancellationOutcome {
        let now = Utc::now();

        request.status = RequestStatus::Failed;
        request.attempts += attempts_used;
        request.updated_at = now;
        self.update_request_best_effort(request).await;

        self.append_log(
            request,
            "cancellation_failed",
            LogLevel::Error,
            error.to_string(),
        )
        .await;
        self.tracker
            .finalize(
                orchestration_id,
                OrchestrationStatus::Failed,
                &error.to_string(),
                Some(CancellationEvent::OrchestrationFailed {
                    orchestration_id,
                    request_id: request.id,
                    error: error.to_string(),
                    attempts_used,
                    timestamp: now,
                }),
            )
            .await;
        audit_best_effort(
            self.audit.as_ref(),
            AuditEntry::failure(
                &request.user_id,
                "cancellation_execute",
                &request.subscription_id,
                &error.to_string(),
            ),
        )
        .await;

        self.failure_outcome(orchestration_id, Some(request.id), error, attempts_used)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn owned_request(
        &self,
        user_id: &str,
        request_id: Uuid,
    ) -> Result<CancellationRequest, EngineError> {
        self.requests
            .get(request_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or(EngineError::RequestNotFound)
    }

    fn tracking_links(&self, request_id: Option<Uuid>, orchestration_id: Uuid) -> TrackingLinks {
        let status_check_endpoint = match request_id {
            Some(id) => format!("{}/{id}", self.config.status_endpoint_base),
            None => self.config.status_endpoint_base.clone(),
        };
        TrackingLinks {
            status_check_endpoint,
            live_update_endpoint: format!(
                "{}/{orchestration_id}",
                self.config.orchestration_endpoint_base
            ),
        }
    }

    fn failure_outcome(
        &self,
        orchestration_id: Uuid,
        request_id: Option<Uuid>,
        error: &EngineError,
        attempts_used: u32,
    ) -> CancellationOutcome {
        CancellationOutcome {
            success: false,
            orchestration_id,
            request_id,
            status: RequestStatus::Failed,
            method: None,
            message: error.to_string(),
            estimated_completion: None,
            confirmation_code: None,
            effective_date: None,
            refund_amount: None,
            manual_instructions: None,
            metadata: OutcomeMetadata {
                attempts_used,
                fallback_reason: None,
                real_time_updates_enabled: false,
            },
            tracking: self.tracking_links(request_id, orchestration_id),
            error: Some(OutcomeError {
                code: error.code(),
                message: error.to_string(),
                details: None,
            }),
        }
    }

    async fn append_log(
        &self,
        request: &CancellationRequest,
        action: &str,
        level: LogLevel,
        message: String,
    ) {
        let entry = NewLogEntry::new(
            request.id,
            request.orchestration_id(),
            action,
            level,
            message,
        );
        if let Err(e) = self.logs.append(entry).await {
            warn!(request = %request.id, action, error = %e, "Failed to append cancellation log");
        }
    }

    async fn update_request_best_effort(&self, request: &CancellationRequest) {
        if let Err(e) = self.requests.update(request).await {
            error!(request = %request.id, error = %e, "Failed to persist request update");
        }
    }
}
