//! Provider-API method executor.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ExecutionRequest, ExecutorError, MethodExecutor, MethodOutcome};
use crate::services::{
    audit_best_effort, ApiCancelRequest, ApiCancellationService, AuditEntry, AuditLogger,
};
use crate::types::{Method, RequestStatus};

/// Executes cancellations through the provider-API collaborator.
pub struct ApiMethodExecutor {
    service: Arc<dyn ApiCancellationService>,
    audit: Arc<dyn AuditLogger>,
}

impl ApiMethodExecutor {
    #[must_use]
    pub fn new(service: Arc<dyn ApiCancellationService>, audit: Arc<dyn AuditLogger>) -> Self {
        Self { service, audit }
    }
}

#[async_trait]
impl MethodExecutor for ApiMethodExecutor {
    fn method(&self) -> Method {
        Method::Api
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<MethodOutcome, ExecutorError> {
        debug!(
            subscription = %request.subscription_id,
            "Executing API cancellation"
        );

        let call = ApiCancelRequest {
            subscription_id: request.subscription_id.clone(),
            priority: request.priority,
            notes: request.notes.clone(),
        };

        match self.service.initiate(&request.user_id, &call).await {
            Ok(response) => {
                info!(
                    subscription = %request.subscription_id,
                    external_id = %response.request_id,
                    "API cancellation accepted"
                );

                audit_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::success(
                        &request.user_id,
                        "cancellation_api_execute",
                        &request.subscription_id,
                    )
                    .with_metadata(serde_json::json!({
                        "provider": request.subscription_name,
                        "external_request_id": response.request_id,
                    })),
                )
                .await;

                // Most provider APIs confirm synchronously; a few queue the
                // cancellation and report completion later.
                let completed = response.status == "completed"
                    || response.confirmation_code.is_some();
                let status = if completed {
                    RequestStatus::Completed
                } else {
                    RequestStatus::Processing
                };
                let message = if completed {
                    "Subscription cancelled via provider API".to_string()
                } else {
                    "Provider API accepted the cancellation; completion pending".to_string()
                };

                Ok(MethodOutcome {
                    method: Method::Api,
                    status,
                    message,
                    confirmation_code: response.confirmation_code,
                    effective_date: response.effective_date,
                    refund_amount: response.refund_amount,
                    estimated_completion: None,
                    instructions: None,
                    external_request_id: Some(response.request_id),
                })
            }
            Err(e) => {
                audit_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::failure(
                        &request.user_id,
                        "cancellation_api_execute",
                        &request.subscription_id,
                        &e.to_string(),
                    ),
                )
                .await;

                Err(ExecutorError::new(Method::Api, e.to_string()))
            }
        }
    }
}
