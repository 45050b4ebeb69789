//! Manual-instruction method executor.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{ExecutionRequest, ExecutorError, MethodExecutor, MethodOutcome};
use crate::services::{
    audit_best_effort, AuditEntry, AuditLogger, ManualInstructionService, ManualRequest,
};
use crate::types::{Method, RequestStatus};

/// Executes cancellations by generating step-by-step instructions for the
/// user to follow.
///
/// This executor cannot fail at the business level: a human can always be
/// given instructions. It only errors when the instruction collaborator
/// cannot produce data. The subscription is marked cancelled later, through
/// the separate manual-confirmation operation.
pub struct ManualMethodExecutor {
    service: Arc<dyn ManualInstructionService>,
    audit: Arc<dyn AuditLogger>,
}

impl ManualMethodExecutor {
    #[must_use]
    pub fn new(service: Arc<dyn ManualInstructionService>, audit: Arc<dyn AuditLogger>) -> Self {
        Self { service, audit }
    }
}

#[async_trait]
impl MethodExecutor for ManualMethodExecutor {
    fn method(&self) -> Method {
        Method::Manual
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<MethodOutcome, ExecutorError> {
        debug!(
            subscription = %request.subscription_id,
            "Generating manual cancellation instructions"
        );

        let call = ManualRequest {
            subscription_id: request.subscription_id.clone(),
            notes: request.notes.clone(),
        };

        match self.service.provide_instructions(&request.user_id, &call).await {
            Ok(response) => {
                audit_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::success(
                        &request.user_id,
                        "cancellation_manual_instructions",
                        &request.subscription_id,
                    )
                    .with_metadata(serde_json::json!({
                        "provider": request.subscription_name,
                        "step_count": response.instructions.len(),
                    })),
                )
                .await;

                Ok(MethodOutcome {
                    method: Method::Manual,
                    status: RequestStatus::RequiresManual,
                    message: "Manual cancellation instructions generated; confirm once done"
                        .to_string(),
                    confirmation_code: None,
                    effective_date: None,
                    refund_amount: None,
                    estimated_completion: None,
                    instructions: Some(response.instructions),
                    external_request_id: Some(response.request_id),
                })
            }
            Err(e) => {
                audit_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::failure(
                        &request.user_id,
                        "cancellation_manual_instructions",
                        &request.subscription_id,
                        &e.to_string(),
                    ),
                )
                .await;

                Err(ExecutorError::new(Method::Manual, e.to_string()))
            }
        }
    }
}
