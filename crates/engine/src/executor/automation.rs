//! Browser-automation method executor.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ExecutionRequest, ExecutorError, MethodExecutor, MethodOutcome};
use crate::services::{
    audit_best_effort, AuditEntry, AuditLogger, AutomationRequest, AutomationWorkflowService,
};
use crate::types::{Method, RequestStatus};

/// Executes cancellations through the browser-automation collaborator.
///
/// "Success" here means the workflow was accepted; the workflow itself
/// completes asynchronously, so the request stays in `processing`.
pub struct AutomationMethodExecutor {
    service: Arc<dyn AutomationWorkflowService>,
    audit: Arc<dyn AuditLogger>,
}

impl AutomationMethodExecutor {
    #[must_use]
    pub fn new(service: Arc<dyn AutomationWorkflowService>, audit: Arc<dyn AuditLogger>) -> Self {
        Self { service, audit }
    }
}

#[async_trait]
impl MethodExecutor for AutomationMethodExecutor {
    fn method(&self) -> Method {
        Method::Automation
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<MethodOutcome, ExecutorError> {
        debug!(
            subscription = %request.subscription_id,
            "Starting automation workflow"
        );

        let call = AutomationRequest {
            subscription_id: request.subscription_id.clone(),
            priority: request.priority,
            notes: request.notes.clone(),
            notification_preferences: request.notification_preferences,
        };

        match self.service.initiate(&request.user_id, &call).await {
            Ok(response) => {
                info!(
                    subscription = %request.subscription_id,
                    workflow = response.workflow_id.as_deref().unwrap_or("unknown"),
                    "Automation workflow started"
                );

                audit_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::success(
                        &request.user_id,
                        "cancellation_automation_execute",
                        &request.subscription_id,
                    )
                    .with_metadata(serde_json::json!({
                        "provider": request.subscription_name,
                        "workflow_id": response.workflow_id,
                    })),
                )
                .await;

                Ok(MethodOutcome {
                    method: Method::Automation,
                    status: RequestStatus::Processing,
                    message: "Automation workflow started; cancellation in progress".to_string(),
                    confirmation_code: None,
                    effective_date: None,
                    refund_amount: None,
                    estimated_completion: response.estimated_completion,
                    instructions: None,
                    external_request_id: Some(response.request_id),
                })
            }
            Err(e) => {
                audit_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::failure(
                        &request.user_id,
                        "cancellation_automation_execute",
                        &request.subscription_id,
                        &e.to_string(),
                    ),
                )
                .await;

                Err(ExecutorError::new(Method::Automation, e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_execution_request;
    use crate::services::{AutomationResponse, MockAuditLogger, MockAutomationWorkflowService};
    use chrono::Utc;

    #[tokio::test]
    async fn test_accepted_workflow_stays_processing() {
        let mut service = MockAutomationWorkflowService::new();
        let eta = Utc::now() + chrono::Duration::minutes(15);
        service.expect_initiate().returning(move |_, _| {
            Ok(AutomationResponse {
                request_id: "ext-3".to_string(),
                workflow_id: Some("wf-9".to_string()),
                estimated_completion: Some(eta),
            })
        });
        let mut audit = MockAuditLogger::new();
        audit.expect_log().returning(|_| Ok(()));

        let executor = AutomationMethodExecutor::new(Arc::new(service), Arc::new(audit));
        let outcome = executor.execute(&test_execution_request()).await.unwrap();

        assert_eq!(outcome.status, RequestStatus::Processing);
        assert!(outcome.estimated_completion.is_some());
        assert_eq!(outcome.external_request_id.as_deref(), Some("ext-3"));
    }

    #[tokio::test]
    async fn test_rejected_workflow_is_wrapped() {
        let mut service = MockAutomationWorkflowService::new();
        service.expect_initiate().returning(|_, _| {
            Err(crate::services::ServiceError::Unavailable(
                "no workers".to_string(),
            ))
        });
        let mut audit = MockAuditLogger::new();
        audit.expect_log().returning(|_| Ok(()));

        let executor = AutomationMethodExecutor::new(Arc::new(service), Arc::new(audit));
        let err = executor
            .execute(&test_execution_request())
            .await
            .unwrap_err();

        assert_eq!(err.method, Method::Automation);
    }
}
