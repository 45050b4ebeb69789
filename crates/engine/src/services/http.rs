//! HTTP clients for collaborator services.
//!
//! Thin reqwest wrappers used by the binary. Each client posts JSON to a
//! configured base URL and maps non-success responses into [`ServiceError`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{
    ApiCancelRequest, ApiCancelResponse, ApiCancellationService, AuditEntry, AuditLogger,
    AutomationRequest, AutomationResponse, AutomationWorkflowService, ManualConfirmation,
    ManualInstructionService, ManualRequest, ManualResponse, ServiceError,
};

/// POST JSON and check the response status.
async fn post_checked<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    user_id: &str,
    body: &B,
) -> Result<reqwest::Response, ServiceError> {
    let response = client
        .post(url)
        .header("x-user-id", user_id)
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ServiceError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

/// POST JSON and deserialize the response body.
async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    user_id: &str,
    body: &B,
) -> Result<T, ServiceError> {
    let response = post_checked(client, url, user_id, body).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
}

/// HTTP client for the provider-API cancellation service.
pub struct HttpApiCancellationService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApiCancellationService {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl ApiCancellationService for HttpApiCancellationService {
    async fn initiate(
        &self,
        user_id: &str,
        request: &ApiCancelRequest,
    ) -> Result<ApiCancelResponse, ServiceError> {
        let url = format!("{}/cancellations", self.base_url);
        debug!(url = %url, subscription = %request.subscription_id, "Calling API cancellation service");
        post_json(&self.client, &url, user_id, request).await
    }
}

/// HTTP client for the automation workflow service.
pub struct HttpAutomationWorkflowService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAutomationWorkflowService {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl AutomationWorkflowService for HttpAutomationWorkflowService {
    async fn initiate(
        &self,
        user_id: &str,
        request: &AutomationRequest,
    ) -> Result<AutomationResponse, ServiceError> {
        let url = format!("{}/workflows", self.base_url);
        debug!(url = %url, subscription = %request.subscription_id, "Starting automation workflow");
        post_json(&self.client, &url, user_id, request).await
    }
}

/// HTTP client for the manual-instruction service.
pub struct HttpManualInstructionService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpManualInstructionService {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl ManualInstructionService for HttpManualInstructionService {
    async fn provide_instructions(
        &self,
        user_id: &str,
        request: &ManualRequest,
    ) -> Result<ManualResponse, ServiceError> {
        let url = format!("{}/instructions", self.base_url);
        debug!(url = %url, subscription = %request.subscription_id, "Fetching manual instructions");
        post_json(&self.client, &url, user_id, request).await
    }

    async fn confirm(
        &self,
        user_id: &str,
        request_id: &str,
        confirmation: &ManualConfirmation,
    ) -> Result<(), ServiceError> {
        let url = format!("{}/instructions/{}/confirm", self.base_url, request_id);
        debug!(url = %url, "Confirming manual cancellation outcome");
        post_checked(&self.client, &url, user_id, confirmation).await?;
        Ok(())
    }
}

/// HTTP client for the platform audit logger.
pub struct HttpAuditLogger {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuditLogger {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl AuditLogger for HttpAuditLogger {
    async fn log(&self, entry: AuditEntry) -> Result<(), ServiceError> {
        let url = format!("{}/audit", self.base_url);
        let user_id = entry.user_id.clone();
        post_checked(&self.client, &url, &user_id, &entry).await?;
        Ok(())
    }
}
