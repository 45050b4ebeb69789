//! Generic JSON webhook notification channel.
//!
//! Posts lifecycle events to a configured HTTP endpoint. Downstream
//! consumers (dashboards, email/push fan-out, chat bridges) subscribe by
//! exposing a single POST endpoint.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::ChannelError;
use crate::events::CancellationEvent;
use crate::NotifyChannel;

/// Environment variable for the lifecycle webhook URL.
const ENV_WEBHOOK_URL: &str = "UNSUB_WEBHOOK_URL";

/// Generic webhook notification channel.
pub struct WebhookChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Create a new webhook channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var(ENV_WEBHOOK_URL).ok();

        if webhook_url.is_some() {
            debug!("Webhook notifications enabled");
        } else {
            debug!("Webhook notifications disabled (UNSUB_WEBHOOK_URL not set)");
        }

        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a webhook channel with a specific URL.
    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url: Some(webhook_url),
            client: reqwest::Client::new(),
        }
    }

    /// Format an event as a webhook payload.
    fn format_payload(event: &CancellationEvent) -> WebhookPayload<'_> {
        WebhookPayload {
            title: event.title(),
            description: event.description(),
            severity: event.severity().as_str(),
            color: event.severity().color(),
            timestamp: event.timestamp().to_rfc3339(),
            event,
        }
    }
}

#[async_trait]
impl NotifyChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, event: &CancellationEvent) -> Result<(), ChannelError> {
        let url = self
            .webhook_url
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured("webhook URL not set".to_string()))?;

        let payload = Self::format_payload(event);

        let response = self.client.post(url).json(&payload).send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            return Err(ChannelError::Other(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Payload posted to the webhook endpoint.
#[derive(Serialize)]
struct WebhookPayload<'a> {
    title: String,
    description: String,
    severity: &'static str,
    color: u32,
    timestamp: String,
    event: &'a CancellationEvent,
}
