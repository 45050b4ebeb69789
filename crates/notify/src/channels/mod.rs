//! Notification channel implementations.

pub mod webhook;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::events::CancellationEvent;

/// Trait for notification channels (webhooks, chat integrations, etc.).
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Send a lifecycle event to this channel.
    async fn send(&self, event: &CancellationEvent) -> Result<(), ChannelError>;
}
