//! Ownership and eligibility validation.
//!
//! The in-flight check here is the read-side fast path; the request store's
//! insert-time uniqueness rule remains the authoritative signal under
//! concurrent initiations for the same subscription.

use std::sync::Arc;

use crate::error::EngineError;
use crate::services::{audit_best_effort, AuditEntry, AuditLogger};
use crate::storage::{RequestStore, SubscriptionStore};
use crate::types::Subscription;

/// Validates that a cancellation may be initiated at all.
pub struct EligibilityValidator {
    subscriptions: Arc<dyn SubscriptionStore>,
    requests: Arc<dyn RequestStore>,
    audit: Arc<dyn AuditLogger>,
}

impl EligibilityValidator {
    /// Create a new validator.
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        requests: Arc<dyn RequestStore>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            subscriptions,
            requests,
            audit,
        }
    }

    /// Validate that the subscription exists and belongs to the user.
    ///
    /// A subscription owned by someone else is reported as not-found rather
    /// than leaking its existence; the mismatch is audit-logged.
    pub async fn validate_ownership(
        &self,
        user_id: &str,
        subscription_id: &str,
    ) -> Result<Subscription, EngineError> {
        let subscription = self.subscriptions.get(subscription_id).await?;

        match subscription {
            Some(subscription) if subscription.user_id == user_id => Ok(subscription),
            Some(_) => {
                audit_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::failure(
                        user_id,
                        "cancellation_ownership_check",
                        subscription_id,
                        "subscription belongs to a different user",
                    ),
                )
                .await;
                Err(EngineError::NotFound(format!(
                    "subscription {subscription_id}"
                )))
            }
            None => {
                audit_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::failure(
                        user_id,
                        "cancellation_ownership_check",
                        subscription_id,
                        "subscription does not exist",
                    ),
                )
                .await;
                Err(EngineError::NotFound(format!(
                    "subscription {subscription_id}"
                )))
            }
        }
    }

    /// Validate that the subscription can be cancelled right now.
    pub async fn validate_eligibility(
        &self,
        subscription: &Subscription,
    ) -> Result<(), EngineError> {
        if !subscription.is_active || subscription.status == "cancelled" {
            return Err(EngineError::AlreadyCancelled);
        }

        if self
            .requests
            .active_for_subscription(&subscription.id)
            .await?
            .is_some()
        {
            return Err(EngineError::InProgress);
        }

        Ok(())
    }
}
