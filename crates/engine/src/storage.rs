//! Persistence seams for the cancellation engine.
//!
//! The engine talks to durable storage only through these traits. The
//! in-memory implementations back the binary and the test suite; a database
//! adapter implements the same contracts in the surrounding platform.
//!
//! Two storage-level guarantees the engine leans on:
//! - `RequestStore::insert` enforces at most one request per subscription in
//!   an active status, and reports a violation as a typed error. The insert
//!   is the authoritative `CANCELLATION_IN_PROGRESS` signal; the eligibility
//!   validator's read-side check is a fast path only.
//! - `LogStore::append` assigns a monotonically increasing per-request
//!   sequence number, making the log the replay source for a timeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::capability::StoredProvider;
use crate::types::{
    CancellationLog, CancellationRequest, LogLevel, RequestStatus, Subscription,
};

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Uniqueness rule violated: an active request already exists.
    #[error("an active cancellation request already exists for subscription {0}")]
    ActiveRequestExists(String),

    /// Row not found for an update.
    #[error("{0} not found")]
    NotFound(String),

    /// Backend unavailable or failed.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable store for cancellation requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new request, enforcing the one-active-per-subscription rule.
    async fn insert(&self, request: CancellationRequest) -> Result<(), StorageError>;

    /// Update an existing request.
    async fn update(&self, request: &CancellationRequest) -> Result<(), StorageError>;

    /// Fetch a request by ID.
    async fn get(&self, id: Uuid) -> Result<Option<CancellationRequest>, StorageError>;

    /// Fetch the active request for a subscription, if one exists.
    async fn active_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<CancellationRequest>, StorageError>;

    /// Fetch all requests for a user created at or after `since`.
    async fn for_user_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CancellationRequest>, StorageError>;
}

/// Fields for a new log entry; the store assigns id, seq and timestamp.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub request_id: Uuid,
    pub orchestration_id: Option<Uuid>,
    pub action: String,
    pub level: LogLevel,
    pub message: String,
    pub metadata: serde_json::Value,
}

impl NewLogEntry {
    /// Convenience constructor with empty metadata.
    #[must_use]
    pub fn new(
        request_id: Uuid,
        orchestration_id: Option<Uuid>,
        action: &str,
        level: LogLevel,
        message: String,
    ) -> Self {
        Self {
            request_id,
            orchestration_id,
            action: action.to_string(),
            level,
            message,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Append-only store for cancellation logs.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append an entry; returns the stored row with seq assigned.
    async fn append(&self, entry: NewLogEntry) -> Result<CancellationLog, StorageError>;

    /// All entries for a request, in sequence order.
    async fn for_request(&self, request_id: Uuid) -> Result<Vec<CancellationLog>, StorageError>;

    /// All entries for an orchestration, in creation order.
    async fn for_orchestration(
        &self,
        orchestration_id: Uuid,
    ) -> Result<Vec<CancellationLog>, StorageError>;
}

/// Read/write access to the platform's subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Fetch a subscription by ID.
    async fn get(&self, id: &str) -> Result<Option<Subscription>, StorageError>;

    /// Insert or replace a subscription.
    async fn upsert(&self, subscription: Subscription) -> Result<(), StorageError>;

    /// Transition a subscription to cancelled/inactive.
    async fn mark_cancelled(&self, id: &str) -> Result<(), StorageError>;
}

/// Persisted registry of providers with known cancellation support.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Look up a provider by its normalized key.
    async fn find(&self, key: &str) -> Result<Option<StoredProvider>, StorageError>;

    /// Insert or replace a registry row.
    async fn upsert(&self, provider: StoredProvider) -> Result<(), StorageError>;
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// In-memory request store.
#[derive(Default)]
pub struct MemoryRequestStore {
    requests: RwLock<HashMap<Uuid, CancellationRequest>>,
}

impl MemoryRequestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn insert(&self, request: CancellationRequest) -> Result<(), StorageError> {
        let mut requests = self.requests.write().await;
        if request.status.is_active()
            && requests
                .values()
                .any(|r| r.subscription_id == request.subscription_id && r.status.is_active())
        {
            return Err(StorageError::ActiveRequestExists(
                request.subscription_id.clone(),
            ));
        }
        requests.insert(request.id, request);
        Ok(())
    }

    async fn update(&self, request: &CancellationRequest) -> Result<(), StorageError> {
        let mut requests = self.requests.write().await;
        if !requests.contains_key(&request.id) {
            return Err(StorageError::NotFound(format!("request {}", request.id)));
        }
        requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<CancellationRequest>, StorageError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id).cloned())
    }

    async fn active_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<CancellationRequest>, StorageError> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .find(|r| r.subscription_id == subscription_id && r.status.is_active())
            .cloned())
    }

    async fn for_user_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CancellationRequest>, StorageError> {
        let requests = self.requests.read().await;
        let mut rows: Vec<_> = requests
            .values()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }
}

/// In-memory append-only log store.
#[derive(Default)]
pub struct MemoryLogStore {
    logs: RwLock<Vec<CancellationLog>>,
}

impl MemoryLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, entry: NewLogEntry) -> Result<CancellationLog, StorageError> {
        let mut logs = self.logs.write().await;
        let seq = logs
            .iter()
            .filter(|l| l.request_id == entry.request_id)
            .count() as u64
            + 1;
        let row = CancellationLog {
            id: Uuid::new_v4(),
            request_id: entry.request_id,
            orchestration_id: entry.orchestration_id,
            seq,
            action: entry.action,
            level: entry.level,
            message: entry.message,
            metadata: entry.metadata,
            created_at: Utc::now(),
        };
        logs.push(row.clone());
        Ok(row)
    }

    async fn for_request(&self, request_id: Uuid) -> Result<Vec<CancellationLog>, StorageError> {
        let logs = self.logs.read().await;
        let mut rows: Vec<_> = logs
            .iter()
            .filter(|l| l.request_id == request_id)
            .cloned()
            .collect();
        rows.sort_by_key(|l| l.seq);
        Ok(rows)
    }

    async fn for_orchestration(
        &self,
        orchestration_id: Uuid,
    ) -> Result<Vec<CancellationLog>, StorageError> {
        let logs = self.logs.read().await;
        Ok(logs
            .iter()
            .filter(|l| l.orchestration_id == Some(orchestration_id))
            .cloned()
            .collect())
    }
}

/// In-memory subscription store.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl MemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn get(&self, id: &str) -> Result<Option<Subscription>, StorageError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(id).cloned())
    }

    async fn upsert(&self, subscription: Subscription) -> Result<(), StorageError> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.id.clone(), subscription);
        Ok(())
    }

    async fn mark_cancelled(&self, id: &str) -> Result<(), StorageError> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("subscription {id}")))?;
        subscription.status = "cancelled".to_string();
        subscription.is_active = false;
        Ok(())
    }
}

/// In-memory provider registry.
#[derive(Default)]
pub struct MemoryProviderRegistry {
    providers: RwLock<HashMap<String, StoredProvider>>,
}

impl MemoryProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProviderRegistry for MemoryProviderRegistry {
    async fn find(&self, key: &str) -> Result<Option<StoredProvider>, StorageError> {
        let providers = self.providers.read().await;
        Ok(providers.get(key).cloned())
    }

    async fn upsert(&self, provider: StoredProvider) -> Result<(), StorageError> {
        let mut providers = self.providers.write().await;
        providers.insert(provider.key.clone(), provider);
        Ok(())
    }
}
