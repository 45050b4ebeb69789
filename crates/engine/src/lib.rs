//! Cancellation orchestration engine.
//!
//! Coordinates three heterogeneous cancellation strategies (provider API,
//! browser automation, manual instructions), picks the best one per provider,
//! falls back intelligently on failure, tracks live progress, supports
//! scheduling, and derives success/failure analytics.
//!
//! # Architecture
//!
//! - [`capability`]: per-provider method support and success likelihood,
//!   registry-backed or heuristic, cached with a TTL
//! - [`selector`]: pure method selection and fallback chain construction
//! - [`executor`]: one executor per method, each wrapping one collaborator
//! - [`chain`]: sequential fallback execution with policy-aware
//!   short-circuiting
//! - [`tracker`]: in-memory live-session registry with subscriber callbacks
//! - [`analytics`]: derived statistics over historical requests
//! - [`engine`]: the facade exposing the public operations
//! - [`server`]: axum HTTP surface over the facade

pub mod analytics;
pub mod capability;
pub mod chain;
pub mod config;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod executor;
pub mod schedule;
pub mod selector;
pub mod server;
pub mod services;
pub mod storage;
pub mod tracker;
pub mod types;

pub use analytics::{Timeframe, UnifiedAnalytics};
pub use capability::{CapabilityAssessor, CapabilitySource, ProviderCapability};
pub use config::EngineConfig;
pub use engine::{
    CancellationEngine, CollaboratorServices, EngineStores, OrchestrationStatusView,
    RetryOptions,
};
pub use error::{EngineError, ErrorCode};
pub use tracker::{OrchestrationStatus, OrchestrationTracker, UpdateSubscription};
pub use types::{
    CancellationOptions, CancellationOutcome, CancellationRequest, Method, MethodPreference,
    Priority, RequestStatus,
};
