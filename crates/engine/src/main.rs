//! Cancellation engine service binary.
//!
//! Wires the orchestration engine to in-memory stores, HTTP collaborator
//! clients and the lifecycle notifier, then serves the API.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::engine::{CollaboratorServices, EngineStores};
use engine::server::{build_router, AppState};
use engine::services::http::{
    HttpApiCancellationService, HttpAuditLogger, HttpAutomationWorkflowService,
    HttpManualInstructionService,
};
use engine::services::{AuditLogger, TracingAuditLogger};
use engine::storage::{
    MemoryLogStore, MemoryProviderRegistry, MemoryRequestStore, MemorySubscriptionStore,
    ProviderRegistry,
};
use engine::{CancellationEngine, EngineConfig};

/// Cancellation orchestration engine - selects, executes and tracks
/// subscription cancellation strategies
#[derive(Parser)]
#[command(name = "unsub-engine")]
#[command(about = "Cancellation orchestration engine service")]
#[command(version)]
struct Cli {
    /// Address to bind the API server to
    #[arg(long, env = "ENGINE_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Base URL of the provider-API cancellation service
    #[arg(long, env = "API_CANCEL_URL", default_value = "http://api-cancel.unsub.svc:8080")]
    api_cancel_url: String,

    /// Base URL of the automation workflow service
    #[arg(long, env = "AUTOMATION_URL", default_value = "http://automation.unsub.svc:8080")]
    automation_url: String,

    /// Base URL of the manual-instruction service
    #[arg(long, env = "MANUAL_URL", default_value = "http://manual.unsub.svc:8080")]
    manual_url: String,

    /// Base URL of the platform audit service (tracing-only when unset)
    #[arg(long, env = "AUDIT_URL")]
    audit_url: Option<String>,

    /// Seconds to wait between fallback attempts
    #[arg(long, env = "ATTEMPT_BACKOFF_SECS", default_value_t = 2)]
    attempt_backoff_secs: u64,

    /// Capability cache TTL in seconds
    #[arg(long, env = "CAPABILITY_TTL_SECS", default_value_t = 3600)]
    capability_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = EngineConfig {
        attempt_backoff_secs: cli.attempt_backoff_secs,
        capability_ttl_secs: cli.capability_ttl_secs,
        ..EngineConfig::default()
    };

    let providers: Arc<dyn ProviderRegistry> = Arc::new(MemoryProviderRegistry::new());
    let stores = EngineStores {
        requests: Arc::new(MemoryRequestStore::new()),
        logs: Arc::new(MemoryLogStore::new()),
        subscriptions: Arc::new(MemorySubscriptionStore::new()),
        providers: Arc::clone(&providers),
    };
    info!("Using in-memory stores; state does not survive a restart");

    let audit: Arc<dyn AuditLogger> = match &cli.audit_url {
        Some(url) => Arc::new(HttpAuditLogger::new(url.clone())),
        None => Arc::new(TracingAuditLogger),
    };
    let services = CollaboratorServices {
        api: Arc::new(HttpApiCancellationService::new(cli.api_cancel_url.clone())),
        automation: Arc::new(HttpAutomationWorkflowService::new(
            cli.automation_url.clone(),
        )),
        manual: Arc::new(HttpManualInstructionService::new(cli.manual_url.clone())),
        audit,
    };

    let notifier = Arc::new(notify::Notifier::from_env());
    let engine = CancellationEngine::new(config, stores, services, notifier);

    let state = Arc::new(AppState { engine, providers });
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(bind = %cli.bind, "Cancellation engine listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
