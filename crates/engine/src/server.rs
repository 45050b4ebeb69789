//! HTTP server exposing the engine's public operations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::analytics::Timeframe;
use crate::capability::StoredProvider;
use crate::engine::{CancellationEngine, RetryOptions};
use crate::error::{EngineError, ErrorCode};
use crate::services::ManualConfirmation;
use crate::storage::{ProviderRegistry, SubscriptionStore as _};
use crate::types::{CancellationOptions, Subscription};

/// Shared server state.
pub struct AppState {
    /// The orchestration engine
    pub engine: CancellationEngine,
    /// Provider registry, exposed for operational seeding
    pub providers: Arc<dyn ProviderRegistry>,
}

/// Build the engine API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/cancellations", post(initiate_handler))
        .route("/api/cancellations/{id}", get(request_status_handler))
        .route("/api/cancellations/{id}/retry", post(retry_handler))
        .route("/api/cancellations/{id}/cancel", post(cancel_request_handler))
        .route("/api/cancellations/{id}/confirm", post(confirm_manual_handler))
        .route("/api/orchestrations/{id}", get(orchestration_status_handler))
        .route("/api/analytics", get(analytics_handler))
        .route(
            "/api/providers/{name}/capabilities",
            get(capabilities_handler),
        )
        .route("/api/providers", post(upsert_provider_handler))
        .route("/api/subscriptions", post(upsert_subscription_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Engine errors rendered as JSON problem responses.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = match code {
            ErrorCode::NotFound | ErrorCode::RequestNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError
            | ErrorCode::UnsupportedMethod
            | ErrorCode::SchedulingValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::AlreadyCancelled | ErrorCode::CancellationInProgress => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_orchestrations: usize,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        active_orchestrations: state.engine.tracker().active_count().await,
    })
}

/// Body for the initiate endpoint.
#[derive(Deserialize)]
struct InitiateBody {
    user_id: String,
    subscription_id: String,
    #[serde(flatten)]
    options: CancellationOptions,
}

async fn initiate_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InitiateBody>,
) -> impl IntoResponse {
    // The engine converts every failure into a structured outcome, so this
    // handler always answers 200 with the result object.
    let outcome = state
        .engine
        .initiate_cancellation(&body.user_id, &body.subscription_id, body.options)
        .await;
    Json(outcome)
}

/// Body for the retry endpoint.
#[derive(Deserialize)]
struct RetryBody {
    user_id: String,
    #[serde(flatten)]
    options: RetryOptions,
}

async fn retry_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RetryBody>,
) -> impl IntoResponse {
    let outcome = state
        .engine
        .retry_cancellation(&body.user_id, id, body.options)
        .await;
    Json(outcome)
}

/// Body for user-scoped operations.
#[derive(Deserialize)]
struct UserBody {
    user_id: String,
}

async fn cancel_request_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UserBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .engine
        .cancel_cancellation_request(&body.user_id, id)
        .await?;
    Ok(Json(request))
}

/// Body for the manual confirmation endpoint.
#[derive(Deserialize)]
struct ConfirmBody {
    user_id: String,
    #[serde(flatten)]
    confirmation: ManualConfirmation,
}

async fn confirm_manual_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfirmBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .engine
        .confirm_manual(&body.user_id, id, body.confirmation)
        .await?;
    Ok(Json(request))
}

/// Query for user-scoped reads.
#[derive(Deserialize)]
struct UserQuery {
    user_id: String,
}

async fn request_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .engine
        .get_cancellation_status(&query.user_id, id)
        .await?;
    Ok(Json(view))
}

async fn orchestration_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.engine.get_orchestration_status(id).await?;
    Ok(Json(view))
}

/// Query for the analytics endpoint.
#[derive(Deserialize)]
struct AnalyticsQuery {
    user_id: String,
    #[serde(default)]
    timeframe: Timeframe,
}

async fn analytics_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> impl IntoResponse {
    let analytics = state
        .engine
        .get_unified_analytics(&query.user_id, query.timeframe)
        .await;
    Json(analytics)
}

async fn capabilities_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let capability = state.engine.get_provider_capabilities(&name).await?;
    Ok(Json(capability))
}

async fn upsert_provider_handler(
    State(state): State<Arc<AppState>>,
    Json(provider): Json<StoredProvider>,
) -> Result<impl IntoResponse, ApiError> {
    info!(provider = %provider.key, "Upserting provider registry row");
    state
        .providers
        .upsert(provider)
        .await
        .map_err(EngineError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upsert_subscription_handler(
    State(state): State<Arc<AppState>>,
    Json(subscription): Json<Subscription>,
) -> Result<impl IntoResponse, ApiError> {
    info!(subscription = %subscription.id, "Upserting subscription");
    state
        .engine
        .subscriptions()
        .upsert(subscription)
        .await
        .map_err(EngineError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
