//! HTTP route handlers for the memory bridge dashboard.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::memory::adapters::dispatch_json;
use crate::memory::core::config::EffectiveConfig;
use crate::memory::core::errors::MemoryError;
use crate::memory::engine::{PreviewRequest, PromptPreview};
use crate::memory::telemetry::{DEFAULT_LOG_LIMIT, StatEvent, StatKind, StatsSnapshot};

use super::state::AppState;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/stats", get(get_stats))
        .route("/api/stats/flush", post(flush_stats))
        .route("/api/logs", get(get_logs))
        .route(
            "/api/config",
            get(get_config).post(update_config).delete(reset_config),
        )
        .route("/api/prompt/preview", post(preview_prompt))
        .route("/api/hooks", post(handle_hook))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "memos-bridge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.telemetry().stats())
}

async fn flush_stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let telemetry = state.telemetry();
    telemetry
        .persist()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({
        "flushed": telemetry.path().is_some(),
        "path": telemetry.path().map(|p| p.display().to_string()),
    })))
}

/// Log listing query.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    /// Event kind filter; empty or `all` disables it.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Max entries returned.
    pub limit: Option<usize>,
}

async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<StatEvent>>, ApiError> {
    let kind = match query.kind.as_deref().map(str::trim) {
        None | Some("" | "all") => None,
        Some(raw) => Some(raw.parse::<StatKind>().map_err(|unknown| {
            api_error(StatusCode::BAD_REQUEST, format!("unknown event type: {unknown}"))
        })?),
    };

    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Ok(Json(state.telemetry().logs(kind, limit)))
}

fn config_view(state: &AppState, config: &EffectiveConfig) -> Json<Value> {
    Json(json!({
        "effective": config.redacted(),
        "overrides": state.telemetry().overrides(),
    }))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.bridge.config();
    config_view(&state, &config)
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    match state.bridge.apply_overrides(&update).await {
        Ok(config) => Ok(config_view(&state, &config)),
        Err(MemoryError::Validation(errors)) => {
            Err((StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))))
        }
        Err(err) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())),
    }
}

async fn reset_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.bridge.clear_overrides().await;
    config_view(&state, &config)
}

async fn preview_prompt(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<PromptPreview>, ApiError> {
    state
        .bridge
        .preview_prompt(&request)
        .await
        .map(Json)
        .map_err(|err| {
            let status = match err {
                MemoryError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
                MemoryError::MissingCredential => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            };
            api_error(status, err.to_string())
        })
}

async fn handle_hook(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    dispatch_json(state.bridge.as_ref(), &envelope)
        .await
        .map(Json)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.to_string()))
}
