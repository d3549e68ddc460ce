//! Administrative routes for the cache
//!
//! Every response uses the same envelope: `{ "success", "message", "data" }`.
//! Failures are reported through the envelope with a 4xx/5xx status rather
//! than an empty 500.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::cache::{InvalidationEngine, MultiLayerCache, WarmupOrchestrator};
use crate::error::CacheError;

/// Application state
pub struct AppState {
    pub cache: Arc<MultiLayerCache>,
    pub invalidation: Arc<InvalidationEngine>,
    pub warmup: Arc<WarmupOrchestrator>,
}

/// Response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

/// Health check payload
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    Json(AdminResponse {
        success: true,
        message: message.into(),
        data: Some(data),
    })
    .into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(AdminResponse::<()> {
            success: false,
            message: message.into(),
            data: None,
        }),
    )
        .into_response()
}

fn error_status(error: &CacheError) -> StatusCode {
    match error {
        CacheError::UnknownCategory(_) => StatusCode::BAD_REQUEST,
        CacheError::WarmupInProgress => StatusCode::CONFLICT,
        CacheError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Health check endpoint
pub async fn health_check() -> Response {
    ok(
        "healthy",
        HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )
}

pub async fn statistics(State(state): State<Arc<AppState>>) -> Response {
    ok("cache statistics", state.cache.statistics())
}

pub async fn exists(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    let exists = state.cache.exists(&key).await;
    ok(
        if exists { "key is cached" } else { "key is not cached" },
        json!({ "key": key, "exists": exists }),
    )
}

pub async fn clear_all(State(state): State<Arc<AppState>>) -> Response {
    state.cache.clear_all().await;
    info!("Cache cleared through admin API");
    ok("all cache layers cleared", json!({}))
}

pub async fn clear_tag(State(state): State<Arc<AppState>>, Path(tag): Path<String>) -> Response {
    let removed = state.invalidation.invalidate_by_tag(&tag).await;
    ok(
        format!("removed {} keys tagged {}", removed, tag),
        json!({ "tag": tag, "removed": removed }),
    )
}

/// Run a full warmup and return its final status
pub async fn warmup(State(state): State<Arc<AppState>>) -> Response {
    match state.warmup.warmup_all().await {
        Ok(status) => ok(
            format!(
                "warmup finished: {}/{} categories",
                status.completed_items, status.total_items
            ),
            status,
        ),
        Err(e) => fail(error_status(&e), e.to_string()),
    }
}

pub async fn rewarmup(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Response {
    match state.warmup.rewarmup(&category).await {
        Ok(written) => ok(
            format!("rewarmed {} ({} entries)", category, written),
            json!({ "category": category, "entries": written }),
        ),
        Err(e) => fail(error_status(&e), e.to_string()),
    }
}

pub async fn warmup_status(State(state): State<Arc<AppState>>) -> Response {
    let status = state.warmup.get_warmup_status().await;
    ok(format!("warmup {:.0}% complete", status.progress_percentage()), status)
}

pub async fn invalidation_statistics(State(state): State<Arc<AppState>>) -> Response {
    ok(
        "invalidation statistics",
        state.invalidation.get_invalidation_statistics(),
    )
}

pub async fn invalidate_key(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    let removed = state.invalidation.invalidate_by_pattern(&key).await;
    ok(
        if removed { "key invalidated" } else { "key was not cached" },
        json!({ "key": key, "removed": removed }),
    )
}
