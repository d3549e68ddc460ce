//! Admin API server

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::routes::{
    clear_all, clear_tag, exists, health_check, invalidate_key, invalidation_statistics, rewarmup,
    statistics, warmup, warmup_status, AppState,
};

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Build the admin router over the given state
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/admin/cache/statistics", get(statistics))
        .route("/admin/cache/exists/:key", get(exists))
        .route("/admin/cache/clear", post(clear_all))
        .route("/admin/cache/clear-tag/:tag", post(clear_tag))
        .route("/admin/cache/warmup", post(warmup))
        .route("/admin/cache/warmup/status", get(warmup_status))
        .route("/admin/cache/rewarmup/:category", post(rewarmup))
        .route("/admin/cache/invalidation/statistics", get(invalidation_statistics))
        .route("/admin/cache/invalidate/:key", post(invalidate_key))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Start the API server
    pub async fn start(self) -> Result<()> {
        let app = build_router(self.state);

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Starting admin API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
