//! System endpoints
//!
//! Endpoints:
//!   GET  /health          -> Liveness plus session, proxy and faucet counts
//!   GET  /stats           -> Aggregate statistics across all sessions
//!   GET  /proxies         -> Proxy pool size and last refresh
//!   POST /proxies/refresh -> Pull a fresh proxy list

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::api::ApiState;
use crate::session::AggregateStats;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub active_sessions: usize,
    pub proxy_count: usize,
    pub faucet_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ProxyStatusResponse {
    pub count: usize,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ProxyRefreshResponse {
    pub message: String,
    pub count: usize,
}

pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let supervisor = &state.supervisor;
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        active_sessions: supervisor.active_count().await,
        proxy_count: supervisor.proxies().len().await,
        faucet_count: supervisor.faucets().len().await,
    })
}

pub async fn get_stats(State(state): State<ApiState>) -> Json<AggregateStats> {
    Json(state.supervisor.aggregate_stats().await)
}

pub async fn get_proxies(State(state): State<ApiState>) -> Json<ProxyStatusResponse> {
    let proxies = state.supervisor.proxies();
    Json(ProxyStatusResponse {
        count: proxies.len().await,
        last_refresh: proxies.last_refresh().await,
    })
}

/// A failed refresh keeps the previous pool and answers 502
pub async fn refresh_proxies(
    State(state): State<ApiState>,
) -> Result<Json<ProxyRefreshResponse>, (StatusCode, String)> {
    match state.supervisor.refresh_proxies().await {
        Ok(count) => {
            info!(count, "Proxy pool refreshed on request");
            Ok(Json(ProxyRefreshResponse {
                message: "Proxies refreshed".to_string(),
                count,
            }))
        }
        Err(e) => {
            let retained = state.supervisor.proxies().len().await;
            error!(error = %e, retained, "Proxy refresh failed");
            Err((
                StatusCode::BAD_GATEWAY,
                format!("Proxy refresh failed, keeping {} proxies: {:#}", retained, e),
            ))
        }
    }
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(get_stats))
        .route("/proxies", get(get_proxies))
        .route("/proxies/refresh", post(refresh_proxies))
        .with_state(state)
}
