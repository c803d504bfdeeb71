//! HTTP API for the faucet orchestrator
//!
//! Provides REST endpoints for:
//! - Faucet registry listing and additions
//! - Session start, stop and inspection
//! - Health, aggregate statistics and proxy pool control
//! - Request middleware (rate limiting, headers, logging)

pub mod faucets;
pub mod middleware;
pub mod sessions;
pub mod system;

use axum::{Router, http::StatusCode};
use std::sync::Arc;

use crate::faucet::RegistryError;
use crate::session::{SessionSupervisor, SupervisorError};

pub use middleware::{
    RateLimiter, SecurityMiddlewareConfig, SecurityState, body_size_middleware,
    logging_middleware, rate_limit_middleware, security_headers_middleware,
};

/// State shared by every handler
#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<SessionSupervisor>,
}

impl ApiState {
    pub fn new(supervisor: Arc<SessionSupervisor>) -> Self {
        Self { supervisor }
    }
}

/// All API routes, meant to be nested under `/api`
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .merge(system::create_router(state.clone()))
        .merge(faucets::create_router(state.clone()))
        .merge(sessions::create_router(state))
}

pub(crate) fn supervisor_error(e: SupervisorError) -> (StatusCode, String) {
    let status = match e {
        SupervisorError::NotFound(_) => StatusCode::NOT_FOUND,
        SupervisorError::NoFaucets => StatusCode::BAD_REQUEST,
        SupervisorError::CapacityReached { .. } => StatusCode::CONFLICT,
    };
    (status, e.to_string())
}

pub(crate) fn registry_error(e: RegistryError) -> (StatusCode, String) {
    let status = match e {
        RegistryError::AlreadyExists(_) => StatusCode::CONFLICT,
        RegistryError::Invalid(_) => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            supervisor_error(SupervisorError::NotFound("x".into())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            supervisor_error(SupervisorError::CapacityReached { limit: 1 }).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            supervisor_error(SupervisorError::NoFaucets).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            registry_error(RegistryError::AlreadyExists("a".into())).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            registry_error(RegistryError::Invalid("bad url".into())).0,
            StatusCode::BAD_REQUEST
        );
    }
}
