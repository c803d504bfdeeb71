//! Session endpoints
//!
//! Endpoints:
//!   GET  /sessions           -> All session snapshots, oldest first
//!   GET  /sessions/{id}      -> One session snapshot
//!   POST /sessions/start     -> Start a session (optional `faucet_ids` body)
//!   POST /sessions/{id}/stop -> Request a stop

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::{ApiState, supervisor_error};
use crate::session::SessionSnapshot;

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub faucet_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub message: String,
    pub session: SessionSnapshot,
}

pub async fn list_sessions(State(state): State<ApiState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.supervisor.list_all().await)
}

pub async fn get_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    state
        .supervisor
        .snapshot(&session_id)
        .await
        .map(Json)
        .map_err(supervisor_error)
}

/// The body is optional: an empty body starts over every enabled faucet
pub async fn start_session(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<StartSessionResponse>, (StatusCode, String)> {
    let request = parse_start_request(&body)?;

    let session = state
        .supervisor
        .start(request.faucet_ids)
        .await
        .map_err(supervisor_error)?;

    Ok(Json(StartSessionResponse {
        message: "Session started".to_string(),
        session_id: session.id,
    }))
}

pub async fn stop_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<StopSessionResponse>, (StatusCode, String)> {
    let session = state
        .supervisor
        .stop(&session_id)
        .await
        .map_err(supervisor_error)?;

    Ok(Json(StopSessionResponse {
        message: format!("Session {}", session.status),
        session,
    }))
}

fn parse_start_request(body: &[u8]) -> Result<StartSessionRequest, (StatusCode, String)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartSessionRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid start request: {}", e),
        )
    })
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/start", post(start_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/stop", post(stop_session))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support;
    use crate::session::SessionStatus;

    #[test]
    fn test_parse_start_request() {
        assert!(parse_start_request(b"").unwrap().faucet_ids.is_none());
        assert!(parse_start_request(b"  \n").unwrap().faucet_ids.is_none());
        assert!(parse_start_request(b"{}").unwrap().faucet_ids.is_none());
        assert_eq!(
            parse_start_request(br#"{"faucet_ids": ["a", "b"]}"#)
                .unwrap()
                .faucet_ids,
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            parse_start_request(b"not json").unwrap_err().0,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_start_get_and_stop() {
        let state = test_support::state(&["a", "b"], Vec::new(), 10).await;

        let Json(started) = start_session(State(state.clone()), Bytes::from_static(b""))
            .await
            .unwrap();
        assert_eq!(started.message, "Session started");

        let Json(snapshot) = get_session(State(state.clone()), Path(started.session_id.clone()))
            .await
            .unwrap();
        assert_eq!(snapshot.faucet_ids, vec!["a".to_string(), "b".to_string()]);

        let Json(stopped) = stop_session(State(state.clone()), Path(started.session_id.clone()))
            .await
            .unwrap();
        assert!(matches!(
            stopped.session.status,
            SessionStatus::Stopped | SessionStatus::Completed
        ));

        let Json(all) = list_sessions(State(state.clone())).await;
        assert_eq!(all.len(), 1);
        state.supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_with_empty_registry_is_bad_request() {
        let state = test_support::state(&[], Vec::new(), 10).await;
        let (status, _) = start_session(State(state), Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_beyond_capacity_is_conflict() {
        let state = test_support::state(&["a"], Vec::new(), 1).await;
        let _started = start_session(State(state.clone()), Bytes::new()).await.unwrap();

        let (status, message) = start_session(State(state.clone()), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(message.contains("1 concurrent"));
        state.supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let state = test_support::state(&["a"], Vec::new(), 10).await;

        let (status, _) = stop_session(State(state.clone()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_session(State(state.clone()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(list_sessions(State(state)).await.0.is_empty());
    }
}
