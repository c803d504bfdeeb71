//! Faucet registry endpoints
//!
//! Endpoints:
//!   GET  /faucets -> Registered faucets in registration order
//!   POST /faucets -> Register a new faucet

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use tracing::info;

use crate::api::{ApiState, registry_error};
use crate::faucet::FaucetDefinition;

#[derive(Debug, Serialize)]
pub struct AddFaucetResponse {
    pub message: String,
    pub faucet: FaucetDefinition,
}

pub async fn list_faucets(State(state): State<ApiState>) -> Json<Vec<FaucetDefinition>> {
    Json(state.supervisor.faucets().list().await)
}

pub async fn add_faucet(
    State(state): State<ApiState>,
    Json(faucet): Json<FaucetDefinition>,
) -> Result<(StatusCode, Json<AddFaucetResponse>), (StatusCode, String)> {
    state
        .supervisor
        .faucets()
        .add(faucet.clone())
        .await
        .map_err(registry_error)?;

    info!(faucet = %faucet.id, "Faucet added");
    Ok((
        StatusCode::CREATED,
        Json(AddFaucetResponse {
            message: "Faucet added".to_string(),
            faucet,
        }),
    ))
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/faucets", get(list_faucets).post(add_faucet))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support;

    #[tokio::test]
    async fn test_add_and_list() {
        let state = test_support::state(&["a"], Vec::new(), 10).await;

        let (status, Json(added)) = add_faucet(State(state.clone()), Json(test_support::faucet("b")))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(added.faucet.id, "b");

        let Json(listed) = list_faucets(State(state)).await;
        let ids: Vec<&str> = listed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict() {
        let state = test_support::state(&["a"], Vec::new(), 10).await;

        let mut duplicate = test_support::faucet("a");
        duplicate.name = "Replacement".to_string();
        let (status, _) = add_faucet(State(state.clone()), Json(duplicate))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);

        // Original definition untouched
        let original = state.supervisor.faucets().get("a").await.unwrap();
        assert_eq!(original.name, "Faucet a");
    }

    #[tokio::test]
    async fn test_invalid_definition_is_bad_request() {
        let state = test_support::state(&[], Vec::new(), 10).await;

        let mut invalid = test_support::faucet("c");
        invalid.url = "ftp://c.example.com".to_string();
        let (status, message) = add_faucet(State(state.clone()), Json(invalid))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("http or https"));
        assert!(state.supervisor.faucets().is_empty().await);
    }
}
