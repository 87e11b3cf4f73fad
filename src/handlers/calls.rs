//! Relayed call management endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::core::relay::{RelayError, RelayOrchestrator};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

fn relay(state: &AppState) -> AppResult<&Arc<RelayOrchestrator>> {
    state
        .relay
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Call relay is not configured".to_string()))
}

/// Create a call with the configured assistant and start relaying it.
pub async fn start_call(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let call_id = relay(&state)?.start_call().await?;
    info!(call_id = %call_id, "Call started via API");
    Ok((StatusCode::CREATED, Json(json!({"call_id": call_id}))))
}

/// Status of every active call, keyed by call id.
pub async fn list_calls(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    Ok(Json(relay(&state)?.list_statuses()))
}

pub async fn get_call_status(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let status = relay(&state)?
        .call_status(&call_id)
        .ok_or_else(|| AppError::from(RelayError::CallNotFound(call_id.clone())))?;
    Ok(Json(json!({"call_id": call_id, "status": status})))
}

/// Ask the call to end. Cleanup finishes in the background.
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    relay(&state)?.end_call(&call_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"call_id": call_id, "status": "ending"})),
    ))
}
