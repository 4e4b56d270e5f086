//! HTTP request handlers.

use super::AppState;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.board.snapshot().await)
}

pub async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
    match state.monitor.refresh().await {
        Some(outcome) => (StatusCode::ACCEPTED, Json(json!({ "accepted": outcome }))).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "monitor is not running").into_response(),
    }
}
