//! REST API handlers

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, extract::State};
use pulse_core::{StoreError, TimeBucket};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
    /// Number of connected viewer sessions
    pub active_sessions: usize,
}

/// Health check endpoint
///
/// Returns server status, version, uptime, and live session count.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: state.registry.len(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub message: String,
}

/// GET /ping - liveness probe
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        message: "pong".to_string(),
    })
}

/// Error body for failed API calls
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A store failure surfaced as a 500.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// GET /stats - current windowed count
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TimeBucket>>, ApiError> {
    let timeout = state.broadcast.query_timeout;
    let buckets = tokio::time::timeout(timeout, state.store.windowed_count(state.broadcast.window))
        .await
        .unwrap_or(Err(StoreError::Timeout(timeout)))
        .inspect_err(|e| warn!(error = %e, "Stats query failed"))?;

    Ok(Json(buckets))
}
