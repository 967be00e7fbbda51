//! Crate-wide error taxonomy.
//!
//! Mirrors the two-layer pattern of an inner `thiserror` enum plus an
//! HTTP-facing wrapper: [`PipelineError`] is the kind every phase and
//! collaborator returns; [`ApiError`] is what `IntoResponse` sees on the one
//! path that never enters the pipeline at all -- request validation.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// The six error kinds of the error-handling taxonomy (spec.md §7, §6).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidQuery(String),

    #[error("rate limited")]
    RateLimited,

    #[error("circuit open for {collaborator}, retry after {retry_after_secs}s")]
    CircuitOpen { collaborator: &'static str, retry_after_secs: u64 },

    #[error("search provider error: {0}")]
    Search(String),

    #[error("LLM vendor error: {0}")]
    Llm(String),

    #[error("whole-pipeline timeout exceeded")]
    Timeout,

    #[error("pipeline aborted: {0}")]
    Agent(String),
}

impl PipelineError {
    /// The `error.code` value used on the SSE `error` event and the
    /// equivalent HTTP error body (spec.md §6 error-code table).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::RateLimited => "RATE_LIMITED",
            Self::CircuitOpen { .. } | Self::Llm(_) => "LLM_ERROR",
            Self::Search(_) => "SEARCH_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Agent(_) => "AGENT_ERROR",
        }
    }

    /// External-dependency failures degrade the owning phase rather than
    /// aborting the run (spec.md §7 taxonomy kind 3).
    pub fn is_recoverable_by_phase(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Search(_) | Self::Llm(_))
    }
}

/// HTTP-facing wrapper used only for request validation, which is rejected
/// before a pipeline run (and therefore before any `PipelineError`/SSE event)
/// exists.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            PipelineError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            PipelineError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            PipelineError::CircuitOpen { .. } | PipelineError::Llm(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Search(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Agent(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        }));

        (status, body).into_response()
    }
}
