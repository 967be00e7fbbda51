//! `POST /api/fit-check/stream` (spec.md §6): validates the request, then
//! streams SSE events for one pipeline run. Cancellation is wired to the
//! client's connection drop implicitly: once axum drops the SSE body
//! stream on disconnect, `events_tx` sends start failing and
//! `PhaseContext::is_cancelled` flips for the engine to observe.

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::error::{ApiError, PipelineError};
use crate::pipeline::state::ModelClass;

/// Request body for the one streaming endpoint (spec.md §6). `config_type`
/// is the wire name for `model_class` (spec.md §3); `model_id` is accepted
/// for forward-compatibility with vendor-specific model overrides but the
/// current engine selects models purely from `Config`/`config_type`, per
/// spec.md §4.10's "selects prompt variant... per model class" contract.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct FitCheckRequest {
    #[validate(length(min = 3, max = 2000, message = "query must be 3-2000 characters"))]
    pub query: String,
    #[serde(default)]
    pub include_thoughts: bool,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default, alias = "model_class")]
    pub config_type: Option<ModelClass>,
}

/// `POST /api/fit-check/stream` (spec.md §6): a `text/event-stream`
/// response, chunked, with `Cache-Control: no-cache` and
/// `X-Accel-Buffering: no` so intermediate proxies don't buffer the stream.
#[utoipa::path(
    post,
    path = "/api/fit-check/stream",
    request_body = FitCheckRequest,
    responses((status = 200, description = "text/event-stream of PipelineEvent frames")),
    tag = "FitCheck"
)]
pub async fn stream(
    State(state): State<AppState>,
    Json(request): Json<FitCheckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate().map_err(|e| PipelineError::InvalidQuery(e.to_string()))?;

    let model_class = request.config_type.unwrap_or(ModelClass::Standard);
    let (events_tx, events_rx) = mpsc::channel(64);

    let engine = state.engine.clone();
    tokio::spawn(async move {
        engine.run(request.query, model_class, request.include_thoughts, events_tx).await;
    });

    let stream = ReceiverStream::new(events_rx).map(|event| {
        // `event.data()` is the bare payload object spec.md §6 specifies for
        // each event name -- never the whole `PipelineEvent` re-serialized,
        // which would double-wrap it in its own tag/variant envelope.
        let name = event.name();
        let data = serde_json::to_string(&event.data()).unwrap_or_default();
        Ok::<_, std::convert::Infallible>(Event::default().event(name).data(data))
    });

    let sse = Sse::new(stream).keep_alive(KeepAlive::default());
    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert("Cache-Control", "no-cache".parse().unwrap());
    headers.insert("X-Accel-Buffering", "no".parse().unwrap());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_type_accepts_legacy_model_class_alias() {
        let body = r#"{"query":"Vercel","model_class":"reasoning"}"#;
        let parsed: FitCheckRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.config_type, Some(ModelClass::Reasoning));
    }

    #[test]
    fn rejects_query_shorter_than_three_chars() {
        let request = FitCheckRequest {
            query: "ab".to_string(),
            include_thoughts: false,
            model_id: None,
            config_type: None,
        };
        assert!(request.validate().is_err());
    }
}
