//! Batch submission and progress streaming handlers.

use super::{SubmitResponse, parse_session_id};
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::types::{BatchRequest, ProgressEvent};
use axum::{
    Json,
    extract::{Path, State},
    response::sse::{Event as SseEvent, Sse},
};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::json;
use std::convert::Infallible;

/// POST /fetch-weather - Submit a batch
#[utoipa::path(
    post,
    path = "/api/fetch-weather",
    tag = "batches",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Batch accepted; progress and results are keyed by the returned session id", body = SubmitResponse),
        (status = 400, description = "Missing API key or no ZIP codes", body = crate::error::ApiError),
        (status = 503, description = "Server is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn fetch_weather(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<SubmitResponse>> {
    let session_id = state.orchestrator.submit_request(&request).await?;
    Ok(Json(SubmitResponse { session_id }))
}

/// GET /progress/:id - Live progress of a batch as server-sent events
///
/// Each frame carries one progress event as JSON, named after its type. The
/// stream ends after `batch_completed`. Unknown sessions get a single
/// `error` frame.
#[utoipa::path(
    get,
    path = "/api/progress/{id}",
    tag = "batches",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<BoxStream<'static, std::result::Result<SseEvent, Infallible>>> {
    let subscription = match parse_session_id(&id) {
        Ok(session_id) => state.orchestrator.stream_progress(session_id).await,
        Err(e) => Err(e),
    };

    let frames = match subscription {
        Ok(subscription) => {
            tracing::debug!(session_id = %subscription.session_id(), "Progress stream attached");
            subscription
                .into_stream()
                .map(|event| Ok(event_frame(&event)))
                .boxed()
        }
        Err(e) => {
            tracing::debug!(session_id = %id, error = %e, "Progress stream refused");
            let frame = error_frame(&e);
            stream::once(async move { Ok(frame) }).boxed()
        }
    };

    Sse::new(frames)
}

fn event_frame(event: &ProgressEvent) -> SseEvent {
    match serde_json::to_string(event) {
        Ok(data) => SseEvent::default().event(event.name()).data(data),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize progress event");
            error_frame(&Error::Serialization(e))
        }
    }
}

fn error_frame(error: &Error) -> SseEvent {
    let message = match error {
        Error::SessionNotFound(_) | Error::Validation { .. } => "Session not found".to_string(),
        Error::StreamBusy(_) => "Progress stream is already being consumed".to_string(),
        other => other.to_string(),
    };
    SseEvent::default()
        .event("error")
        .data(json!({ "type": "error", "message": message }).to_string())
}
