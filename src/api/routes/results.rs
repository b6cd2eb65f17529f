//! Result retrieval handlers: preview, CSV download, batch status.

use super::parse_session_id;
use crate::api::AppState;
use crate::error::Result;
use crate::types::{BatchStatus, ResultPreview};
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// GET /preview/:id - First five records of a completed batch
#[utoipa::path(
    get,
    path = "/api/preview/{id}",
    tag = "results",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Up to five records and the total count", body = ResultPreview),
        (status = 400, description = "Malformed session id", body = crate::error::ApiError),
        (status = 404, description = "Unknown or still running session, or no successful records", body = crate::error::ApiError)
    )
)]
pub async fn preview_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResultPreview>> {
    let session_id = parse_session_id(&id)?;
    let preview = state.orchestrator.preview(session_id).await?;
    Ok(Json(preview))
}

/// GET /download/:id - All records of a completed batch as a CSV attachment
#[utoipa::path(
    get,
    path = "/api/download/{id}",
    tag = "results",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "CSV document", content_type = "text/csv"),
        (status = 400, description = "Malformed session id", body = crate::error::ApiError),
        (status = 404, description = "Unknown or still running session, or no successful records", body = crate::error::ApiError)
    )
)]
pub async fn download_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let session_id = parse_session_id(&id)?;
    let export = state.orchestrator.export_csv(session_id).await?;

    tracing::info!(session_id = %session_id, filename = %export.filename, "Serving CSV export");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.content,
    )
        .into_response())
}

/// GET /status/:id - State machine and counters of a batch
#[utoipa::path(
    get,
    path = "/api/status/{id}",
    tag = "results",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Current batch status", body = BatchStatus),
        (status = 400, description = "Malformed session id", body = crate::error::ApiError),
        (status = 404, description = "Unknown or evicted session", body = crate::error::ApiError)
    )
)]
pub async fn batch_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchStatus>> {
    let session_id = parse_session_id(&id)?;
    Ok(Json(state.orchestrator.status(session_id).await?))
}
