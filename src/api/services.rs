use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::collections::HashMap;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{
    models::{
        CleanupResponse, DeleteResponse, DownloadQuery, DownloadRequest, HealthResponse,
        StatusResponse, TaskResponse,
    },
    state::AppState,
    utils::content_disposition,
    validation::validate_download,
};
use crate::api::error::ApiError;
use crate::storage::ArtifactInfo;
use crate::tasks::TaskId;

/// Unparseable ids are reported as unknown tasks, never touched as paths.
fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("task {raw}")))
}

/// Download submission endpoint (POST /api/download)
///
/// ## Flow:
/// 1. Validate Content-Type and body size
/// 2. Validate URL, format type and quality
/// 3. Create the task record and directory
/// 4. Run the extraction in the background (202), or wait for it with
///    `?wait=true` (200)
pub async fn create_download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let max_size = state.config.server.max_body_bytes.as_u64() as usize;
    let body_bytes = read_body(body, max_size).await?;

    let request: DownloadRequest = serde_json::from_slice(&body_bytes)?;
    let task_request =
        validate_download(&request).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    if query.wait {
        let record = state.manager.download(task_request).await?;
        return Ok((StatusCode::OK, Json(TaskResponse::from(record))));
    }

    let record = state.manager.start_download(task_request).await?;
    Ok((StatusCode::ACCEPTED, Json(TaskResponse::from(record))))
}

/// Reads at most `max_size` bytes; longer bodies are rejected mid-stream.
async fn read_body(body: Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let collected = Limited::new(body, max_size)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::PayloadTooLarge(max_size)
            } else {
                ApiError::Internal(err.to_string())
            }
        })?;

    Ok(collected.to_bytes().to_vec())
}

/// Task status endpoint (GET /api/status/{task_id})
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_task_id(&task_id)?;
    let record = state
        .manager
        .get_progress(&id)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id}")))?;

    Ok((StatusCode::OK, Json(StatusResponse::from(record))))
}

/// Artifact endpoint (GET /download/{task_id})
///
/// Streams the finished file and schedules deletion of the task after the
/// configured grace period.
pub async fn download_file(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_task_id(&task_id)?;
    let path = state.manager.artifact_path(&id)?;
    let missing = || ApiError::NotFound(format!("file for task {task_id}"));

    let artifact = ArtifactInfo::from_path(&path).map_err(|_| missing())?;
    let file = tokio::fs::File::open(&path).await.map_err(|_| missing())?;

    let disposition = HeaderValue::from_str(&content_disposition(&artifact.name))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(artifact.size));

    let grace = state.config.downloads.artifact_grace.as_duration();
    state.manager.schedule_cleanup(id, grace);
    info!(
        task_id = %id,
        filename = %artifact.name,
        size = %artifact.human_size,
        "Serving artifact"
    );

    Ok(response)
}

/// Task cancellation endpoint (DELETE /api/task/{task_id})
///
/// Deletes the directory and the record. A running extraction is not
/// interrupted; its final update becomes a no-op.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_task_id(&task_id)?;

    if !state.manager.cleanup_task(&id).await? {
        return Err(ApiError::NotFound(format!("task {task_id}")));
    }

    Ok((
        StatusCode::OK,
        Json(DeleteResponse {
            message: "Task cancelled and cleaned up".to_string(),
            task_id,
        }),
    ))
}

/// Manual sweep endpoint (GET|POST /api/cleanup)
pub async fn trigger_cleanup(State(state): State<AppState>) -> impl IntoResponse {
    let cleaned_items = state.cleanup.perform_cleanup().await;
    debug!(cleaned_items, "Manual cleanup finished");

    Json(CleanupResponse {
        message: "Cleanup completed".to_string(),
        cleaned_items,
    })
}

/// Health check endpoint (GET /health)
///
/// Reports gate occupancy, the number of live tasks and the counters.
/// Returns 503 once the manager has been shut down.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let gate = state.manager.gate();

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert(
        "execution_gate".to_string(),
        if gate.is_closed() { "closed" } else { "healthy" }.to_string(),
    );
    components.insert(
        "cleanup".to_string(),
        if state.cleanup.is_running() { "running" } else { "stopped" }.to_string(),
    );

    let healthy = !gate.is_closed();
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_downloads: gate.in_flight(),
        tasks: state.manager.store().len(),
        metrics: state.metrics().snapshot(),
    };

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_body_enforces_limit() {
        let data = read_body(Body::from(vec![b'x'; 100]), 100).await.unwrap();
        assert_eq!(data.len(), 100);

        match read_body(Body::from(vec![b'x'; 101]), 100).await {
            Err(ApiError::PayloadTooLarge(limit)) => assert_eq!(limit, 100),
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }
}
