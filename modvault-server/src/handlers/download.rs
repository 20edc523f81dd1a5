//! Submission, status, archive delivery, and cleanup.

use crate::app_state::AppState;
use crate::errors::{AppError, AppResult};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use futures_util::StreamExt;
use modvault_core::url::parse_workshop_url;
use modvault_model::{ItemMetadata, Job, JobId, JobState, WorkshopItemId};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::time::{Duration, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Record dropped this long after a completed delivery, so one last
/// status poll still resolves.
const POST_DELIVERY_LINGER: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub item_id: WorkshopItemId,
    pub metadata: ItemMetadata,
    pub status_path: String,
}

pub async fn submit_download(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> AppResult<Json<SubmitResponse>> {
    let item_id = parse_workshop_url(&request.url).ok_or_else(AppError::invalid_url)?;

    let metadata = state
        .metadata
        .fetch_metadata(item_id)
        .await
        .map_err(|err| {
            warn!(%item_id, %err, "metadata fetch failed");
            AppError::internal("failed to fetch item metadata")
        })?;
    if !metadata.valid {
        return Err(AppError::invalid_item());
    }
    if metadata.app_id != state.config.app_id {
        return Err(AppError::wrong_application(state.config.app_id, metadata.app_id));
    }

    let job_id = state.orchestrator.submit(metadata.clone()).await?;
    Ok(Json(SubmitResponse {
        job_id,
        item_id,
        metadata,
        status_path: format!("/api/download/{job_id}/status"),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

pub async fn download_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<StatusResponse>> {
    let job_id = JobId::from(id);
    let job = state
        .registry()
        .snapshot(job_id)
        .await
        .ok_or_else(AppError::job_not_found)?;
    let download_url =
        (job.state == JobState::Completed).then(|| format!("/api/download/{job_id}/file"));
    Ok(Json(StatusResponse { job, download_url }))
}

pub async fn fetch_archive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let job_id = JobId::from(id);
    let (path, size) = state
        .registry()
        .resolve_artifact(job_id)
        .await
        .ok_or_else(AppError::job_not_found)?;

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| AppError::internal("archive missing on disk"))?;
    let mtime_millis = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let etag = format!("\"{size}-{mtime_millis}\"");

    let mut file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| AppError::internal("archive not accessible"))?;

    if let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        match parse_range_header(range, size) {
            RangeOutcome::Bytes(range) => {
                debug!(job = %job_id, start = range.start, end = range.end, "serving archive range");
                file.seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(|_| AppError::internal("failed to seek in archive"))?;
                let content_length = range.end - range.start + 1;
                let stream = ReaderStream::new(file.take(content_length));

                // Partial delivery may be resumed; never dispose here.
                return Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_TYPE, "application/zip")
                    .header(header::CONTENT_LENGTH, content_length.to_string())
                    .header(
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", range.start, range.end, size),
                    )
                    .header(header::ACCEPT_RANGES, "bytes")
                    .header(header::ETAG, etag)
                    .body(Body::from_stream(stream))
                    .map_err(|_| AppError::internal("failed to build response"));
            }
            RangeOutcome::Unsatisfiable => {
                return Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{size}"))
                    .body(Body::empty())
                    .map_err(|_| AppError::internal("failed to build response"));
            }
            // A malformed header is ignored and the whole file served.
            RangeOutcome::Malformed => {}
        }
    }

    // Whole-file delivery: once the stream has been fully read, the
    // workspace is disposed and the record scheduled for removal. The
    // trailing stream is only polled after the file is exhausted, so an
    // aborted transfer keeps the archive around for another try.
    let stream = ReaderStream::new(file);
    let orchestrator = state.orchestrator.clone();
    let mut delivered = false;
    let tail = futures_util::stream::poll_fn(move |_| {
        if !delivered {
            delivered = true;
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.finish_delivery(job_id, POST_DELIVERY_LINGER).await;
            });
        }
        std::task::Poll::Ready(None)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::ETAG, etag)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", archive_filename(&path)),
        )
        .body(Body::from_stream(stream.chain(tail)))
        .map_err(|_| AppError::internal("failed to build response"))
}

pub async fn cleanup_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let job_id = JobId::from(id);
    if state.orchestrator.forget(job_id).await {
        Ok(Json(serde_json::json!({ "jobId": job_id, "status": "cleaned" })))
    } else {
        Err(AppError::job_not_found())
    }
}

fn archive_filename(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive.zip".to_string())
}

#[derive(Debug, PartialEq, Eq)]
struct ByteRange {
    start: u64,
    end: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum RangeOutcome {
    Bytes(ByteRange),
    Unsatisfiable,
    Malformed,
}

fn parse_range_header(range_str: &str, file_size: u64) -> RangeOutcome {
    let Some(range_part) = range_str.strip_prefix("bytes=") else {
        return RangeOutcome::Malformed;
    };
    let parts: Vec<&str> = range_part.split('-').collect();
    if parts.len() != 2 {
        return RangeOutcome::Malformed;
    }

    let start = if parts[0].is_empty() {
        // Suffix form: the last N bytes.
        match parts[1].parse::<u64>() {
            Ok(suffix_len) if suffix_len > 0 => file_size.saturating_sub(suffix_len),
            _ => return RangeOutcome::Malformed,
        }
    } else {
        match parts[0].parse::<u64>() {
            Ok(start) => start,
            Err(_) => return RangeOutcome::Malformed,
        }
    };

    let end = if parts[1].is_empty() || parts[0].is_empty() {
        file_size.saturating_sub(1)
    } else {
        match parts[1].parse::<u64>() {
            Ok(end) => end.min(file_size.saturating_sub(1)),
            Err(_) => return RangeOutcome::Malformed,
        }
    };

    if start >= file_size || start > end {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Bytes(ByteRange { start, end })
}
