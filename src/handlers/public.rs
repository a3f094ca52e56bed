//! Public read API and the archive-this-work entry point.

use crate::error::ApiError;
use crate::page;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use hoard_db::models::WorkFormat;
use serde::Deserialize;
use serde_json::{Value, json};

fn default_reporter() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Deserialize)]
pub struct WorkReport {
    pub work_id: i64,
    pub updated_time: i64,
    pub format: String,
    #[serde(default = "default_reporter")]
    pub reporter: String,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// POST `/report_work`
pub async fn report_work(
    State(state): State<AppState>,
    Json(report): Json<WorkReport>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let job_id = hoard_queue::queue_work(
        &mut tx,
        report.work_id,
        report.updated_time,
        &report.format,
        &report.reporter,
        report.title.as_deref(),
        report.author.as_deref(),
    )
    .await?;
    tx.commit().await?;
    Ok(Json(match job_id {
        Some(job_id) => json!({ "status": "queued", "job_id": job_id }),
        None => json!({ "status": "already fetched" }),
    }))
}

/// GET `/work_exists/{work_id}`
pub async fn work_exists(State(state): State<AppState>, Path(work_id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let exists = hoard_archive::work_exists(&mut tx, work_id).await?;
    tx.commit().await?;
    Ok(Json(json!({ "exists": exists })))
}

#[derive(Debug, Deserialize)]
pub struct JobStatusQuery {
    pub job_id: i64,
}

/// GET `/job_status?job_id=…`
pub async fn job_status(
    State(state): State<AppState>,
    Query(query): Query<JobStatusQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let status = hoard_queue::job_status(&mut tx, query.job_id).await?;
    tx.commit().await?;
    Ok(Json(json!({ "status": status.as_str(), "job_id": query.job_id })))
}

#[derive(Debug, Deserialize)]
pub struct WorkQuery {
    pub version: Option<i64>,
}

/// GET `/works/{work_id}`: landing page, or exact bytes with `?version=`.
pub async fn get_work(
    State(state): State<AppState>,
    Path(work_id): Path<i64>,
    Query(query): Query<WorkQuery>,
) -> Result<Response, ApiError> {
    let mut tx = state.db.begin().await?;

    if let Some(storage_id) = query.version {
        let (content, entry) = hoard_archive::reconstruct(&mut tx, &state.blobs, storage_id).await?;
        tx.commit().await?;
        // Version ids are global; don't serve another work's version off
        // this work's URL.
        if entry.work_id != work_id {
            return Err(ApiError::not_found("work not found"));
        }
        let format = entry.format()?;
        return Ok(([(header::CONTENT_TYPE, format.mimetype())], content).into_response());
    }

    let history = hoard_archive::history(&mut tx, work_id).await?;
    tx.commit().await?;
    if history.is_empty() {
        return Err(ApiError::not_found("work not found"));
    }
    let page = page::render_landing(work_id, &history).map_err(|err| {
        tracing::error!(error = %err, "landing page render failed");
        ApiError::internal()
    })?;
    Ok(Html(page).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file_format: Option<String>,
}

/// GET `/works/dl/{work_id}?file_format=…`: current HEAD in one fetch.
pub async fn dl_work(
    State(state): State<AppState>,
    Path(work_id): Path<i64>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let format: WorkFormat = query
        .file_format
        .as_deref()
        .unwrap_or("pdf")
        .parse()
        .map_err(|_| ApiError::bad_request("unsupported file format"))?;
    let mut tx = state.db.begin().await?;
    let content = hoard_archive::current(&mut tx, &state.blobs, work_id, format).await?;
    tx.commit().await?;
    let Some(content) = content else {
        return Err(ApiError::not_found("work not found"));
    };
    Ok(([(header::CONTENT_TYPE, format.mimetype())], content).into_response())
}

/// GET `/objects/{object_id}`: supporting-object bytes, cacheable forever.
///
/// A 404 here is routine: the rewritten HTML's `onerror` handler falls back
/// to the publisher URL for objects that were never fetched.
pub async fn get_object(State(state): State<AppState>, Path(object_id): Path<i64>) -> Result<Response, ApiError> {
    let mut tx = state.db.begin().await?;
    let located = hoard_objects::locate(&mut tx, object_id).await?;
    tx.commit().await?;
    let Some((index, location)) = located else {
        return Err(ApiError::not_found("object not found"));
    };
    let content = state.blobs.read(&location).await?;
    let headers = [
        (header::CONTENT_TYPE, index.mimetype),
        (header::CACHE_CONTROL, "max-age=31536000, immutable".to_string()),
    ];
    Ok((headers, content).into_response())
}
