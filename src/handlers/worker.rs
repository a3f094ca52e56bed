//! Worker-facing endpoints, all behind the admin token.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Multipart, State};
use serde::Deserialize;
use serde_json::{Value, json};

fn default_client_name() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ClientHello {
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

/// POST `/request_job`
pub async fn request_job(
    State(state): State<AppState>,
    Json(body): Json<ClientHello>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let order = hoard_queue::get_job(&mut tx, &body.client_name).await?;
    tx.commit().await?;
    let Some(order) = order else {
        return Ok(Json(json!({ "status": "queue empty" })));
    };
    let mut response = serde_json::to_value(&order).map_err(|_| ApiError::internal())?;
    response["status"] = json!("job assigned");
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct JobFailure {
    pub dispatch_id: i64,
    pub fail_status: i32,
    pub report_code: i16,
}

/// POST `/job_fail`
pub async fn job_fail(
    State(state): State<AppState>,
    Json(body): Json<JobFailure>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    hoard_queue::mark_dispatch_fail(&mut tx, body.dispatch_id, body.fail_status, body.report_code).await?;
    tx.commit().await?;
    Ok(Json(json!({ "status": "successfully failed!" })))
}

/// POST `/submit_job` (multipart: dispatch_id, report_code, work)
#[axum::debug_handler]
pub async fn submit_job(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut dispatch_id: Option<i64> = None;
    let mut report_code: Option<i16> = None;
    let mut work: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("dispatch_id") => dispatch_id = Some(parse_field(&field.text().await?, "dispatch_id")?),
            Some("report_code") => report_code = Some(parse_field(&field.text().await?, "report_code")?),
            Some("work") => work = Some(field.bytes().await?.to_vec()),
            _ => {},
        }
    }
    let dispatch_id = dispatch_id.ok_or_else(|| missing("dispatch_id"))?;
    let report_code = report_code.ok_or_else(|| missing("report_code"))?;
    let work = work.ok_or_else(|| missing("work"))?;

    let mut tx = state.db.begin().await?;
    let unfetched = hoard_queue::submit_dispatch(&mut tx, &state.blobs, dispatch_id, report_code, &work).await?;
    tx.commit().await?;
    Ok(Json(json!({
        "status": "submitted",
        "unfetched_objects": unfetched,
    })))
}

/// POST `/submit_work` (multipart sideload, bypasses the queue)
pub async fn submit_work(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut work_id: Option<i64> = None;
    let mut updated_time: Option<i64> = None;
    let mut file_format: Option<String> = None;
    let mut requester_id: Option<String> = None;
    let mut work: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("work_id") => work_id = Some(parse_field(&field.text().await?, "work_id")?),
            Some("updated_time") => updated_time = Some(parse_field(&field.text().await?, "updated_time")?),
            Some("file_format") => file_format = Some(field.text().await?),
            Some("requester_id") => requester_id = Some(field.text().await?),
            Some("work") => work = Some(field.bytes().await?.to_vec()),
            _ => {},
        }
    }
    let work_id = work_id.ok_or_else(|| missing("work_id"))?;
    let updated_time = updated_time.ok_or_else(|| missing("updated_time"))?;
    let file_format = file_format.ok_or_else(|| missing("file_format"))?;
    let requester_id = requester_id.ok_or_else(|| missing("requester_id"))?;
    let work = work.ok_or_else(|| missing("work"))?;

    let mut tx = state.db.begin().await?;
    let unfetched =
        hoard_queue::sideload_work(&mut tx, &state.blobs, work_id, &work, updated_time, &requester_id, &file_format, None, None)
            .await?;
    tx.commit().await?;
    Ok(Json(json!({
        "status": "successfully submitted",
        "unfetched_objects": unfetched,
    })))
}

/// POST `/submit_object` (multipart: object_id, etag, mimetype, object_file)
pub async fn submit_object(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut object_id: Option<i64> = None;
    let mut etag: Option<String> = None;
    let mut mimetype: Option<String> = None;
    let mut payload: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("object_id") => object_id = Some(parse_field(&field.text().await?, "object_id")?),
            Some("etag") => etag = Some(field.text().await?).filter(|etag| !etag.is_empty()),
            Some("mimetype") => mimetype = Some(field.text().await?),
            Some("object_file") => payload = Some(field.bytes().await?.to_vec()),
            _ => {},
        }
    }
    let object_id = object_id.ok_or_else(|| missing("object_id"))?;
    let mimetype = mimetype.ok_or_else(|| missing("mimetype"))?;
    let payload = payload.ok_or_else(|| missing("object_file"))?;

    let mut tx = state.db.begin().await?;
    hoard_objects::submit_object(&mut tx, &state.blobs, object_id, &payload, etag.as_deref(), &mimetype).await?;
    tx.commit().await?;
    Ok(Json(json!({ "status": "submitted" })))
}

/// POST `/request_object_job`
pub async fn request_object_job(
    State(state): State<AppState>,
    Json(body): Json<ClientHello>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let order = hoard_objects::lease_object(&mut tx, &body.client_name).await?;
    tx.commit().await?;
    let Some(order) = order else {
        return Ok(Json(json!({ "status": "queue empty" })));
    };
    let mut response = serde_json::to_value(&order).map_err(|_| ApiError::internal())?;
    response["status"] = json!("object assigned");
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ObjectFailure {
    pub dispatch_id: i64,
}

/// POST `/object_fail`
pub async fn object_fail(
    State(state): State<AppState>,
    Json(body): Json<ObjectFailure>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    hoard_objects::mark_object_fail(&mut tx, body.dispatch_id).await?;
    tx.commit().await?;
    Ok(Json(json!({ "status": "recorded" })))
}

fn parse_field<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<T, ApiError> {
    value.parse().map_err(|_| ApiError::bad_request(format!("field '{field}' is malformed")))
}

fn missing(field: &'static str) -> ApiError {
    ApiError::bad_request(format!("missing multipart field '{field}'"))
}
