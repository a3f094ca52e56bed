//! Route table and middleware stack.

use crate::auth;
use crate::bulk;
use crate::handlers::{public, worker};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Uploads are whole ebook files; anything larger than this is not a work.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/request_job", post(worker::request_job))
        .route("/job_fail", post(worker::job_fail))
        .route("/submit_job", post(worker::submit_job))
        .route("/submit_object", post(worker::submit_object))
        .route("/submit_work", post(worker::submit_work))
        .route("/request_object_job", post(worker::request_object_job))
        .route("/object_fail", post(worker::object_fail))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin_token));

    let public = Router::new()
        .route("/report_work", post(public::report_work))
        .route("/work_exists/:work_id", get(public::work_exists))
        .route("/job_status", get(public::job_status))
        .route("/works/dl/bulk_prepare", post(bulk::bulk_prepare))
        .route("/works/dl/bulk_dl/:dl_id", get(bulk::bulk_dl))
        .route("/works/dl/:work_id", get(public::dl_work))
        .route("/works/:work_id", get(public::get_work))
        .route("/objects/:object_id", get(public::get_object));

    Router::new()
        .merge(admin)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
