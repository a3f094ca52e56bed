//! HTTP plumbing tests that run without a database.
//!
//! The state carries a lazily-connected pool that is never used: every
//! request here is answered before a query would be made.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use hoard::bulk::BulkCache;
use hoard::routes::router;
use hoard::state::AppState;
use hoard_db::{Database, DbSettings};
use hoard_storage::backend::MockBackend;
use std::sync::Arc;
use tower::ServiceExt;

fn state(admin_token: Option<&str>) -> AppState {
    let settings = DbSettings {
        database: "unused".to_string(),
        host: "127.0.0.1".to_string(),
        user: "unused".to_string(),
        password: "unused".to_string(),
        port: 5432,
    };
    AppState {
        db: Database::connect_lazy(&settings),
        blobs: Arc::new(MockBackend::default()),
        admin_token: admin_token.map(str::to_string),
        bulk: Arc::new(BulkCache::default()),
    }
}

fn json_post(uri: &str, body: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header("token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn worker_endpoints_reject_missing_token() {
    let app = router(state(Some("secret")));
    let response = app
        .oneshot(json_post("/request_job", r#"{"client_name":"w"}"#, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn worker_endpoints_reject_wrong_token() {
    let app = router(state(Some("secret")));
    let response = app
        .oneshot(json_post("/job_fail", r#"{"dispatch_id":1,"fail_status":0,"report_code":0}"#, Some("nope")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_bulk_download_id_is_a_404() {
    let app = router(state(None));
    let response = app
        .oneshot(Request::builder().uri("/works/dl/bulk_dl/not-a-real-id").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_prepare_hands_out_a_download_id() {
    let app = router(state(None));
    let response = app
        .oneshot(json_post("/works/dl/bulk_prepare", r#"{"works":[{"work_id":42,"title":"A Title"}]}"#, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(value["dl_id"].as_str().is_some_and(|id| !id.is_empty()));
}
