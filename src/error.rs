//! Mapping of engine errors onto HTTP responses.
//!
//! The engines raise `exn` errors with typed kinds; this module is the single
//! place where those kinds become status codes. Bodies are shaped
//! `{"detail": …}`, which is what existing worker scripts already parse.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hoard_archive::error::ErrorKind as ArchiveErrorKind;
use hoard_objects::error::ErrorKind as ObjectErrorKind;
use hoard_queue::error::ErrorKind as QueueErrorKind;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "request failed");
        } else {
            tracing::debug!(status = %self.status, detail = %self.detail, "request rejected");
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

fn queue_status(kind: &QueueErrorKind) -> StatusCode {
    match kind {
        QueueErrorKind::InvalidFormat => StatusCode::BAD_REQUEST,
        QueueErrorKind::JobNotFound => StatusCode::NOT_FOUND,
        QueueErrorKind::NotAuthorized => StatusCode::FORBIDDEN,
        QueueErrorKind::AlreadyReported => StatusCode::CONFLICT,
        QueueErrorKind::Archive(inner) => archive_status(inner),
        QueueErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn archive_status(kind: &ArchiveErrorKind) -> StatusCode {
    match kind {
        ArchiveErrorKind::WorkNotFound => StatusCode::NOT_FOUND,
        ArchiveErrorKind::Objects(inner) => object_status(inner),
        // DuplicateDetected is absorbed by the submission pipeline; one
        // escaping to here is a bug, and TooManyIterations is corruption.
        ArchiveErrorKind::DuplicateDetected
        | ArchiveErrorKind::TooManyIterations
        | ArchiveErrorKind::Delta
        | ArchiveErrorKind::Blob
        | ArchiveErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn object_status(kind: &ObjectErrorKind) -> StatusCode {
    match kind {
        ObjectErrorKind::ObjectNotFound => StatusCode::NOT_FOUND,
        ObjectErrorKind::Blob | ObjectErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<hoard_queue::error::Error> for ApiError {
    fn from(err: hoard_queue::error::Error) -> Self {
        Self::new(queue_status(&err), (*err).to_string())
    }
}

impl From<hoard_archive::error::Error> for ApiError {
    fn from(err: hoard_archive::error::Error) -> Self {
        Self::new(archive_status(&err), (*err).to_string())
    }
}

impl From<hoard_objects::error::Error> for ApiError {
    fn from(err: hoard_objects::error::Error) -> Self {
        Self::new(object_status(&err), (*err).to_string())
    }
}

impl From<hoard_db::error::Error> for ApiError {
    fn from(err: hoard_db::error::Error) -> Self {
        tracing::error!(error = %err, "database failure");
        Self::internal()
    }
}

impl From<hoard_storage::error::Error> for ApiError {
    fn from(err: hoard_storage::error::Error) -> Self {
        tracing::error!(error = %err, "blob store failure");
        Self::internal()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "transaction failure");
        Self::internal()
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::bad_request(format!("malformed multipart body: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(QueueErrorKind::InvalidFormat, StatusCode::BAD_REQUEST)]
    #[case(QueueErrorKind::JobNotFound, StatusCode::NOT_FOUND)]
    #[case(QueueErrorKind::NotAuthorized, StatusCode::FORBIDDEN)]
    #[case(QueueErrorKind::AlreadyReported, StatusCode::CONFLICT)]
    #[case(QueueErrorKind::Database, StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(QueueErrorKind::Archive(ArchiveErrorKind::WorkNotFound), StatusCode::NOT_FOUND)]
    #[case(QueueErrorKind::Archive(ArchiveErrorKind::TooManyIterations), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(
        QueueErrorKind::Archive(ArchiveErrorKind::Objects(ObjectErrorKind::ObjectNotFound)),
        StatusCode::NOT_FOUND
    )]
    fn test_queue_kinds_map_to_statuses(#[case] kind: QueueErrorKind, #[case] expected: StatusCode) {
        assert_eq!(queue_status(&kind), expected);
    }

    #[test]
    fn test_duplicate_never_leaks_as_client_error() {
        // If the pipeline's recovery is bypassed somehow, the caller should
        // see a server fault, not a 4xx blaming the worker.
        assert_eq!(archive_status(&ArchiveErrorKind::DuplicateDetected), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
