//! Queue Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use hoard_archive::error::{Error as ArchiveError, ErrorKind as ArchiveErrorKind};

/// A queue error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The client supplied a file format outside the accepted set.
    #[display("unsupported file format")]
    InvalidFormat,
    /// No job or dispatch row matches the provided ids.
    #[display("unknown job or dispatch")]
    JobNotFound,
    /// The presented report code does not match the dispatch.
    #[display("report code mismatch")]
    NotAuthorized,
    /// The dispatch's failure has already been recorded.
    #[display("failure already reported")]
    AlreadyReported,
    /// Version engine failure during submission.
    #[display("version engine error: {_0}")]
    Archive(ArchiveErrorKind),
    #[display("database error")]
    Database,
}

impl ErrorKind {
    /// Convert a version engine error, preserving its `Exn` frame as a child
    /// in the error tree.
    #[track_caller]
    pub fn archive(err: ArchiveError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Archive(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database) || matches!(self, Self::Archive(inner) if inner.is_retryable())
    }
}
