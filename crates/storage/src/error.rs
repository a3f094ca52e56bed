//! Blob Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A blob store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No blob exists at the given key
    #[display("blob not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Key contains characters the backends can't be trusted with
    #[display("invalid blob key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// Network-related error (S3 connections, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    Backend(#[error(not(source))] String),
    /// A stored blob failed to inflate
    #[display("corrupt zlib stream")]
    Corrupt,
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::Backend(_))
    }
}
