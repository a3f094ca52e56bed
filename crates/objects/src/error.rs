//! Supporting-Object Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A supporting-object error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for supporting-object operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No unfetched object (or dispatch) exists for the given id.
    #[display("unknown object id")]
    ObjectNotFound,
    /// Blob store failure; the enclosing transaction should roll back.
    #[display("blob store error")]
    Blob,
    #[display("database error")]
    Database,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Blob | Self::Database)
    }
}
