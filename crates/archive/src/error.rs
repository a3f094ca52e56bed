//! Version Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use hoard_objects::error::{Error as ObjectError, ErrorKind as ObjectErrorKind};

/// A version engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for version engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes being stored are identical to the current HEAD. A normal
    /// outcome (the publisher simply hasn't changed the work), not a bug.
    #[display("stored work would duplicate the current head")]
    DuplicateDetected,
    /// No storage entry exists for the requested id.
    #[display("archived work not found")]
    WorkNotFound,
    /// A patch chain exceeded the hop guard; the chain is corrupt.
    #[display("too many iterations walking the patch chain")]
    TooManyIterations,
    /// A binary delta failed to compute or apply.
    #[display("binary delta error")]
    Delta,
    /// Supporting-object engine failure during HTML rewriting.
    #[display("supporting-object error: {_0}")]
    Objects(ObjectErrorKind),
    /// Blob store failure; the enclosing transaction should roll back.
    #[display("blob store error")]
    Blob,
    #[display("database error")]
    Database,
}

impl ErrorKind {
    /// Convert a supporting-object error, preserving its `Exn` frame as a
    /// child in the error tree.
    #[track_caller]
    pub fn objects(err: ObjectError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Objects(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Blob | Self::Database) || matches!(self, Self::Objects(inner) if inner.is_retryable())
    }
}
