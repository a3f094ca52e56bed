//! Blob store trait and implementations.
//!
//! This module defines the `BlobStore` trait, a unified interface for the
//! opaque key→bytes storage the archive writes into. The only production
//! backend is S3-compatible object storage; the mock backend exists so that
//! the engines can be tested without network access.

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use crate::zlib;
// Implementations validate keys before touching the backend.
pub(crate) use crate::key::validate as checked;
use async_trait::async_trait;

/// Unified interface for blob storage backends.
///
/// It's a glorified key/value interface, but in ✨Rust✨. Keys are opaque
/// strings minted by the archive (`<work_id>_<sha1>`, `obj_<sha1>`); all
/// operations validate them with [`validate_key`](crate::validate_key)
/// before touching the backend.
///
/// Blob writes are **not** transactional with anything else. The archive
/// tolerates orphaned blobs after a database rollback because every key is
/// content-addressed, so a re-run lands on the same key instead of leaking a
/// new one.
///
/// # Examples
///
/// ```no_run
/// use hoard_storage::{BlobStore, error::Result};
///
/// async fn size_of(blobs: &dyn BlobStore, key: &str) -> Result<u64> {
///     if blobs.exists(key).await? {
///         let data = blobs.read(key).await?;
///         Ok(data.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Check if a blob exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Read blob contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if no blob
    /// exists at the key.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Write blob contents, overwriting any existing blob at the key.
    ///
    /// Overwriting is load-bearing: promoting a new HEAD version rewrites the
    /// previous HEAD's blob in place with a delta, at the same key.
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Delete a blob.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if no blob
    /// exists at the key.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read a blob and inflate it.
    ///
    /// Counterpart of [`write_compressed`](Self::write_compressed); work
    /// versions and deltas are always stored deflated.
    async fn read_compressed(&self, key: &str) -> Result<Vec<u8>> {
        let raw = self.read(key).await?;
        zlib::decompress(&raw)
    }

    /// Deflate data and write it as a blob.
    async fn write_compressed(&self, key: &str, data: &[u8]) -> Result<()> {
        let packed = zlib::compress(data)?;
        self.write(key, &packed).await
    }
}
