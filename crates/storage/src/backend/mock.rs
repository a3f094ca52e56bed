//! In-memory blob store backend for testing.

use super::checked;
use crate::BlobStore;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory blob store backend for testing.
///
/// Blobs are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Ideal for unit
/// tests that need a [`BlobStore`] without network dependencies.
///
/// # Examples
///
/// ```
/// use hoard_storage::backend::MockBackend;
/// use hoard_storage::BlobStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let blobs = MockBackend::with_blobs([("42_abc", b"data".to_vec())]);
/// assert!(blobs.exists("42_abc").await?);
///
/// blobs.write("obj_def", b"payload").await?;
/// assert!(blobs.exists("obj_def").await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockBackend {
    storage: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with blobs.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_blobs(blobs: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (key, data) in blobs {
            let key = key.into();
            if checked(&key).is_err() {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_blobs: invalid key {key}");
            }
            map.insert(key, data.into());
        }
        Self {
            storage: RwLock::new(map),
        }
    }

    /// Number of blobs currently held.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    /// `true` when no blobs are held.
    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = checked(key)?;
        Ok(self.storage.read().await.contains_key(key))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let key = checked(key)?;
        self.storage
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let key = checked(key)?;
        self.storage.write().await.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = checked(key)?;
        self.storage
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let blobs = MockBackend::default();
        blobs.write("test-key", b"hello").await.unwrap();
        let data = blobs.read("test-key").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let blobs = MockBackend::default();
        let err = blobs.read("missing").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let blobs = MockBackend::default();
        blobs.write("key", b"one").await.unwrap();
        blobs.write("key", b"two").await.unwrap();
        assert_eq!(blobs.read("key").await.unwrap(), b"two");
        assert_eq!(blobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let blobs = MockBackend::default();
        blobs.write("key", b"data").await.unwrap();
        blobs.delete("key").await.unwrap();
        assert!(!blobs.exists("key").await.unwrap());
        // Delete nonexistent → NotFound
        let err = blobs.delete("key").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_compressed_roundtrip() {
        let blobs = MockBackend::default();
        let original = b"<html><body>a work</body></html>";
        blobs.write_compressed("42_abc", original).await.unwrap();
        // On-disk form is deflated, not the original bytes
        let raw = blobs.read("42_abc").await.unwrap();
        assert_ne!(raw, original);
        let unpacked = blobs.read_compressed("42_abc").await.unwrap();
        assert_eq!(unpacked, original);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let blobs = MockBackend::default();
        assert!(blobs.read("a/b").await.is_err());
        assert!(blobs.write("no spaces", b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_with_blobs_panics_on_bad_key() {
        MockBackend::with_blobs([("../escape", Vec::from(*b"bad"))]);
    }
}
