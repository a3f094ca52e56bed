use crate::error::Result;
use crate::models::WorkFormat;

/// One immutable snapshot of a work in one format.
///
/// `patch_of = NULL` marks the HEAD entry for its (work_id, format) pair: its
/// blob holds the full content. Every other entry's blob holds a binary delta
/// against the next-newer entry, even though `location` still points at the
/// key the blob was originally written under. The content-form of a blob is
/// decided by `patch_of`, never by the key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StorageRow {
    pub storage_id: i64,
    pub work_id: i64,
    pub format: String,
    /// Unix seconds at which this snapshot reached the coordinator.
    pub uploaded_time: i64,
    /// The publisher's claimed modification time, unix seconds.
    pub updated_time: i64,
    /// Blob store key. Opaque; contents may be a full blob or a delta.
    pub location: String,
    pub patch_of: Option<i64>,
    pub retrieved_from: String,
    /// SHA-1 of the reconstructed (decompressed, post-rewrite) content.
    pub sha1: String,
    pub title: Option<String>,
    pub author: Option<String>,
}

impl StorageRow {
    /// `true` when this entry is the HEAD of its (work_id, format) chain.
    pub fn is_head(&self) -> bool {
        self.patch_of.is_none()
    }

    pub fn format(&self) -> Result<WorkFormat> {
        self.format.parse()
    }
}
