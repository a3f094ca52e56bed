//! Store and reconstruct operations over the storage-entry chain.

use crate::delta;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use hoard_db::models::{StorageRow, WorkFormat};
use hoard_storage::BlobHandle;
use sha1::{Digest, Sha1};
use sqlx::PgConnection;
use tracing::instrument;

/// Guard on patch-chain walks. A chain longer than this means a cycle or
/// other corruption, not a work with a hundred archived revisions, but the
/// limit is generous enough that the distinction doesn't matter.
const MAX_CHAIN_HOPS: usize = 100;

/// A new version of a work, ready to be stored.
#[derive(Debug, Clone, Copy)]
pub struct NewWork<'a> {
    pub work_id: i64,
    pub data: &'a [u8],
    /// Unix seconds at which the coordinator accepted the upload.
    pub uploaded_time: i64,
    /// The publisher's claimed modification time, unix seconds.
    pub updated_time: i64,
    pub retrieved_from: &'a str,
    pub format: WorkFormat,
    pub title: Option<&'a str>,
    pub author: Option<&'a str>,
}

/// Store a new version of a work, promoting it to HEAD.
///
/// HTML works pass through the supporting-object engine first, which may
/// rewrite the bytes and allocate unfetched-object descriptors; the returned
/// list is empty for every other format.
///
/// Fails with [`ErrorKind::DuplicateDetected`] when the (post-rewrite) bytes
/// hash identically to the current HEAD, leaving all state untouched.
///
/// The blob writes are not transactional: a database rollback after this
/// returns leaves orphaned blobs behind. That is deliberate: the keys are
/// content-addressed, so a retry overwrites the same keys instead of leaking
/// new ones.
#[instrument(skip(conn, blobs, work), fields(work_id = work.work_id, format = %work.format, size = work.data.len()))]
pub async fn store_work(
    conn: &mut PgConnection,
    blobs: &BlobHandle,
    work: NewWork<'_>,
) -> Result<Vec<hoard_objects::UnfetchedObject>> {
    let (data, unfetched) = match work.format {
        WorkFormat::Html => hoard_objects::rewrite_stored_html(conn, work.data)
            .await
            .map_err(ErrorKind::objects)?,
        _ => (work.data.to_vec(), Vec::new()),
    };

    let sha1 = hex::encode(Sha1::digest(&data));
    let previous_head = head(conn, work.work_id, work.format).await?;
    if previous_head.as_ref().is_some_and(|prev| prev.sha1 == sha1) {
        exn::bail!(ErrorKind::DuplicateDetected);
    }

    let location = format!("{}_{}", work.work_id, sha1);
    blobs.write_compressed(&location, &data).await.or_raise(|| ErrorKind::Blob)?;
    let storage_id: i64 = sqlx::query_scalar(include_str!("../queries/insert_entry.sql"))
        .bind(work.work_id)
        .bind(work.format.as_str())
        .bind(work.uploaded_time)
        .bind(work.updated_time)
        .bind(&location)
        .bind(work.retrieved_from)
        .bind(&sha1)
        .bind(work.title)
        .bind(work.author)
        .fetch_one(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;

    if let Some(prev) = previous_head {
        // Demote the old HEAD: its blob (at its existing key) becomes a
        // reverse delta against the version that just replaced it.
        let old_content = blobs.read_compressed(&prev.location).await.or_raise(|| ErrorKind::Blob)?;
        let reverse = delta::diff(&data, &old_content)?;
        blobs.write_compressed(&prev.location, &reverse).await.or_raise(|| ErrorKind::Blob)?;
        sqlx::query(include_str!("../queries/set_patch_of.sql"))
            .bind(storage_id)
            .bind(prev.storage_id)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(
            demoted = prev.storage_id,
            promoted = storage_id,
            delta_size = reverse.len(),
            "previous head rewritten as delta"
        );
    }

    Ok(unfetched)
}

/// Reconstruct the exact bytes of any storage entry, current or historical.
///
/// Walks `patch_of` up to the HEAD (at most [`MAX_CHAIN_HOPS`] entries),
/// fetches the HEAD blob, then applies each intermediate delta back down to
/// the target. Cost is proportional to the entry's distance from HEAD.
#[instrument(skip(conn, blobs))]
pub async fn reconstruct(
    conn: &mut PgConnection,
    blobs: &BlobHandle,
    storage_id: i64,
) -> Result<(Vec<u8>, StorageRow)> {
    let target = entry(conn, storage_id).await?.ok_or_raise(|| ErrorKind::WorkNotFound)?;

    // Collected target-first; the HEAD ends up last.
    let mut chain: Vec<StorageRow> = Vec::new();
    let mut cursor = target.clone();
    let mut reached_head = false;
    for _ in 0..MAX_CHAIN_HOPS {
        let parent = cursor.patch_of;
        chain.push(cursor);
        match parent {
            None => {
                reached_head = true;
                break;
            },
            // A dangling patch_of is corruption, but to the caller it's the
            // same as the work not existing.
            Some(id) => cursor = entry(conn, id).await?.ok_or_raise(|| ErrorKind::WorkNotFound)?,
        }
    }
    if !reached_head {
        exn::bail!(ErrorKind::TooManyIterations);
    }

    let head_entry = chain.pop().expect("chain always holds at least the target");
    let mut master = blobs.read_compressed(&head_entry.location).await.or_raise(|| ErrorKind::Blob)?;
    for step in chain.iter().rev() {
        let reverse = blobs.read_compressed(&step.location).await.or_raise(|| ErrorKind::Blob)?;
        master = delta::patch(&master, &reverse)?;
    }
    Ok((master, target))
}

/// The HEAD entry for a (work_id, format) pair, if the work has ever been
/// archived in that format.
pub async fn head(conn: &mut PgConnection, work_id: i64, format: WorkFormat) -> Result<Option<StorageRow>> {
    sqlx::query_as(include_str!("../queries/head_entry.sql"))
        .bind(work_id)
        .bind(format.as_str())
        .fetch_optional(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

/// Current HEAD bytes for a (work_id, format) pair in one blob fetch.
pub async fn current(
    conn: &mut PgConnection,
    blobs: &BlobHandle,
    work_id: i64,
    format: WorkFormat,
) -> Result<Option<Vec<u8>>> {
    let Some(entry) = head(conn, work_id, format).await? else {
        return Ok(None);
    };
    let data = blobs.read_compressed(&entry.location).await.or_raise(|| ErrorKind::Blob)?;
    Ok(Some(data))
}

/// Every storage entry for a work, newest upload first, all formats mixed.
/// The caller decides how to present them.
pub async fn history(conn: &mut PgConnection, work_id: i64) -> Result<Vec<StorageRow>> {
    sqlx::query_as(include_str!("../queries/history.sql"))
        .bind(work_id)
        .fetch_all(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

/// Whether any version of the work has been archived, in any format.
pub async fn work_exists(conn: &mut PgConnection, work_id: i64) -> Result<bool> {
    sqlx::query_scalar(include_str!("../queries/work_exists.sql"))
        .bind(work_id)
        .fetch_one(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

async fn entry(conn: &mut PgConnection, storage_id: i64) -> Result<Option<StorageRow>> {
    sqlx::query_as(include_str!("../queries/get_entry.sql"))
        .bind(storage_id)
        .fetch_optional(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}
