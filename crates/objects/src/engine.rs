//! Database-backed half of the supporting-object subsystem.
//!
//! Everything here takes a `&mut PgConnection` so the caller decides the
//! transaction boundary; the submission path in particular must be atomic
//! with the queue and version work that surrounds it.

use crate::error::{ErrorKind, Result};
use crate::rewrite;
use exn::ResultExt;
use hoard_db::models::{ObjectIndexRow, ObjectStoreRow, UnfetchedRow};
use hoard_storage::BlobHandle;
use scraper::Html;
use serde::Serialize;
use sha1::{Digest, Sha1};
use sqlx::PgConnection;
use tracing::instrument;

/// Leases on unfetched objects expire after this long, mirroring job leases.
const LEASE_WINDOW_SQL: &str = "4 minutes";
/// Dispatches before an unfetched object is marked stalled and parked.
const MAX_OBJECT_DISPATCHES: i64 = 3;

/// Descriptor of a supporting-object reference whose payload still needs to
/// be fetched. Returned to workers from the submission endpoints.
///
/// `etag`/`sha1` are optional hints copied from an already-indexed fetch of
/// the same URL, so a worker can make a conditional request and skip the
/// download when the publisher still serves the same bytes.
#[derive(Debug, Clone, Serialize)]
pub struct UnfetchedObject {
    pub object_id: i64,
    pub request_url: String,
    pub stalled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

/// A leased unfetched object, handed to a worker.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectOrder {
    pub dispatch_id: i64,
    pub object_id: i64,
    pub request_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

/// Rewrite the image references of an HTML work about to be stored.
///
/// Allocates an object id per `<img src>` (inserting the `unfetched_objects`
/// row as it goes), rewrites the document and returns the serialized result
/// together with the descriptors for the worker. A document without image
/// references is passed through byte-for-byte.
#[instrument(skip_all, fields(size = work.len(), references))]
pub async fn rewrite_stored_html(conn: &mut PgConnection, work: &[u8]) -> Result<(Vec<u8>, Vec<UnfetchedObject>)> {
    let text = String::from_utf8_lossy(work);
    let mut doc = Html::parse_document(&text);
    let images = rewrite::collect_image_refs(&doc);
    tracing::Span::current().record("references", images.len());
    if images.is_empty() {
        return Ok((work.to_vec(), Vec::new()));
    }
    let mut assigned = Vec::with_capacity(images.len());
    let mut descriptors = Vec::with_capacity(images.len());
    for image in images {
        let object_id: i64 = sqlx::query_scalar(include_str!("../queries/insert_unfetched.sql"))
            .bind(&image.src)
            .fetch_one(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let hint = etag_hint(conn, &image.src).await?;
        descriptors.push(UnfetchedObject {
            object_id,
            request_url: image.src.clone(),
            stalled: false,
            etag: hint.as_ref().and_then(|(etag, _)| etag.clone()),
            sha1: hint.map(|(_, sha1)| sha1),
        });
        assigned.push((image, object_id));
    }
    rewrite::apply_rewrites(&mut doc, &assigned);
    Ok((doc.html().into_bytes(), descriptors))
}

/// (etag, sha1) of an already-indexed fetch of the same URL, if any.
async fn etag_hint(conn: &mut PgConnection, request_url: &str) -> Result<Option<(Option<String>, String)>> {
    sqlx::query_as(include_str!("../queries/find_etag_hint.sql"))
        .bind(request_url)
        .fetch_optional(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

/// Accept a fetched payload for an unfetched object.
///
/// The whole pipeline runs on the caller's transaction so that no state is
/// observable where an object id has both an unfetched row and an index row,
/// or neither:
///
/// 1. an index entry for the same (url, etag, sha1) already exists → record a
///    duplicate mapping and drop the unfetched row;
/// 2. the payload bytes are already in `object_store` → new index row
///    pointing at the existing blob;
/// 3. otherwise → write the blob under `obj_<sha1>`, then store + index rows.
#[instrument(skip(conn, blobs, data), fields(size = data.len()))]
pub async fn submit_object(
    conn: &mut PgConnection,
    blobs: &BlobHandle,
    object_id: i64,
    data: &[u8],
    etag: Option<&str>,
    mimetype: &str,
) -> Result<()> {
    let unfetched: Option<UnfetchedRow> = sqlx::query_as(include_str!("../queries/get_unfetched.sql"))
        .bind(object_id)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    let Some(unfetched) = unfetched else {
        exn::bail!(ErrorKind::ObjectNotFound);
    };
    let request_url = unfetched.request_url;
    let sha1 = hex::encode(Sha1::digest(data));

    let existing_index: Option<(i64,)> = sqlx::query_as(include_str!("../queries/find_index_entry.sql"))
        .bind(&request_url)
        .bind(etag)
        .bind(&sha1)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if let Some((existing_id,)) = existing_index {
        delete_unfetched(conn, object_id).await?;
        sqlx::query(include_str!("../queries/insert_duplicate_mapping.sql"))
            .bind(object_id)
            .bind(existing_id)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(object_id, existing_id, "duplicate object reference collapsed");
        return Ok(());
    }

    let in_store: Option<ObjectStoreRow> = sqlx::query_as(include_str!("../queries/find_store_entry.sql"))
        .bind(&sha1)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if in_store.is_none() {
        // Supporting objects are mostly already-compressed image formats;
        // stored raw, unlike work blobs.
        let location = format!("obj_{sha1}");
        blobs.write(&location, data).await.or_raise(|| ErrorKind::Blob)?;
        sqlx::query(include_str!("../queries/insert_store_entry.sql"))
            .bind(&sha1)
            .bind(&location)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
    }

    delete_unfetched(conn, object_id).await?;
    sqlx::query(include_str!("../queries/insert_index_entry.sql"))
        .bind(object_id)
        .bind(&request_url)
        .bind(etag)
        .bind(&sha1)
        .bind(mimetype)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

async fn delete_unfetched(conn: &mut PgConnection, object_id: i64) -> Result<()> {
    sqlx::query(include_str!("../queries/delete_unfetched.sql"))
        .bind(object_id)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

/// Resolve an object id to its index entry and blob location, following at
/// most one duplicate-mapping hop.
///
/// Returns `None` for ids that were never indexed (still unfetched, stalled,
/// or simply unknown); the serving layer turns that into a 404, which the
/// rewritten HTML's `onerror` fallback absorbs.
pub async fn locate(conn: &mut PgConnection, object_id: i64) -> Result<Option<(ObjectIndexRow, String)>> {
    let mut row: Option<ObjectIndexRow> = sqlx::query_as(include_str!("../queries/get_index_entry.sql"))
        .bind(object_id)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if row.is_none() {
        let duplicate_of: Option<(i64,)> = sqlx::query_as(include_str!("../queries/get_duplicate_mapping.sql"))
            .bind(object_id)
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if let Some((target,)) = duplicate_of {
            row = sqlx::query_as(include_str!("../queries/get_index_entry.sql"))
                .bind(target)
                .fetch_optional(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
    }
    let Some(row) = row else {
        return Ok(None);
    };
    let store: Option<ObjectStoreRow> = sqlx::query_as(include_str!("../queries/find_store_entry.sql"))
        .bind(&row.sha1)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    // An index row always references a store row; a miss here is corruption,
    // not a user-visible absence.
    let store = store.ok_or_else(|| exn::Exn::from(ErrorKind::Database))?;
    Ok(Some((row, store.location)))
}

/// Lease the oldest fetchable unfetched object to a worker.
///
/// The same shape as job leasing: a lease is just a recent dispatch row, and
/// expiry is implicit. An object that has burnt through its dispatch budget
/// is marked stalled and never offered again.
#[instrument(skip(conn))]
pub async fn lease_object(conn: &mut PgConnection, worker: &str) -> Result<Option<ObjectOrder>> {
    loop {
        let candidate: Option<(i64, String)> = sqlx::query_as(include_str!("../queries/lease_candidate.sql"))
            .bind(LEASE_WINDOW_SQL)
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some((object_id, request_url)) = candidate else {
            return Ok(None);
        };
        let dispatches: i64 = sqlx::query_scalar(include_str!("../queries/count_object_dispatches.sql"))
            .bind(object_id)
            .fetch_one(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if dispatches >= MAX_OBJECT_DISPATCHES {
            tracing::warn!(object_id, dispatches, "unfetched object stalled");
            sqlx::query(include_str!("../queries/stall_object.sql"))
                .bind(object_id)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
            continue;
        }
        let dispatch_id: i64 = sqlx::query_scalar(include_str!("../queries/insert_object_dispatch.sql"))
            .bind(worker)
            .bind(object_id)
            .fetch_one(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let hint = etag_hint(conn, &request_url).await?;
        return Ok(Some(ObjectOrder {
            dispatch_id,
            object_id,
            request_url,
            etag: hint.as_ref().and_then(|(etag, _)| etag.clone()),
            sha1: hint.map(|(_, sha1)| sha1),
        }));
    }
}

/// Record a failed fetch attempt against an object dispatch.
///
/// Returns [`ErrorKind::ObjectNotFound`] when the dispatch id is unknown or
/// its failure was already recorded.
pub async fn mark_object_fail(conn: &mut PgConnection, dispatch_id: i64) -> Result<()> {
    let result = sqlx::query(include_str!("../queries/fail_object_dispatch.sql"))
        .bind(dispatch_id)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if result.rows_affected() == 0 {
        exn::bail!(ErrorKind::ObjectNotFound);
    }
    Ok(())
}
