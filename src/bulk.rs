//! Bulk zip export.
//!
//! Two-step flow: the client posts its list of works to `bulk_prepare` and
//! receives an opaque download id; a later GET streams the archive. The list
//! lives in a small in-process LRU; evicted entries just mean the client
//! re-prepares, nothing durable is lost.
//!
//! The archive is written to an unlinked temp file first and streamed from
//! disk, with zip64 enabled so the result may exceed 4 GiB without buffering
//! anything of that size in memory.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use hoard_db::models::WorkFormat;
use lru::LruCache;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::io::{Seek, Write};
use std::num::NonZeroUsize;
use std::sync::{LazyLock, Mutex};
use tokio_util::io::ReaderStream;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Prepared-but-not-yet-downloaded lists kept around. Small on purpose; this
/// is a hand-off buffer, not a store.
const CACHE_SIZE: usize = 50;

/// Characters that have no business in a zip entry filename, replaced by `-`.
static FILENAME_SANITIZER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\?%*:|"<>\x7F\x00-\x1F]"#).unwrap());

#[derive(Debug, Clone, Deserialize)]
pub struct BulkEntry {
    pub work_id: i64,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub works: Vec<BulkEntry>,
}

/// Thread-safe LRU of prepared download lists, keyed by download id.
#[derive(Debug)]
pub struct BulkCache {
    inner: Mutex<LruCache<String, Vec<BulkEntry>>>,
}

impl Default for BulkCache {
    fn default() -> Self {
        Self {
            // unwrap is safe: CACHE_SIZE is a non-zero constant
            inner: Mutex::new(LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap())),
        }
    }
}

impl BulkCache {
    pub fn insert(&self, dl_id: String, works: Vec<BulkEntry>) {
        self.inner.lock().unwrap().put(dl_id, works);
    }

    pub fn get(&self, dl_id: &str) -> Option<Vec<BulkEntry>> {
        self.inner.lock().unwrap().get(dl_id).cloned()
    }
}

pub fn sanitize_title(title: &str) -> String {
    FILENAME_SANITIZER.replace_all(title, "-").into_owned()
}

/// POST `/works/dl/bulk_prepare`
pub async fn bulk_prepare(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dl_id = uuid::Uuid::new_v4().simple().to_string();
    state.bulk.insert(dl_id.clone(), request.works);
    Ok(Json(json!({ "dl_id": dl_id })))
}

/// GET `/works/dl/bulk_dl/{dl_id}`
pub async fn bulk_dl(State(state): State<AppState>, Path(dl_id): Path<String>) -> Result<Response, ApiError> {
    let Some(works) = state.bulk.get(&dl_id) else {
        return Err(ApiError::not_found(
            "Download not valid, please initiate a new download or check that you have the right url.",
        ));
    };

    let spool = tempfile::tempfile().map_err(|err| {
        tracing::error!(error = %err, "failed to open bulk download spool");
        ApiError::internal()
    })?;
    let mut zip = ZipWriter::new(spool);
    // PDFs barely deflate, but zip64 matters: whole-library exports clear
    // 4 GiB easily.
    let options = SimpleFileOptions::default().large_file(true);

    let mut tx = state.db.begin().await?;
    for entry in &works {
        // A work whose HEAD can't be produced is skipped, not fatal; the
        // archive ships with whatever could be fetched.
        let content = match hoard_archive::current(&mut tx, &state.blobs, entry.work_id, WorkFormat::Pdf).await
        {
            Ok(Some(content)) => content,
            Ok(None) => {
                tracing::debug!(work_id = entry.work_id, "no pdf head, skipping");
                continue;
            },
            Err(err) => {
                tracing::warn!(work_id = entry.work_id, error = %err, "skipping work in bulk download");
                continue;
            },
        };
        let filename = format!("{} ({}).pdf", sanitize_title(&entry.title), entry.work_id);
        let write = zip
            .start_file(filename, options)
            .and_then(|()| zip.write_all(&content).map_err(Into::into));
        if let Err(err) = write {
            tracing::error!(work_id = entry.work_id, error = %err, "bulk zip write failed");
            return Err(ApiError::internal());
        }
    }
    tx.commit().await?;

    let mut spool = zip.finish().map_err(|err| {
        tracing::error!(error = %err, "bulk zip finish failed");
        ApiError::internal()
    })?;
    spool.rewind().map_err(|err| {
        tracing::error!(error = %err, "bulk spool rewind failed");
        ApiError::internal()
    })?;

    let stream = ReaderStream::new(tokio::fs::File::from_std(spool));
    let response = ([(header::CONTENT_TYPE, "application/zip")], Body::from_stream(stream));
    Ok(response.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("plain title", "plain title")]
    #[case("a/b\\c", "a-b-c")]
    #[case("what? 100% *mine*: yes|no", "what- 100- -mine-- yes-no")]
    #[case("quote\"angle<>", "quote-angle--")]
    #[case("ctrl\x01char\x1f and del\x7f", "ctrl-char- and del-")]
    #[case("unicode is fine ✨", "unicode is fine ✨")]
    fn test_sanitize_title(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_title(input), expected);
    }

    #[test]
    fn test_cache_roundtrip() {
        let cache = BulkCache::default();
        cache.insert("abc".to_string(), vec![BulkEntry { work_id: 1, title: "t".to_string() }]);
        assert_eq!(cache.get("abc").unwrap()[0].work_id, 1);
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_cache_evicts_oldest() {
        let cache = BulkCache::default();
        for i in 0..=CACHE_SIZE {
            cache.insert(format!("id-{i}"), Vec::new());
        }
        // One over capacity: the first insert is gone, the newest survive.
        assert!(cache.get("id-0").is_none());
        assert!(cache.get(&format!("id-{CACHE_SIZE}")).is_some());
    }
}
