//! Shared handler state, built once at startup and cloned per request.

use crate::bulk::BulkCache;
use hoard_db::Database;
use hoard_storage::BlobHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub blobs: BlobHandle,
    pub admin_token: Option<String>,
    pub bulk: Arc<BulkCache>,
}
