/// A supporting-object reference discovered during HTML rewriting whose
/// payload has not been fetched yet.
///
/// `object_id` is drawn from the same sequence as `object_index.object_id`,
/// so the `/objects/<id>` URL baked into rewritten HTML survives the row's
/// move into the index once the payload arrives.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnfetchedRow {
    pub object_id: i64,
    pub request_url: String,
    /// Set after repeated failed fetch attempts; stalled objects are no
    /// longer leased out.
    pub stalled: bool,
}

/// A servable supporting object: URL-context metadata pointing at a
/// deduplicated payload in `object_store`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ObjectIndexRow {
    pub object_id: i64,
    pub request_url: String,
    pub etag: Option<String>,
    pub sha1: String,
    pub mimetype: String,
}

/// A deduplicated supporting payload, keyed by content hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ObjectStoreRow {
    pub sha1: String,
    pub location: String,
}
