//! Schema migrations driven by the `version_info` table.
//!
//! Unlike an embedded migrator, the schema version here is data: v2 added
//! `version_info`, so its absence has to be interpreted. No `version_info`
//! means v1 if `queue` already exists (a pre-versioning deployment), v0 on a
//! blank database. Each step runs in its own transaction and the loop
//! re-reads the version afterwards, so a partially-applied step is retried
//! from scratch rather than papered over.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use sqlx::PgPool;
use tracing::instrument;

/// Schema version this build expects.
pub const CURRENT_VERSION: i32 = 2;

const TABLE_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = $1)";

/// Bring the schema up to [`CURRENT_VERSION`]. Idempotent.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    loop {
        let version = current_version(pool).await?;
        if version == CURRENT_VERSION {
            return Ok(());
        }
        tracing::info!(from = version, to = version + 1, "applying schema migration");
        let sql = match version {
            0 => include_str!("../queries/migrate_v1.sql"),
            1 => include_str!("../queries/migrate_v2.sql"),
            // A database from the future; bail rather than guess.
            _ => exn::bail!(ErrorKind::Migration),
        };
        let mut tx = pool.begin().await.or_raise(|| ErrorKind::Migration)?;
        sqlx::raw_sql(sql).execute(&mut *tx).await.or_raise(|| ErrorKind::Migration)?;
        tx.commit().await.or_raise(|| ErrorKind::Migration)?;
    }
}

/// Read the current schema version.
async fn current_version(pool: &PgPool) -> Result<i32> {
    let has_queue: bool = sqlx::query_scalar(TABLE_EXISTS)
        .bind("queue")
        .fetch_one(pool)
        .await
        .or_raise(|| ErrorKind::Migration)?;
    if !has_queue {
        return Ok(0);
    }
    let has_version_info: bool = sqlx::query_scalar(TABLE_EXISTS)
        .bind("version_info")
        .fetch_one(pool)
        .await
        .or_raise(|| ErrorKind::Migration)?;
    if !has_version_info {
        return Ok(1);
    }
    let version: Option<i32> = sqlx::query_scalar("SELECT version FROM version_info")
        .fetch_optional(pool)
        .await
        .or_raise(|| ErrorKind::Migration)?;
    version.ok_or_raise(|| ErrorKind::Migration)
}
