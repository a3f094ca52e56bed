//! Database connection and pool management.

use crate::error::{ErrorKind, Result};
use crate::migrate;
use exn::ResultExt;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::instrument;

// We want to make use of that async-goodness, so... 5-ish?
const MAX_CONNECTIONS: u32 = 5;

/// Connection settings, one field per `POSTGRESQL_*` environment variable.
#[derive(Debug, Clone, Deserialize)]
pub struct DbSettings {
    pub database: String,
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

/// Database connection pool for the coordinator.
///
/// This is the main entry point for interacting with the relational store.
/// Connecting runs the schema migrations before the pool is handed out, so a
/// `Database` in scope is always at [`CURRENT_VERSION`](crate::CURRENT_VERSION).
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and bring the schema up to date.
    pub async fn connect(settings: &DbSettings) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Build a pool without touching the network or running migrations; the
    /// first query will attempt to connect.
    ///
    /// Note:
    /// - Intended for tests that exercise request plumbing without a live
    ///   database.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this
    ///   in their tests.
    pub fn connect_lazy(settings: &DbSettings) -> Self {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);
        let pool = PgPoolOptions::new().max_connections(MAX_CONNECTIONS).connect_lazy_with(options);
        Self { pool }
    }

    /// Run schema migrations.
    ///
    /// This is called automatically by `connect`, but can be called manually
    /// if needed. Safe to run repeatedly.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        migrate::ensure_schema(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction.
    ///
    /// Every HTTP handler opens exactly one of these for its whole critical
    /// section: commit on normal return, roll back on any raised error.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.or_raise(|| ErrorKind::Database)
    }

    /// Close the connection pool.
    ///
    /// This waits for all connections to be returned to the pool and then
    /// closes them. After calling this, the Database instance should not
    /// be used.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
