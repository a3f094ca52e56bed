//! PostgreSQL persistence for the coordinator.
//!
//! This crate owns the connection pool, the schema migration state machine
//! and the row models shared by the engine crates. It deliberately contains
//! no business logic: the queue, version and supporting-object engines each
//! carry their own SQL and run it against connections handed out from here,
//! so that one handler-owned transaction can span all three subsystems.

mod db;
pub mod error;
mod migrate;
pub mod models;

pub use crate::db::{Database, DbSettings};
pub use crate::migrate::CURRENT_VERSION;
