//! Row models shared by the engine crates.
//!
//! Timestamps surfaced to Rust (`uploaded_time`, `updated_time`, `updated`)
//! are unix seconds as `i64`; the `TIMESTAMPTZ` columns (`submitted_time`,
//! `dispatched_time`) only ever participate in SQL-side comparisons and are
//! never mapped into these structs.

mod dispatch;
mod format;
mod job;
mod object;
mod work;

pub use self::dispatch::DispatchRow;
pub use self::format::WorkFormat;
pub use self::job::{JobRow, JobStatus};
pub use self::object::{ObjectIndexRow, ObjectStoreRow, UnfetchedRow};
pub use self::work::StorageRow;
