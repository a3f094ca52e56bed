//! Version engine.
//!
//! Each successive upload of a (work_id, format) pair becomes a storage
//! entry. The newest entry, HEAD, always holds the full content as one
//! zlib blob, so the overwhelmingly common "give me the current version"
//! read is a single fetch. Older entries hold binary deltas: when a new
//! HEAD is stored, the previous HEAD's blob is overwritten *in place* with
//! a delta against the new content, and its `patch_of` pointer is aimed at
//! the new entry. Reconstructing any historical version walks the chain
//! from HEAD back down, applying deltas as it goes.
//!
//! Overwriting in place means an entry's `location` never changes across
//! promotions; whether the blob at that key is full content or a delta is
//! decided solely by `patch_of IS NULL`.

mod delta;
mod engine;
pub mod error;

pub use crate::delta::{diff, patch};
pub use crate::engine::{NewWork, current, head, history, reconstruct, store_work, work_exists};
