//! Supporting-object engine.
//!
//! When a stored work is HTML, its embedded image references are rewritten to
//! point back at this service (`/objects/<id>`) instead of the publisher, and
//! every rewritten reference becomes an "unfetched object" a worker can later
//! supply the payload for. Payloads are deduplicated by SHA-1: the same image
//! referenced from a thousand works is stored once.
//!
//! The id handed out at rewrite time has to survive the payload arriving
//! later (the URL is already baked into stored HTML), which is why
//! `unfetched_objects` and `object_index` share one id sequence and why a
//! duplicate submission leaves a mapping row behind instead of reusing ids.

mod engine;
pub mod error;
mod rewrite;

pub use crate::engine::{
    ObjectOrder, UnfetchedObject, lease_object, locate, mark_object_fail, rewrite_stored_html, submit_object,
};
