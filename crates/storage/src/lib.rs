pub mod backend;
pub mod error;
mod key;
mod zlib;

pub use crate::backend::BlobStore;
pub use crate::key::validate as validate_key;
pub use crate::zlib::{compress, decompress};
use std::sync::Arc;

pub type BlobHandle = Arc<dyn BlobStore + Send + Sync>;
