//! In-memory zlib compression.
//!
//! Work blobs and their deltas are stored zlib-compressed; supporting objects
//! are stored raw. One format, no negotiation, no magic-byte sniffing.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::Compression as ZlibLevel;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};
use tracing::instrument;

// This crate prioritizes storage space over speed; works are written once and
// read rarely.
const LEVEL: ZlibLevel = ZlibLevel::best();

/// Compress a byte slice in memory.
///
/// # Examples
///
/// ```
/// let data = vec![0u8; 512];
/// let packed = hoard_storage::compress(&data).unwrap();
/// assert!(packed.len() < data.len());
/// ```
#[instrument(skip(input), fields(input_size = input.len()))]
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), LEVEL);
    encoder.write_all(input).or_raise(|| ErrorKind::Corrupt)?;
    encoder.finish().or_raise(|| ErrorKind::Corrupt)
}

/// Decompress a byte slice in memory.
///
/// Returns [`ErrorKind::Corrupt`] if the input is not a valid zlib stream.
#[instrument(skip(input), fields(input_size = input.len()))]
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut decoder = ZlibDecoder::new(input);
    decoder.read_to_end(&mut output).or_raise(|| ErrorKind::Corrupt)?;
    Ok(output)
}
