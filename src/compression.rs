//! Payload compression for stored responses.
//!
//! Bodies at or above the configured threshold are gzip-compressed before
//! they are stored and inflated again when served.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::error::Result;

/// Whether a body of `len` bytes should be stored compressed.
pub fn should_compress(len: usize, threshold: usize) -> bool {
    len >= threshold
}

pub fn compress(data: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::fast());
    encoder.write_all(data)?;
    Ok(Bytes::from(encoder.finish()?))
}

pub fn decompress(data: &[u8]) -> Result<Bytes> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder.read_to_end(&mut out)?;
    Ok(Bytes::from(out))
}
