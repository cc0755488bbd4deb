//! Text-safe compression of rule byte buffers: raw deflate, then base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use std::io::Read;

/// Compresses bytes into a base64 string.
pub fn compress_bytes(bytes: &[u8]) -> std::io::Result<String> {
    let mut compressed = Vec::new();
    DeflateEncoder::new(bytes, Compression::best()).read_to_end(&mut compressed)?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`compress_bytes`]. Returns `None` on any corruption.
pub fn decompress_bytes(text: &str) -> Option<Vec<u8>> {
    let compressed = STANDARD.decode(text.trim()).ok()?;
    let mut bytes = Vec::new();
    DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut bytes).ok()?;
    Some(bytes)
}
