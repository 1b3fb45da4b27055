use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

/// Prefix of the capture line in a report.
pub const CAPTURE_PREFIX: &str = "Compressed packet data: ";
/// Marks a capture that could not be compressed and holds plain base64.
pub const UNCOMPRESSED_MARKER: &str = "[error compressing] ";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid gzip data: {0}")]
    Gzip(#[from] std::io::Error),
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// base64(gzip(bytes)), falling back to marked plain base64 if compression fails.
pub fn to_compressed_base64(bytes: &[u8]) -> String {
    match gzip(bytes) {
        Ok(compressed) => STANDARD.encode(compressed),
        Err(_) => format!("{}{}", UNCOMPRESSED_MARKER, STANDARD.encode(bytes)),
    }
}

/// Recover the raw packet bytes from a capture, with or without the report line prefix.
pub fn decode_capture(text: &str) -> Result<Vec<u8>, CaptureError> {
    let text = text.trim();
    let text = text.strip_prefix(CAPTURE_PREFIX).unwrap_or(text);
    if let Some(plain) = text.strip_prefix(UNCOMPRESSED_MARKER) {
        return Ok(STANDARD.decode(plain)?);
    }
    let compressed = STANDARD.decode(text)?;
    let mut bytes = Vec::new();
    GzDecoder::new(compressed.as_slice()).read_to_end(&mut bytes)?;
    Ok(bytes)
}
