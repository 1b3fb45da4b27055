use crate::codec::{read_varint, varint_len, write_varint};
use bytes::{Buf, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read as _, Write as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// Largest frame length the protocol allows (3-byte VarInt).
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// A framed protocol connection with optional compression.
///
/// Frames carry the packet body untouched: the packet ID VarInt followed by the payload.
/// Translation happens above this layer.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    compression_threshold: Option<i32>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            compression_threshold: None,
        }
    }

    /// Enable zlib compression with the given threshold, or disable it with `None`.
    pub fn set_compression(&mut self, threshold: Option<i32>) {
        self.compression_threshold = threshold;
    }

    /// Read a single frame body (packet ID + payload).
    pub async fn read_frame(&mut self) -> anyhow::Result<BytesMut> {
        read_frame_from(&mut self.stream, &mut self.read_buf, self.compression_threshold).await
    }

    /// Write a frame body (packet ID + payload).
    pub async fn write_frame(&mut self, body: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(body, self.compression_threshold)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Split the connection into read and write halves for concurrent I/O.
    /// Compression state and any buffered bytes are transferred to the halves.
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            ConnectionReader {
                stream: read_half,
                read_buf: self.read_buf,
                compression_threshold: self.compression_threshold,
            },
            ConnectionWriter {
                stream: write_half,
                compression_threshold: self.compression_threshold,
            },
        )
    }
}

/// Read half of a split connection.
pub struct ConnectionReader {
    stream: OwnedReadHalf,
    read_buf: BytesMut,
    compression_threshold: Option<i32>,
}

impl ConnectionReader {
    pub fn set_compression(&mut self, threshold: Option<i32>) {
        self.compression_threshold = threshold;
    }

    pub async fn read_frame(&mut self) -> anyhow::Result<BytesMut> {
        read_frame_from(&mut self.stream, &mut self.read_buf, self.compression_threshold).await
    }
}

/// Write half of a split connection.
pub struct ConnectionWriter {
    stream: OwnedWriteHalf,
    compression_threshold: Option<i32>,
}

impl ConnectionWriter {
    pub fn set_compression(&mut self, threshold: Option<i32>) {
        self.compression_threshold = threshold;
    }

    pub async fn write_frame(&mut self, body: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(body, self.compression_threshold)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }
}

// === Shared helpers ===

async fn read_frame_from(
    stream: &mut (impl AsyncReadExt + Unpin),
    read_buf: &mut BytesMut,
    compression_threshold: Option<i32>,
) -> anyhow::Result<BytesMut> {
    loop {
        if let Some(body) = try_parse_frame(read_buf, compression_threshold)? {
            return Ok(body);
        }
        let mut tmp = [0u8; 4096];
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            return Err(anyhow::anyhow!("Connection closed"));
        }
        read_buf.extend_from_slice(&tmp[..n]);
    }
}

/// Split one complete frame off the front of `read_buf`, returning its decompressed body.
/// Returns `None` when more bytes are needed.
pub fn try_parse_frame(
    read_buf: &mut BytesMut,
    compression_threshold: Option<i32>,
) -> anyhow::Result<Option<BytesMut>> {
    if read_buf.is_empty() {
        return Ok(None);
    }

    let mut peek = &read_buf[..];
    let length = match read_varint(&mut peek) {
        Ok(len) => len,
        // A truncated length prefix is at most 3 bytes long; anything past that is garbage.
        Err(_) if read_buf.len() < 3 => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if length < 0 || length as usize > MAX_FRAME_LEN {
        return Err(anyhow::anyhow!("Invalid frame length {}", length));
    }
    let length = length as usize;

    let varint_bytes = read_buf.len() - peek.len();

    if peek.remaining() < length {
        return Ok(None);
    }

    read_buf.advance(varint_bytes);
    let mut body = read_buf.split_to(length);

    if compression_threshold.is_some() {
        let data_length = read_varint(&mut body)?;
        if data_length < 0 || data_length as usize > MAX_FRAME_LEN * 4 {
            return Err(anyhow::anyhow!("Invalid uncompressed length {}", data_length));
        }
        if data_length > 0 {
            let mut decompressed = vec![0u8; data_length as usize];
            let mut decoder = ZlibDecoder::new(&body[..]);
            decoder.read_exact(&mut decompressed)?;
            body = BytesMut::from(&decompressed[..]);
        }
    }

    trace!("Read frame len={}", body.len());

    Ok(Some(body))
}

/// Build a length-prefixed (and, above the threshold, compressed) frame from a body.
pub fn build_frame(body: &[u8], compression_threshold: Option<i32>) -> anyhow::Result<BytesMut> {
    let mut frame = BytesMut::new();

    if let Some(threshold) = compression_threshold {
        let uncompressed_len = body.len() as i32;
        if uncompressed_len >= threshold {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body)?;
            let compressed = encoder.finish()?;

            let data_length_size = varint_len(uncompressed_len);
            let total_length = data_length_size + compressed.len();
            write_varint(&mut frame, total_length as i32);
            write_varint(&mut frame, uncompressed_len);
            frame.extend_from_slice(&compressed);
        } else {
            let total_length = 1 + body.len();
            write_varint(&mut frame, total_length as i32);
            write_varint(&mut frame, 0);
            frame.extend_from_slice(body);
        }
    } else {
        write_varint(&mut frame, body.len() as i32);
        frame.extend_from_slice(body);
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncompressed_frame_roundtrip() {
        let body = [0x0A, 0x01, 0x02, 0x03];
        let mut buf = build_frame(&body, None).unwrap();
        assert_eq!(buf[0], 4);
        let parsed = try_parse_frame(&mut buf, None).unwrap().unwrap();
        assert_eq!(&parsed[..], &body[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_compressed_frame_roundtrip() {
        let body: Vec<u8> = (0..600u32).map(|i| (i % 7) as u8).collect();
        let mut buf = build_frame(&body, Some(256)).unwrap();
        assert!(buf.len() < body.len());
        let parsed = try_parse_frame(&mut buf, Some(256)).unwrap().unwrap();
        assert_eq!(&parsed[..], &body[..]);
    }

    #[test]
    fn test_below_threshold_is_sent_raw() {
        let body = [0x01, 0x02];
        let mut buf = build_frame(&body, Some(256)).unwrap();
        assert_eq!(&buf[..], &[3, 0, 0x01, 0x02]);
        let parsed = try_parse_frame(&mut buf, Some(256)).unwrap().unwrap();
        assert_eq!(&parsed[..], &body[..]);
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let body = [0x01, 0x02, 0x03];
        let full = build_frame(&body, None).unwrap();
        let mut buf = BytesMut::from(&full[..2]);
        assert!(try_parse_frame(&mut buf, None).unwrap().is_none());
        buf.extend_from_slice(&full[2..]);
        assert!(try_parse_frame(&mut buf, None).unwrap().is_some());
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut buf = build_frame(&[0x01], None).unwrap();
        buf.extend_from_slice(&build_frame(&[0x02, 0x03], None).unwrap());
        assert_eq!(&try_parse_frame(&mut buf, None).unwrap().unwrap()[..], &[0x01]);
        assert_eq!(&try_parse_frame(&mut buf, None).unwrap().unwrap()[..], &[0x02, 0x03]);
        assert!(try_parse_frame(&mut buf, None).unwrap().is_none());
    }
}
