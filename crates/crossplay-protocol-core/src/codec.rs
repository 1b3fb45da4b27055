use bytes::{Buf, BufMut};
use crossplay_types::BlockPos;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("VarInt too big")]
    VarIntTooBig,
    #[error("Not enough data: needed {needed}, {remaining} remaining")]
    NotEnoughData { needed: usize, remaining: usize },
    #[error("String too long: {0} > {1}")]
    StringTooLong(usize, usize),
    #[error("Negative length prefix: {0}")]
    NegativeLength(i32),
    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,
    #[error("Invalid boolean byte: {0}")]
    InvalidBool(u8),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Maximum string length (in characters) the protocol allows by default.
pub const MAX_STRING_LEN: usize = 32767;

fn ensure(buf: &impl Buf, needed: usize) -> CodecResult<()> {
    if buf.remaining() < needed {
        return Err(CodecError::NotEnoughData {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Read a VarInt from the buffer.
pub fn read_varint(buf: &mut impl Buf) -> CodecResult<i32> {
    let mut result: i32 = 0;
    let mut shift: u32 = 0;
    loop {
        ensure(buf, 1)?;
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 32 {
            return Err(CodecError::VarIntTooBig);
        }
    }
}

/// Write a VarInt to the buffer.
pub fn write_varint(buf: &mut impl BufMut, mut value: i32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Calculate the byte length of a VarInt.
pub fn varint_len(value: i32) -> usize {
    let mut val = value as u32;
    let mut len = 0;
    loop {
        len += 1;
        val >>= 7;
        if val == 0 {
            break;
        }
    }
    len
}

/// Read a VarLong from the buffer.
pub fn read_varlong(buf: &mut impl Buf) -> CodecResult<i64> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    loop {
        ensure(buf, 1)?;
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(CodecError::VarIntTooBig);
        }
    }
}

/// Write a VarLong to the buffer.
pub fn write_varlong(buf: &mut impl BufMut, mut value: i64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u64) >> 7) as i64;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_length(buf: &mut impl Buf) -> CodecResult<usize> {
    let len = read_varint(buf)?;
    if len < 0 {
        return Err(CodecError::NegativeLength(len));
    }
    Ok(len as usize)
}

/// Read a protocol string (varint-prefixed UTF-8).
pub fn read_string(buf: &mut impl Buf, max_len: usize) -> CodecResult<String> {
    let len = read_length(buf)?;
    if len > max_len * 4 {
        return Err(CodecError::StringTooLong(len, max_len));
    }
    ensure(buf, len)?;
    let bytes = buf.copy_to_bytes(len);
    let s = String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
    if s.chars().count() > max_len {
        return Err(CodecError::StringTooLong(s.chars().count(), max_len));
    }
    Ok(s)
}

/// Write a protocol string.
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Read a UUID (128 bits, big endian).
pub fn read_uuid(buf: &mut impl Buf) -> CodecResult<Uuid> {
    ensure(buf, 16)?;
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

/// Write a UUID.
pub fn write_uuid(buf: &mut impl BufMut, uuid: &Uuid) {
    buf.put_slice(uuid.as_bytes());
}

/// Read a byte array with varint length prefix.
pub fn read_byte_array(buf: &mut impl Buf) -> CodecResult<Vec<u8>> {
    let len = read_length(buf)?;
    ensure(buf, len)?;
    Ok(buf.copy_to_bytes(len).to_vec())
}

/// Write a byte array with varint length prefix.
pub fn write_byte_array(buf: &mut impl BufMut, data: &[u8]) {
    write_varint(buf, data.len() as i32);
    buf.put_slice(data);
}

/// Read a length prefix for a list, rejecting negative counts.
pub fn read_list_len(buf: &mut impl Buf) -> CodecResult<usize> {
    read_length(buf)
}

pub fn read_bool(buf: &mut impl Buf) -> CodecResult<bool> {
    ensure(buf, 1)?;
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::InvalidBool(other)),
    }
}

/// Read a packed block position.
pub fn read_position(buf: &mut impl Buf) -> CodecResult<BlockPos> {
    ensure(buf, 8)?;
    Ok(BlockPos::decode(buf.get_u64()))
}

pub fn write_position(buf: &mut impl BufMut, pos: &BlockPos) {
    buf.put_u64(pos.encode());
}

macro_rules! read_fixed {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $get:ident) => {
        $(#[$doc])*
        pub fn $name(buf: &mut impl Buf) -> CodecResult<$ty> {
            ensure(buf, std::mem::size_of::<$ty>())?;
            Ok(buf.$get())
        }
    };
}

read_fixed!(read_i8, i8, get_i8);
read_fixed!(read_u8, u8, get_u8);
read_fixed!(read_i16, i16, get_i16);
read_fixed!(read_u16, u16, get_u16);
read_fixed!(read_i32, i32, get_i32);
read_fixed!(read_i64, i64, get_i64);
read_fixed!(read_f32, f32, get_f32);
read_fixed!(read_f64, f64, get_f64);
