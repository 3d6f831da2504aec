//! Length-prefixed frame codec (panic-free).
//!
//! Parsing rules:
//! - Never index (`buf[0]`) — always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, SidelinkError};

/// Length prefix size in bytes (u32, big-endian).
pub const LEN_PREFIX_SIZE: usize = 4;

/// Encode a payload as one wire frame: length prefix followed by payload.
///
/// No length limit is enforced here; payloads that would not fit a u32
/// prefix are bounded by the serializer upstream.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LEN_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Decode a length prefix from the start of `buf`.
///
/// Framing error when fewer than 4 bytes are available.
pub fn decode_length(mut buf: &[u8]) -> Result<usize> {
    if buf.remaining() < LEN_PREFIX_SIZE {
        return Err(SidelinkError::Frame(format!(
            "length prefix needs {LEN_PREFIX_SIZE} bytes, got {}",
            buf.remaining()
        )));
    }
    Ok(buf.get_u32() as usize)
}
