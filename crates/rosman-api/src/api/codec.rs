//! RouterOS API word codec.
//!
//! Every word on the wire carries a variable-width length prefix:
//!
//! | word length            | prefix                              |
//! |------------------------|-------------------------------------|
//! | `< 0x80`               | 1 byte, the length itself           |
//! | `< 0x4000`             | 2 bytes, high bits `10`             |
//! | `< 0x20_0000`          | 3 bytes, high bits `110`            |
//! | `< 0x1000_0000`        | 4 bytes, high bits `1110`           |
//! | otherwise              | `0xF0` then 4 length bytes          |
//!
//! A zero-length word terminates a sentence. First bytes in
//! `0xF1..=0xFF` are reserved control values and never valid lengths.

use crate::api::types::{ApiError, ApiErrorKind};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a single word. Anything larger is treated as a framing
/// error rather than an allocation request.
pub const MAX_WORD_LEN: u32 = 0x0100_0000;

// ── Encoding ────────────────────────────────────────────────────────

/// Encode a word length into its wire prefix.
pub fn encode_length(len: u32) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x4000 {
        let v = len | 0x8000;
        vec![(v >> 8) as u8, v as u8]
    } else if len < 0x20_0000 {
        let v = len | 0x00C0_0000;
        vec![(v >> 16) as u8, (v >> 8) as u8, v as u8]
    } else if len < 0x1000_0000 {
        let v = len | 0xE000_0000;
        vec![(v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8]
    } else {
        vec![0xF0, (len >> 24) as u8, (len >> 16) as u8, (len >> 8) as u8, len as u8]
    }
}

/// Append one length-prefixed word to an outgoing buffer.
pub fn write_word(buf: &mut Vec<u8>, word: &str) {
    buf.extend_from_slice(&encode_length(word.len() as u32));
    buf.extend_from_slice(word.as_bytes());
}

/// Encode a full sentence: each word length-prefixed, then the
/// zero-length terminator.
pub fn encode_sentence<W: AsRef<str>>(words: &[W]) -> Vec<u8> {
    let mut buf = Vec::new();
    for word in words {
        write_word(&mut buf, word.as_ref());
    }
    buf.push(0);
    buf
}

// ── Decoding ────────────────────────────────────────────────────────

async fn read_u8<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u8, ApiError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte).await?;
    Ok(byte[0])
}

/// Decode one length prefix from the stream.
pub async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, ApiError> {
    let b0 = read_u8(reader).await? as u32;
    if b0 & 0x80 == 0 {
        return Ok(b0);
    }
    if b0 & 0xC0 == 0x80 {
        let b1 = read_u8(reader).await? as u32;
        return Ok(((b0 & 0x3F) << 8) | b1);
    }
    if b0 & 0xE0 == 0xC0 {
        let b1 = read_u8(reader).await? as u32;
        let b2 = read_u8(reader).await? as u32;
        return Ok(((b0 & 0x1F) << 16) | (b1 << 8) | b2);
    }
    if b0 & 0xF0 == 0xE0 {
        let b1 = read_u8(reader).await? as u32;
        let b2 = read_u8(reader).await? as u32;
        let b3 = read_u8(reader).await? as u32;
        return Ok(((b0 & 0x0F) << 24) | (b1 << 16) | (b2 << 8) | b3);
    }
    if b0 == 0xF0 {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes).await?;
        return Ok(u32::from_be_bytes(bytes));
    }
    Err(ApiError::protocol(format!(
        "reserved length prefix byte 0x{b0:02X}"
    )))
}

/// Read one word. `None` is the zero-length sentence terminator.
pub async fn read_word<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<String>, ApiError> {
    let len = read_length(reader).await?;
    if len == 0 {
        return Ok(None);
    }
    if len > MAX_WORD_LEN {
        return Err(ApiError::new(
            ApiErrorKind::Protocol,
            format!("word length {len} exceeds limit"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
