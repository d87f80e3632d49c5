//! Key codec
//!
//! Order-preserving byte encoding for keys. Every segment starts with a type
//! tag and is self-delimiting, so comparing two encoded keys byte by byte
//! gives the same result as comparing their [`KeyPart`] sequences.
//!
//! ## Segment Format
//! ```text
//! ┌──────────┬───────────────────────────────────────────────┐
//! │ Tag (1)  │ Payload                                       │
//! ├──────────┼───────────────────────────────────────────────┤
//! │ 0x01     │ bytes, escaped, 0x00 terminated               │
//! │ 0x02     │ UTF-8 string, escaped, 0x00 terminated        │
//! │ 0x14     │ i64, sign bit flipped, big-endian (8)         │
//! │ 0x21     │ f64, sortable transform, big-endian (8)       │
//! │ 0x26     │ false (no payload)                            │
//! │ 0x27     │ true (no payload)                             │
//! └──────────┴───────────────────────────────────────────────┘
//! ```
//!
//! Escaping: `0x00 → 0x01 0x01`, `0x01 → 0x01 0x02`. The terminator is the
//! lowest byte, so shorter strings sort before their extensions.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, TkvError};

use super::KeyPart;

const TAG_BYTES: u8 = 0x01;
const TAG_STRING: u8 = 0x02;
const TAG_INT: u8 = 0x14;
const TAG_FLOAT: u8 = 0x21;
const TAG_FALSE: u8 = 0x26;
const TAG_TRUE: u8 = 0x27;

const TERMINATOR_BYTE: u8 = 0x00;
const ESCAPE_BYTE: u8 = 0x01;

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// Byte appended to an encoded prefix to form its exclusive upper bound.
/// Larger than every tag, so it sorts after all extensions of the prefix.
pub const PREFIX_END_BYTE: u8 = 0xFF;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a sequence of segments into ordered key bytes
pub fn encode_parts(parts: &[KeyPart]) -> Bytes {
    let mut buf = BytesMut::new();
    for part in parts {
        encode_part(part, &mut buf);
    }
    buf.freeze()
}

/// Append one encoded segment to `buf`
pub fn encode_part(part: &KeyPart, buf: &mut BytesMut) {
    match part {
        KeyPart::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            put_terminated(b, buf);
        }
        KeyPart::String(s) => {
            buf.put_u8(TAG_STRING);
            put_terminated(s.as_bytes(), buf);
        }
        KeyPart::Int(i) => {
            buf.put_u8(TAG_INT);
            buf.put_u64(encode_i64_sortable(*i));
        }
        KeyPart::Float(x) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_u64(encode_f64_sortable(*x));
        }
        KeyPart::Bool(false) => buf.put_u8(TAG_FALSE),
        KeyPart::Bool(true) => buf.put_u8(TAG_TRUE),
    }
}

/// Exclusive upper bound of every key that starts with `prefix`
///
/// The prefix itself is included in `[prefix, prefix_end(prefix))`, which is
/// what makes a full-length key a valid singleton prefix.
pub fn prefix_end(prefix: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(prefix.len() + 1);
    buf.put_slice(prefix);
    buf.put_u8(PREFIX_END_BYTE);
    buf.freeze()
}

fn put_terminated(data: &[u8], buf: &mut BytesMut) {
    for &byte in data {
        match byte {
            TERMINATOR_BYTE => {
                buf.put_u8(ESCAPE_BYTE);
                buf.put_u8(0x01);
            }
            ESCAPE_BYTE => {
                buf.put_u8(ESCAPE_BYTE);
                buf.put_u8(0x02);
            }
            _ => buf.put_u8(byte),
        }
    }
    buf.put_u8(TERMINATOR_BYTE);
}

const fn encode_i64_sortable(value: i64) -> u64 {
    (value as u64) ^ SIGN_BIT
}

const fn decode_i64_sortable(sortable: u64) -> i64 {
    (sortable ^ SIGN_BIT) as i64
}

fn encode_f64_sortable(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits ^ SIGN_BIT
    }
}

fn decode_f64_sortable(sortable: u64) -> f64 {
    let bits = if sortable & SIGN_BIT != 0 {
        sortable ^ SIGN_BIT
    } else {
        !sortable
    };
    f64::from_bits(bits)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode ordered key bytes back into segments
pub fn decode_parts(mut bytes: &[u8]) -> Result<Vec<KeyPart>> {
    let mut parts = Vec::new();
    while !bytes.is_empty() {
        parts.push(decode_part(&mut bytes)?);
    }
    Ok(parts)
}

/// Decode one segment, advancing `buf` past it
fn decode_part(buf: &mut &[u8]) -> Result<KeyPart> {
    let (&tag, rest) = buf
        .split_first()
        .ok_or_else(|| TkvError::KeyDecode("unexpected end of key".to_string()))?;
    *buf = rest;

    match tag {
        TAG_BYTES => Ok(KeyPart::Bytes(take_terminated(buf)?)),
        TAG_STRING => {
            let raw = take_terminated(buf)?;
            let s = String::from_utf8(raw.to_vec())
                .map_err(|e| TkvError::KeyDecode(format!("invalid UTF-8 in string segment: {}", e)))?;
            Ok(KeyPart::String(s))
        }
        TAG_INT => Ok(KeyPart::Int(decode_i64_sortable(take_u64(buf)?))),
        TAG_FLOAT => Ok(KeyPart::Float(decode_f64_sortable(take_u64(buf)?))),
        TAG_FALSE => Ok(KeyPart::Bool(false)),
        TAG_TRUE => Ok(KeyPart::Bool(true)),
        _ => Err(TkvError::KeyDecode(format!("unknown segment tag: 0x{:02x}", tag))),
    }
}

fn take_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.len() < 8 {
        return Err(TkvError::KeyDecode(format!(
            "truncated numeric segment: expected 8 bytes, got {}",
            buf.len()
        )));
    }
    let (head, rest) = buf.split_at(8);
    *buf = rest;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(head);
    Ok(u64::from_be_bytes(raw))
}

fn take_terminated(buf: &mut &[u8]) -> Result<Bytes> {
    let mut result = BytesMut::new();
    let mut i = 0;

    while i < buf.len() {
        let byte = buf[i];

        if byte == TERMINATOR_BYTE {
            *buf = &buf[i + 1..];
            return Ok(result.freeze());
        }

        if byte == ESCAPE_BYTE {
            let next = *buf.get(i + 1).ok_or_else(|| {
                TkvError::KeyDecode("truncated escape sequence".to_string())
            })?;
            match next {
                0x01 => result.put_u8(TERMINATOR_BYTE),
                0x02 => result.put_u8(ESCAPE_BYTE),
                _ => {
                    return Err(TkvError::KeyDecode(format!(
                        "invalid escape sequence: 0x01 0x{:02x}",
                        next
                    )));
                }
            }
            i += 2;
        } else {
            result.put_u8(byte);
            i += 1;
        }
    }

    Err(TkvError::KeyDecode(
        "unterminated segment (missing 0x00 terminator)".to_string(),
    ))
}
