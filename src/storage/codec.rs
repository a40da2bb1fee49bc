//! Payload codec
//!
//! Encoding and decoding of structural file contents.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, TreeError};
use crate::value::Map;

/// Magic bytes identifying a shardtree structural file
pub const MAGIC: &[u8; 4] = b"STRE";

/// Current payload format version
pub const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + CRC32 (4) = 10 bytes
pub const HEADER_SIZE: usize = 10;

/// Encode a map into a framed, checksummed buffer
pub fn encode(map: &Map) -> Result<Bytes> {
    let body = bincode::serialize(map)?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u32_le(crc32fast::hash(&body));
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Decode a framed buffer; `file` is only used in error messages
pub fn decode(file: &str, bytes: &[u8]) -> Result<Map> {
    let corrupt = |reason: String| TreeError::Corrupt {
        file: file.to_string(),
        reason,
    };

    if bytes.len() < HEADER_SIZE {
        return Err(corrupt(format!(
            "truncated header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }
    if bytes[0..4] != MAGIC[..] {
        return Err(corrupt("bad magic".to_string()));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(corrupt(format!("unsupported version {}", version)));
    }

    let expected = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let body = &bytes[HEADER_SIZE..];
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(corrupt(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            expected, actual
        )));
    }

    bincode::deserialize(body).map_err(|e| corrupt(e.to_string()))
}

/// Serialized body size, used as the cache footprint
pub(crate) fn body_size(map: &Map) -> usize {
    bincode::serialized_size(map).map_or(0, |n| n as usize)
}
