//! Serialized cache layout of the mock engine.
//!
//! ```text
//! [0, 4)   magic
//! [4, 8)   payload checksum (blake3, first 4 bytes)
//! [8, 12)  source length in UTF-16 units | module flag
//! [12, 24) three build-fingerprint words
//! [24, ..) bincode-encoded script
//! ```

use bytecache_core::header::{HEADER_LEN, MODULE_FLAG};

use super::script::Script;

pub const MAGIC: u32 = 0xC0DE_0A5E;

/// Why a cache was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Truncated,
    BadMagic,
    SourceMismatch { recorded: u32, supplied: u32 },
    Fingerprint { offset: usize },
    Checksum,
    Payload,
}

fn word(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub fn checksum(payload: &[u8]) -> u32 {
    let hash = blake3::hash(payload);
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn source_field(source: &str) -> u32 {
    (source.encode_utf16().count() as u32 & !MODULE_FLAG) | MODULE_FLAG
}

pub fn encode(script: &Script, source: &str, fingerprint: &[u32; 3]) -> Result<Vec<u8>, String> {
    let payload = bincode::serialize(script).map_err(|e| e.to_string())?;

    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.extend_from_slice(&MAGIC.to_le_bytes());
    blob.extend_from_slice(&checksum(&payload).to_le_bytes());
    blob.extend_from_slice(&source_field(source).to_le_bytes());
    for w in fingerprint {
        blob.extend_from_slice(&w.to_le_bytes());
    }
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Accept `blob` for `source` if its header matches, checking only the
/// fingerprint words that start at `checked_offsets`.
pub fn decode(
    blob: &[u8],
    source: &str,
    fingerprint: &[u32; 3],
    checked_offsets: &[usize],
) -> Result<Script, Rejection> {
    if blob.len() < HEADER_LEN {
        return Err(Rejection::Truncated);
    }
    if word(blob, 0) != MAGIC {
        return Err(Rejection::BadMagic);
    }

    let recorded = word(blob, 8);
    let supplied = source_field(source);
    if recorded != supplied {
        return Err(Rejection::SourceMismatch { recorded, supplied });
    }

    for &offset in checked_offsets {
        let slot = (offset - 12) / 4;
        if word(blob, offset) != fingerprint[slot] {
            return Err(Rejection::Fingerprint { offset });
        }
    }

    let payload = &blob[HEADER_LEN..];
    if word(blob, 4) != checksum(payload) {
        return Err(Rejection::Checksum);
    }

    bincode::deserialize(payload).map_err(|_| Rejection::Payload)
}
