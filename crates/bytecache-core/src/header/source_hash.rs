//! Source-length field of the blob header and the placeholder source
//! derived from it.
//!
//! The engine records `source_length | (is_module << 31)` at bytes 8..12
//! when it serializes a module. On reload it recomputes that value from the
//! source text it is handed and rejects the cache on mismatch, so the loader
//! feeds it a filler string of the recorded length instead of the original
//! source.

use crate::errors::{LoaderError, Result};

/// Byte offset of the little-endian source-length field.
pub const SOURCE_HASH_OFFSET: usize = 8;

/// Bit 31 of the source-length field marks the blob as an ES module.
pub const MODULE_FLAG: u32 = 1 << 31;

/// Zero-width space: one UTF-16 code unit, invisible if ever printed.
pub const FILLER: char = '\u{200b}';

/// Quote characters wrapped around the filler.
pub const PLACEHOLDER_OVERHEAD: u32 = 2;

/// Longest source an engine string can hold (V8: `2^29 - 24` UTF-16 units).
/// A larger recorded length means the header is corrupted.
pub const MAX_SOURCE_LENGTH: u32 = (1 << 29) - 24;

fn raw_field(blob: &[u8]) -> Result<u32> {
    let end = SOURCE_HASH_OFFSET + 4;
    let bytes = blob
        .get(SOURCE_HASH_OFFSET..end)
        .ok_or(LoaderError::TruncatedHeader {
            len: blob.len(),
            needed: end,
        })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decode the recorded source length, with the module flag masked off.
pub fn read_source_length(blob: &[u8]) -> Result<u32> {
    Ok(raw_field(blob)? & !MODULE_FLAG)
}

/// Whether the engine marked this blob as compiled from module source.
pub fn is_module(blob: &[u8]) -> Result<bool> {
    Ok(raw_field(blob)? & MODULE_FLAG != 0)
}

/// Build a placeholder of exactly `length` UTF-16 code units: a quoted run
/// of [`FILLER`]. Lengths of 0 or 1 cannot hold the quotes and yield `""`
/// (the empty string, not a pair of quotes). Lengths above
/// [`MAX_SOURCE_LENGTH`] fail without allocating.
pub fn synthesize_placeholder(length: u32) -> Result<String> {
    if length > MAX_SOURCE_LENGTH {
        return Err(LoaderError::SourceTooLong {
            length,
            max: MAX_SOURCE_LENGTH,
        });
    }
    if length <= 1 {
        return Ok(String::new());
    }

    let fill = (length - PLACEHOLDER_OVERHEAD) as usize;
    let mut out = String::with_capacity(fill * FILLER.len_utf8() + 2);
    out.push('"');
    out.extend(std::iter::repeat(FILLER).take(fill));
    out.push('"');
    Ok(out)
}

/// Read the length field and synthesize the matching placeholder.
pub fn placeholder_for(blob: &[u8]) -> Result<String> {
    synthesize_placeholder(read_source_length(blob)?)
}
