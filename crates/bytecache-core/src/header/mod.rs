//! Engine-defined blob header: the few fields the loader understands.
//!
//! Everything past [`HEADER_LEN`] is opaque engine bytecode.

mod patch;
mod source_hash;
mod version;

pub use patch::{ByteRange, PatchRecipe, PatchTable, VersionPredicate};
pub use source_hash::{
    is_module, placeholder_for, read_source_length, synthesize_placeholder, FILLER,
    MAX_SOURCE_LENGTH, MODULE_FLAG, PLACEHOLDER_OVERHEAD, SOURCE_HASH_OFFSET,
};
pub use version::EngineVersion;

use serde::Serialize;

use crate::errors::Result;

/// Size of the fixed header region the patch table addresses.
pub const HEADER_LEN: usize = 24;

/// Decoded view of a blob header, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderSummary {
    pub blob_len: usize,
    pub source_length: u32,
    pub is_module: bool,
    /// Little-endian 32-bit words of the header, `HEADER_LEN / 4` of them
    /// when the blob is long enough.
    pub words: Vec<u32>,
}

impl HeaderSummary {
    pub fn read(blob: &[u8]) -> Result<Self> {
        let source_length = read_source_length(blob)?;
        let is_module = is_module(blob)?;
        let words = blob[..HEADER_LEN.min(blob.len())]
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();

        Ok(Self {
            blob_len: blob.len(),
            source_length,
            is_module,
            words,
        })
    }

    pub fn placeholder_len(&self) -> u32 {
        if self.source_length > 1 {
            self.source_length
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_words() {
        let mut blob = vec![0u8; 40];
        blob[0..4].copy_from_slice(&0xC0DE_0001u32.to_le_bytes());
        blob[8..12].copy_from_slice(&(21 | MODULE_FLAG).to_le_bytes());

        let summary = HeaderSummary::read(&blob).unwrap();
        assert_eq!(summary.words.len(), 6);
        assert_eq!(summary.words[0], 0xC0DE_0001);
        assert_eq!(summary.source_length, 21);
        assert!(summary.is_module);
        assert_eq!(summary.placeholder_len(), 21);
    }

    #[test]
    fn test_summary_of_short_blob() {
        let summary = HeaderSummary::read(&[0u8; 14]).unwrap();
        assert_eq!(summary.words.len(), 3);
        assert_eq!(summary.placeholder_len(), 0);
    }
}
