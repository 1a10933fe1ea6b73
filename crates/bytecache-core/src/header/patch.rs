use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EngineVersion;

/// Half-open byte range `[start, end)` inside the blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Engine versions a recipe applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VersionPredicate {
    /// Exact `major.minor`.
    MajorMinor { major: u32, minor: u32 },
    /// Inclusive range of major versions.
    MajorRange { min: u32, max: u32 },
    /// Always matches; used for the fallback recipe.
    Any,
}

impl VersionPredicate {
    pub fn matches(&self, version: &EngineVersion) -> bool {
        match self {
            VersionPredicate::MajorMinor { major, minor } => {
                version.major == *major && version.minor == *minor
            }
            VersionPredicate::MajorRange { min, max } => (*min..=*max).contains(&version.major),
            VersionPredicate::Any => true,
        }
    }
}

/// Header ranges to copy from a known-good reference blob, for the engine
/// versions matched by any of `when`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecipe {
    pub name: String,
    pub when: Vec<VersionPredicate>,
    pub ranges: Vec<ByteRange>,
}

impl PatchRecipe {
    pub fn matches(&self, version: &EngineVersion) -> bool {
        self.when.iter().any(|p| p.matches(version))
    }

    /// Copy each range from `reference` onto `blob` at the same offset.
    ///
    /// Ranges are clipped to the bytes both buffers actually hold, so a
    /// short blob is patched as far as it goes rather than rejected here;
    /// the engine will refuse it at instantiation.
    pub fn apply(&self, blob: &mut [u8], reference: &[u8]) {
        for range in &self.ranges {
            let end = range.end.min(blob.len()).min(reference.len());
            if range.start >= end {
                continue;
            }
            blob[range.start..end].copy_from_slice(&reference[range.start..end]);
        }
    }
}

/// Ordered version -> recipe table. The first matching recipe wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchTable {
    recipes: Vec<PatchRecipe>,
}

impl Default for PatchTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatchTable {
    pub fn new(recipes: Vec<PatchRecipe>) -> Self {
        Self { recipes }
    }

    /// Ranges known to carry per-build fingerprints for each runtime line.
    /// Empirical: revalidate against the target engine's header layout
    /// before adding new lines.
    pub fn builtin() -> Self {
        Self::new(vec![
            PatchRecipe {
                name: "legacy".to_string(),
                when: vec![
                    VersionPredicate::MajorMinor { major: 8, minor: 8 },
                    VersionPredicate::MajorMinor { major: 8, minor: 9 },
                ],
                ranges: vec![ByteRange::new(16, 20), ByteRange::new(20, 24)],
            },
            PatchRecipe {
                name: "single-range".to_string(),
                when: vec![VersionPredicate::MajorRange { min: 12, max: 16 }],
                ranges: vec![ByteRange::new(12, 16)],
            },
            PatchRecipe {
                name: "default".to_string(),
                when: vec![VersionPredicate::Any],
                ranges: vec![ByteRange::new(12, 16), ByteRange::new(16, 20)],
            },
        ])
    }

    pub fn recipes(&self) -> &[PatchRecipe] {
        &self.recipes
    }

    pub fn select(&self, version: &EngineVersion) -> Option<&PatchRecipe> {
        self.recipes.iter().find(|r| r.matches(version))
    }

    /// Patch `blob` in place from `reference` using the recipe selected for
    /// `version`. Returns the recipe applied, or `None` if no recipe
    /// matched (only possible with a custom table lacking a fallback).
    pub fn patch(
        &self,
        blob: &mut [u8],
        reference: &[u8],
        version: &EngineVersion,
    ) -> Option<&PatchRecipe> {
        let recipe = self.select(version)?;
        recipe.apply(blob, reference);
        debug!(
            recipe = %recipe.name,
            version = %version,
            "patched blob header"
        );
        Some(recipe)
    }
}
