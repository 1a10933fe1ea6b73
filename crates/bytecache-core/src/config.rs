use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bundler::BundleOptions;
use crate::errors::LoaderError;
use crate::header::{PatchRecipe, PatchTable};

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Import specifiers ending with this suffix are loaded as bytecode
    /// blobs (default: `.jsc`)
    #[serde(default = "default_bytecode_extension")]
    pub bytecode_extension: String,

    /// Lowest runtime major version that gets `--no-flush-bytecode`
    /// (default: 12)
    #[serde(default = "default_flush_min_major")]
    pub flush_bytecode_min_major: u32,

    /// Trivial source compiled to obtain a known-good header
    #[serde(default = "default_reference_source")]
    pub reference_source: String,

    /// Replaces the built-in version -> header range table
    #[serde(default)]
    pub patch_recipes: Option<Vec<PatchRecipe>>,

    /// Base directory for relative bytecode specifiers
    #[serde(default)]
    pub root_dir: Option<String>,

    #[serde(default)]
    pub bundle: BundleOptions,
}

fn default_bytecode_extension() -> String {
    ".jsc".to_string()
}

fn default_flush_min_major() -> u32 {
    12
}

fn default_reference_source() -> String {
    "\"ಠ_ಠ\"".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            bytecode_extension: default_bytecode_extension(),
            flush_bytecode_min_major: default_flush_min_major(),
            reference_source: default_reference_source(),
            patch_recipes: None,
            root_dir: None,
            bundle: BundleOptions::default(),
        }
    }
}

/// Overrides supplied on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bytecode_extension: Option<String>,
    pub flush_bytecode_min_major: Option<u32>,
    pub root_dir: Option<String>,
    pub minify: Option<bool>,
}

impl LoaderConfig {
    /// Load configuration from a JSON or YAML file (by extension)
    pub fn from_file(path: &Path) -> Result<Self, LoaderError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str_for(path, &content)
    }

    fn from_str_for(path: &Path, content: &str) -> Result<Self, LoaderError> {
        if is_yaml(path) {
            serde_yaml::from_str(content).map_err(|e| LoaderError::Config(e.to_string()))
        } else {
            serde_json::from_str(content).map_err(|e| LoaderError::Config(e.to_string()))
        }
    }

    /// Write the default configuration to `path`
    pub fn init_file(path: &Path) -> Result<(), LoaderError> {
        let config = LoaderConfig::default();
        let text = if is_yaml(path) {
            serde_yaml::to_string(&config).map_err(|e| LoaderError::Config(e.to_string()))?
        } else {
            serde_json::to_string_pretty(&config)
                .map_err(|e| LoaderError::Config(e.to_string()))?
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn merge(&mut self, overrides: &CliOverrides) {
        if let Some(ext) = &overrides.bytecode_extension {
            self.bytecode_extension = ext.clone();
        }
        if let Some(major) = overrides.flush_bytecode_min_major {
            self.flush_bytecode_min_major = major;
        }
        if let Some(root) = &overrides.root_dir {
            self.root_dir = Some(root.clone());
        }
        if let Some(minify) = overrides.minify {
            self.bundle.minify = minify;
        }
    }

    /// The effective patch table: configured recipes, or the built-in one.
    pub fn patch_table(&self) -> PatchTable {
        match &self.patch_recipes {
            Some(recipes) => PatchTable::new(recipes.clone()),
            None => PatchTable::builtin(),
        }
    }

    /// Resolve a bytecode specifier against `root_dir`, if configured.
    pub fn resolve_blob_path(&self, specifier: &str) -> PathBuf {
        let path = Path::new(specifier);
        match &self.root_dir {
            Some(root) if path.is_relative() => Path::new(root).join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
