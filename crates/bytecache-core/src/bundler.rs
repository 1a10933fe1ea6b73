use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::Result;

/// Output module format of a bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    /// ECMAScript module (`export` / `import` syntax)
    #[default]
    Es,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleOptions {
    #[serde(default)]
    pub format: BundleFormat,

    /// Minify the bundled output (default: true)
    #[serde(default = "default_true")]
    pub minify: bool,

    /// Drop bundler warnings instead of surfacing them (default: true)
    #[serde(default = "default_true")]
    pub silence_warnings: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            format: BundleFormat::Es,
            minify: true,
            silence_warnings: true,
        }
    }
}

/// External bundler/minifier: fuses a multi-file project into one
/// module source. Failures are reported as [`crate::LoaderError::Bundle`]
/// and passed through untouched.
pub trait Bundler: Send + Sync {
    fn bundle(&self, entry: &Path, options: &BundleOptions) -> Result<String>;
}
