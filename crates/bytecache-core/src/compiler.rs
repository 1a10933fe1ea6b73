use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bundler::{BundleOptions, Bundler};
use crate::engine::Engine;
use crate::errors::Result;
use crate::fs::FileSystem;

/// Produces bytecode blobs from module source through the engine.
pub struct Compiler<E: Engine> {
    engine: Arc<E>,
    file_system: Arc<dyn FileSystem>,
}

impl<E: Engine> Compiler<E> {
    pub fn new(engine: Arc<E>, file_system: Arc<dyn FileSystem>) -> Self {
        Self {
            engine,
            file_system,
        }
    }

    /// Compile module source text to a blob. Syntax errors come back as
    /// whatever the engine reports.
    pub fn compile_text(&self, code: &str) -> Result<Vec<u8>> {
        let blob = self.engine.compile_module(code, None)?;
        debug!(source_len = code.len(), blob_len = blob.len(), "compiled module");
        Ok(blob)
    }

    pub fn compile_file(&self, path: &Path) -> Result<Vec<u8>> {
        let code = self.file_system.read_to_string(path)?;
        info!("Compiling {}", path.display());
        self.compile_text(&code)
    }

    /// Compile `source` and persist the blob at `output`.
    pub fn compile_file_to(&self, source: &Path, output: &Path) -> Result<Vec<u8>> {
        let blob = self.compile_file(source)?;
        self.file_system.write_file(output, &blob)?;
        info!("Wrote {} ({} bytes)", output.display(), blob.len());
        Ok(blob)
    }

    /// Run the external bundler on `entry` and compile its single-file
    /// output.
    pub fn bundle_and_compile(
        &self,
        bundler: &dyn Bundler,
        entry: &Path,
        options: &BundleOptions,
    ) -> Result<Vec<u8>> {
        info!("Bundling {}", entry.display());
        let code = bundler.bundle(entry, options)?;
        self.compile_text(&code)
    }
}
