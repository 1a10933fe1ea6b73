//! Blob -> live module pipeline.
//!
//! Each run is linear and stops at the first failure:
//! read -> patch header -> build placeholder -> instantiate -> check cache
//! acceptance -> link -> evaluate. Runs share nothing; loading the same blob
//! twice yields two independent module instances.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::compiler::Compiler;
use crate::config::LoaderConfig;
use crate::engine::{Engine, Namespace};
use crate::errors::{LoaderError, Result};
use crate::fs::FileSystem;
use crate::header::{placeholder_for, EngineVersion, PatchTable};
use crate::linker::{BlobRunner, Linker};
use crate::resolver::ConventionalResolver;

/// Where a blob comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl From<Vec<u8>> for BlobSource {
    fn from(bytes: Vec<u8>) -> Self {
        BlobSource::Bytes(bytes)
    }
}

impl From<PathBuf> for BlobSource {
    fn from(path: PathBuf) -> Self {
        BlobSource::Path(path)
    }
}

impl From<&Path> for BlobSource {
    fn from(path: &Path) -> Self {
        BlobSource::Path(path.to_path_buf())
    }
}

pub struct Loader<E: Engine> {
    engine: Arc<E>,
    compiler: Compiler<E>,
    file_system: Arc<dyn FileSystem>,
    resolver: Arc<dyn ConventionalResolver<E::Value>>,
    config: Arc<LoaderConfig>,
    patch_table: PatchTable,
}

impl<E: Engine> Loader<E> {
    pub fn new(
        engine: Arc<E>,
        file_system: Arc<dyn FileSystem>,
        resolver: Arc<dyn ConventionalResolver<E::Value>>,
        config: Arc<LoaderConfig>,
    ) -> Self {
        let compiler = Compiler::new(engine.clone(), file_system.clone());
        let patch_table = config.patch_table();
        Self {
            engine,
            compiler,
            file_system,
            resolver,
            config,
            patch_table,
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Overwrite the version-dependent header fields of `blob` with those of
    /// a blob freshly compiled by this engine. Returns the recipe name, or
    /// `None` when the table has no recipe for the running version.
    pub fn patch(&self, blob: &mut [u8]) -> Result<Option<String>> {
        let version = EngineVersion::parse(self.engine.version())?;
        let reference = self.compiler.compile_text(&self.config.reference_source)?;
        let recipe = self.patch_table.patch(blob, &reference, &version);
        if recipe.is_none() {
            warn!(version = %version, "no header patch recipe for engine version");
        }
        Ok(recipe.map(|r| r.name.clone()))
    }

    /// Load, link, and evaluate a blob, optionally inside `context`.
    pub fn run(&self, source: BlobSource, context: Option<&E::Context>) -> Result<E::Module> {
        self.run_nested(source, context, &[])
    }

    /// [`Loader::run`] for a blob imported while `importers` are loading.
    fn run_nested(
        &self,
        source: BlobSource,
        context: Option<&E::Context>,
        importers: &[PathBuf],
    ) -> Result<E::Module> {
        match source {
            BlobSource::Bytes(bytes) => self.run_bytes("<bytes>", bytes, context, importers),
            BlobSource::Path(path) => {
                if importers.contains(&path) {
                    let chain: Vec<String> = importers
                        .iter()
                        .chain(std::iter::once(&path))
                        .map(|p| p.display().to_string())
                        .collect();
                    return Err(LoaderError::Link(format!(
                        "bytecode import cycle: {}",
                        chain.join(" -> ")
                    )));
                }
                let bytes = self.file_system.read_file(&path)?;
                let origin = path.display().to_string();
                let mut chain = importers.to_vec();
                chain.push(path);
                self.run_bytes(&origin, bytes, context, &chain)
            }
        }
    }

    fn run_bytes(
        &self,
        origin: &str,
        mut blob: Vec<u8>,
        context: Option<&E::Context>,
        importers: &[PathBuf],
    ) -> Result<E::Module> {
        self.patch(&mut blob)?;

        let placeholder = placeholder_for(&blob)?;
        debug!(
            origin,
            placeholder_len = placeholder.chars().count(),
            "built placeholder source"
        );

        let module = self
            .engine
            .source_text_module(&placeholder, Some(&blob), context)?;

        // A rejected cache means the engine compiled the placeholder instead,
        // which is not the program.
        if self.engine.cached_data_rejected(&module) {
            warn!(origin, "engine rejected cached data");
            return Err(LoaderError::CacheRejected {
                origin: origin.to_string(),
            });
        }
        debug!(origin, "instantiated from cached data");

        let linker = Linker::new(
            self.engine.as_ref(),
            self,
            self.resolver.as_ref(),
            &self.config.bytecode_extension,
            importers,
        );
        self.engine
            .link(&module, &mut |specifier: &str, referrer: &E::Module| {
                linker.resolve(specifier, referrer)
            })?;
        debug!(origin, "linked");

        self.engine.evaluate(&module)?;
        debug!(origin, "evaluated");

        Ok(module)
    }

    /// [`Loader::run`], then the module's export namespace.
    pub fn run_namespace(
        &self,
        source: BlobSource,
        context: Option<&E::Context>,
    ) -> Result<Namespace<E::Value>> {
        let module = self.run(source, context)?;
        self.engine.namespace(&module)
    }

    /// Load the blob at `path` and return its default export.
    pub fn instantiate(&self, path: &Path) -> Result<Option<E::Value>> {
        let namespace = self.run_namespace(path.into(), None)?;
        Ok(namespace.default_export().cloned())
    }
}

impl<E: Engine> BlobRunner<E> for Loader<E> {
    fn run_specifier(
        &self,
        specifier: &str,
        context: Option<&E::Context>,
        importers: &[PathBuf],
    ) -> Result<E::Module> {
        let path = self.config.resolve_blob_path(specifier);
        self.run_nested(BlobSource::Path(path), context, importers)
    }
}
