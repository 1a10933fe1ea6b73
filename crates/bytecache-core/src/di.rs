use std::path::Path;
use std::sync::Arc;

use crate::bundler::Bundler;
use crate::compiler::Compiler;
use crate::config::LoaderConfig;
use crate::engine::{Engine, Namespace};
use crate::errors::{LoaderError, Result};
use crate::flags::{initialize_engine_flags, FlagReport};
use crate::fs::{FileSystem, RealFileSystem};
use crate::loader::{BlobSource, Loader};
use crate::resolver::ConventionalResolver;

/// Dependency injection container
/// Wires the engine and its collaborators into a compiler and a loader
pub struct Container<E: Engine> {
    config: Arc<LoaderConfig>,
    engine: Arc<E>,
    file_system: Arc<dyn FileSystem>,
    bundler: Option<Arc<dyn Bundler>>,
    compiler: Compiler<E>,
    loader: Loader<E>,
}

impl<E: Engine> Container<E> {
    /// Create a new container with production dependencies
    pub fn new(
        config: LoaderConfig,
        engine: Arc<E>,
        resolver: Arc<dyn ConventionalResolver<E::Value>>,
    ) -> Self {
        Self::with_dependencies(config, engine, resolver, Arc::new(RealFileSystem::new()))
    }

    /// Create a container with custom dependencies (for testing)
    pub fn with_dependencies(
        config: LoaderConfig,
        engine: Arc<E>,
        resolver: Arc<dyn ConventionalResolver<E::Value>>,
        file_system: Arc<dyn FileSystem>,
    ) -> Self {
        let config = Arc::new(config);
        let compiler = Compiler::new(engine.clone(), file_system.clone());
        let loader = Loader::new(
            engine.clone(),
            file_system.clone(),
            resolver,
            config.clone(),
        );

        Container {
            config,
            engine,
            file_system,
            bundler: None,
            compiler,
            loader,
        }
    }

    pub fn with_bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    /// Apply the process-wide eager-compilation flags. Safe to call again.
    pub fn initialize(&self) -> Result<FlagReport> {
        initialize_engine_flags(self.engine.as_ref(), &self.config)
    }

    pub fn config(&self) -> &Arc<LoaderConfig> {
        &self.config
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    pub fn compiler(&self) -> &Compiler<E> {
        &self.compiler
    }

    pub fn loader(&self) -> &Loader<E> {
        &self.loader
    }

    pub fn compile_text(&self, code: &str) -> Result<Vec<u8>> {
        self.compiler.compile_text(code)
    }

    pub fn compile_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.compiler.compile_file(path)
    }

    pub fn compile_file_to(&self, source: &Path, output: &Path) -> Result<Vec<u8>> {
        self.compiler.compile_file_to(source, output)
    }

    pub fn bundle_and_compile(&self, entry: &Path) -> Result<Vec<u8>> {
        let bundler = self
            .bundler
            .as_ref()
            .ok_or_else(|| LoaderError::Bundle("no bundler configured".to_string()))?;
        self.compiler
            .bundle_and_compile(bundler.as_ref(), entry, &self.config.bundle)
    }

    pub fn run_from_blob(
        &self,
        source: impl Into<BlobSource>,
        context: Option<&E::Context>,
    ) -> Result<E::Module> {
        self.loader.run(source.into(), context)
    }

    pub fn run_namespace(
        &self,
        source: impl Into<BlobSource>,
        context: Option<&E::Context>,
    ) -> Result<Namespace<E::Value>> {
        self.loader.run_namespace(source.into(), context)
    }

    pub fn instantiate(&self, path: &Path) -> Result<Option<E::Value>> {
        self.loader.instantiate(path)
    }
}
