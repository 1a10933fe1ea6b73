//! The host engine seam.
//!
//! Parsing, compiling, serializing, linking, and evaluating modules all
//! belong to the engine. This crate only drives those primitives in the
//! right order and reconciles the cache header in between.

use indexmap::IndexMap;

use crate::errors::Result;

/// Resolution callback handed to [`Engine::link`]. Called once per import
/// specifier with the module that imports it.
pub type ResolveFn<'a, M> = dyn FnMut(&str, &M) -> Result<M> + 'a;

/// Evaluation callback of a synthetic module.
pub type SyntheticInit<V> = Box<dyn FnOnce(&mut dyn ExportSetter<V>) -> Result<()> + Send>;

/// Sink for the exports of a synthetic module during its evaluation.
pub trait ExportSetter<V> {
    /// Set a declared export. Setting an undeclared name is an engine-level
    /// error.
    fn set_export(&mut self, name: &str, value: V) -> Result<()>;
}

/// Export name -> value view of an evaluated module.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace<V> {
    exports: IndexMap<String, V>,
}

impl<V> Namespace<V> {
    pub fn new(exports: IndexMap<String, V>) -> Self {
        Self { exports }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.exports.get(name)
    }

    pub fn default_export(&self) -> Option<&V> {
        self.get("default")
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, V> {
        self.exports
    }
}

/// Primitives the loader needs from a host ECMAScript engine.
pub trait Engine: Send + Sync {
    /// Handle to an engine module record. Cheap to clone.
    type Module: Clone;
    /// Engine value (export values, conventional module exports).
    type Value: Clone + Send + 'static;
    /// Isolated global scope a module can be bound to.
    type Context: Clone;

    /// Host runtime version string, e.g. `v14.17.0`.
    fn version(&self) -> &str;

    /// Apply a process-wide engine flag string (`--no-lazy`).
    fn set_flags(&self, flags: &str);

    /// Compile `source` as a module and return its serialized cache.
    fn compile_module(&self, source: &str, context: Option<&Self::Context>) -> Result<Vec<u8>>;

    /// Create a source-text module. With `cached_data`, the engine is
    /// expected to reuse it instead of compiling `source` unless it rejects
    /// the cache, which is then reported by [`Engine::cached_data_rejected`].
    fn source_text_module(
        &self,
        source: &str,
        cached_data: Option<&[u8]>,
        context: Option<&Self::Context>,
    ) -> Result<Self::Module>;

    fn cached_data_rejected(&self, module: &Self::Module) -> bool;

    /// Create a module whose exports are populated by `init` at evaluation.
    fn synthetic_module(
        &self,
        export_names: Vec<String>,
        init: SyntheticInit<Self::Value>,
        context: Option<&Self::Context>,
    ) -> Result<Self::Module>;

    /// Context the module was created in, if any.
    fn module_context(&self, module: &Self::Module) -> Option<Self::Context>;

    /// Link `module` and its transitive imports, calling `resolve` for each
    /// unresolved specifier.
    fn link(&self, module: &Self::Module, resolve: &mut ResolveFn<'_, Self::Module>)
        -> Result<()>;

    /// Run the module body, including top-level asynchronous work, to
    /// completion.
    fn evaluate(&self, module: &Self::Module) -> Result<()>;

    fn namespace(&self, module: &Self::Module) -> Result<Namespace<Self::Value>>;
}
