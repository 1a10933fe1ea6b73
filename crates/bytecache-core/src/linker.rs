use std::path::PathBuf;
use tracing::debug;

use crate::engine::{Engine, SyntheticInit};
use crate::errors::Result;
use crate::resolver::ConventionalResolver;

/// Loads a bytecode dependency by specifier. Implemented by the loader and
/// handed to the linker, which is how the two recurse into each other.
///
/// Each call starts its own link pass. `importers` is the chain of blob
/// paths currently being loaded above this import; a specifier that resolves
/// back into that chain is an import cycle and must fail rather than recurse.
pub trait BlobRunner<E: Engine> {
    fn run_specifier(
        &self,
        specifier: &str,
        context: Option<&E::Context>,
        importers: &[PathBuf],
    ) -> Result<E::Module>;
}

/// Resolution callback for one link pass.
///
/// Bytecode specifiers are loaded (patched, linked, and evaluated) through
/// the [`BlobRunner`]; anything else is obtained from the conventional
/// resolver and wrapped in a synthetic module. Deduplicating repeated
/// specifiers within a pass is the engine's job.
pub struct Linker<'a, E: Engine> {
    engine: &'a E,
    runner: &'a dyn BlobRunner<E>,
    resolver: &'a dyn ConventionalResolver<E::Value>,
    bytecode_extension: &'a str,
    importers: &'a [PathBuf],
}

impl<'a, E: Engine> Linker<'a, E> {
    pub fn new(
        engine: &'a E,
        runner: &'a dyn BlobRunner<E>,
        resolver: &'a dyn ConventionalResolver<E::Value>,
        bytecode_extension: &'a str,
        importers: &'a [PathBuf],
    ) -> Self {
        Self {
            engine,
            runner,
            resolver,
            bytecode_extension,
            importers,
        }
    }

    pub fn is_bytecode(&self, specifier: &str) -> bool {
        specifier.ends_with(self.bytecode_extension)
    }

    /// Resolve `specifier` as imported by `referrer`. Resolution failures
    /// are returned as-is.
    ///
    /// A conventional module's `default` export is always its whole exports
    /// object, even when the object has an own `default` key; that key is
    /// not re-exported over it.
    pub fn resolve(&self, specifier: &str, referrer: &E::Module) -> Result<E::Module> {
        let context = self.engine.module_context(referrer);

        if self.is_bytecode(specifier) {
            debug!(specifier, "linking bytecode dependency");
            return self
                .runner
                .run_specifier(specifier, context.as_ref(), self.importers);
        }

        let exports = self.resolver.require(specifier)?;
        let export_names = exports.export_names();
        debug!(specifier, exports = export_names.len(), "wrapping conventional dependency");

        let init: SyntheticInit<E::Value> = Box::new(move |setter| {
            setter.set_export("default", exports.value)?;
            for (name, value) in exports.named {
                if name != "default" {
                    setter.set_export(&name, value)?;
                }
            }
            Ok(())
        });

        self.engine
            .synthetic_module(export_names, init, context.as_ref())
    }
}
