//! Bytecode-caching loader for ECMAScript modules.
//!
//! Compiles module source into the host engine's serialized cache, and later
//! turns that cache back into a live, linked, evaluated module without the
//! original source, by patching the blob header and handing the engine a
//! placeholder source of the recorded length.

pub mod bundler;
pub mod compiler;
pub mod config;
pub mod di;
pub mod engine;
pub mod errors;
pub mod flags;
pub mod fs;
pub mod header;
pub mod linker;
pub mod loader;
pub mod resolver;

pub use bundler::{BundleFormat, BundleOptions, Bundler};
pub use compiler::Compiler;
pub use config::{CliOverrides, LoaderConfig};
pub use di::Container;
pub use engine::{Engine, ExportSetter, Namespace, ResolveFn, SyntheticInit};
pub use errors::{LoaderError, Result};
pub use flags::{initialize_engine_flags, FlagReport};
pub use header::{EngineVersion, HeaderSummary, PatchRecipe, PatchTable};
pub use linker::{BlobRunner, Linker};
pub use loader::{BlobSource, Loader};
pub use resolver::{ConventionalExports, ConventionalResolver};
