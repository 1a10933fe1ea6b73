//! Test utilities and fixtures for bytecache
//!
//! Provides a reference engine plus mocks for the conventional resolver
//! and the bundler, shared by the integration tests of every crate.

pub mod engine;
pub mod fixtures;
pub mod mocks;

use bytecache_core::fs::MockFileSystem;
use bytecache_core::{Container, LoaderConfig};
use std::sync::Arc;

pub use engine::{MockContext, MockEngine, MockModule, ModuleStatus};
pub use mocks::{MockBundler, MockResolver};

/// Container over a mock engine of `version`, an in-memory file system,
/// and `resolver`.
pub fn create_test_container(
    version: &str,
    resolver: MockResolver,
) -> (Container<MockEngine>, Arc<MockFileSystem>) {
    create_test_container_with(LoaderConfig::default(), Arc::new(MockEngine::new(version)), resolver)
}

pub fn create_test_container_with(
    config: LoaderConfig,
    engine: Arc<MockEngine>,
    resolver: MockResolver,
) -> (Container<MockEngine>, Arc<MockFileSystem>) {
    let fs = Arc::new(MockFileSystem::new());
    let container = Container::with_dependencies(config, engine, resolver.into_arc(), fs.clone());
    (container, fs)
}
