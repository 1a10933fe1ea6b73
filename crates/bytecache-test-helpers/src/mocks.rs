//! Mock implementations for testing

use bytecache_core::bundler::{BundleOptions, Bundler};
use bytecache_core::resolver::{ConventionalExports, ConventionalResolver};
use bytecache_core::{LoaderError, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Conventional module registry keyed by specifier.
///
/// A registered JSON object exposes its own keys as named exports; any other
/// value exposes only `default`.
#[derive(Debug, Default)]
pub struct MockResolver {
    modules: IndexMap<String, Value>,
    requests: Mutex<Vec<String>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, specifier: impl Into<String>, exports: Value) -> Self {
        self.modules.insert(specifier.into(), exports);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Specifiers requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ConventionalResolver<Value> for MockResolver {
    fn require(&self, specifier: &str) -> Result<ConventionalExports<Value>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(specifier.to_string());

        let value = self.modules.get(specifier).cloned().ok_or_else(|| {
            LoaderError::resolution(specifier, format!("Cannot find module '{}'", specifier))
        })?;

        let named = match &value {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => IndexMap::new(),
        };
        Ok(ConventionalExports::new(value, named))
    }
}

/// Bundler returning canned output and recording its invocations.
#[derive(Debug)]
pub struct MockBundler {
    output: std::result::Result<String, String>,
    calls: Mutex<Vec<(PathBuf, BundleOptions)>>,
}

impl MockBundler {
    pub fn returning(code: impl Into<String>) -> Self {
        Self {
            output: Ok(code.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            output: Err(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, BundleOptions)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Bundler for MockBundler {
    fn bundle(&self, entry: &Path, options: &BundleOptions) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((entry.to_path_buf(), options.clone()));
        self.output.clone().map_err(LoaderError::Bundle)
    }
}
