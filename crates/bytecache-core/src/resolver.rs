use indexmap::IndexMap;

use crate::errors::Result;

/// Exports of a dependency loaded through the host's conventional
/// (non-bytecode) module system.
#[derive(Debug, Clone, PartialEq)]
pub struct ConventionalExports<V> {
    /// The whole exports object; becomes the `default` export.
    pub value: V,
    /// Own enumerable keys of the exports object, in enumeration order.
    pub named: IndexMap<String, V>,
}

impl<V> ConventionalExports<V> {
    pub fn new(value: V, named: IndexMap<String, V>) -> Self {
        Self { value, named }
    }

    /// `default` followed by every named key. A named key literally called
    /// `default` is not repeated.
    pub fn export_names(&self) -> Vec<String> {
        std::iter::once("default".to_string())
            .chain(
                self.named
                    .keys()
                    .filter(|k| k.as_str() != "default")
                    .cloned(),
            )
            .collect()
    }
}

/// Resolves a non-bytecode specifier through the host module system
/// (`require`-style). Unresolvable specifiers fail with
/// [`crate::LoaderError::Resolution`].
pub trait ConventionalResolver<V>: Send + Sync {
    fn require(&self, specifier: &str) -> Result<ConventionalExports<V>>;
}
