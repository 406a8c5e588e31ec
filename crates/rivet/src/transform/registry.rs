use super::{OxcTransform, Transform};
use crate::types::RivetError;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Name of the implementation used when none is configured
pub const DEFAULT_IMPLEMENTATION: &str = "oxc";

/// Registry of transform implementations mapped by name
pub struct TransformRegistry {
    transforms: FxHashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self { transforms: FxHashMap::default() }
    }

    /// Create a registry with the built-in implementations
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OxcTransform::new()));
        registry
    }

    /// Register an implementation under its own name, replacing any previous one
    pub fn register(&mut self, transform: Arc<dyn Transform>) {
        self.transforms.insert(transform.name().to_string(), transform);
    }

    /// Get implementation by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Transform>> {
        self.transforms.get(name)
    }

    /// Look up the configured implementation, or the default one.
    /// Unknown names fail here, before any build work starts.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn Transform>, RivetError> {
        let name = name.unwrap_or(DEFAULT_IMPLEMENTATION);
        self.get(name).cloned().ok_or_else(|| RivetError::UnknownImplementation {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    /// Get all registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{TransformError, TransformOptions, TransformResult};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Transform for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn transform(
            &self,
            source: &str,
            _options: &TransformOptions,
        ) -> Result<TransformResult, TransformError> {
            Ok(TransformResult { code: source.to_string(), ..Default::default() })
        }
    }

    #[test]
    fn test_builtins_include_oxc() {
        let registry = TransformRegistry::with_builtins();
        assert_eq!(registry.names(), ["oxc"]);
        assert_eq!(registry.resolve(None).unwrap().name(), "oxc");
    }

    #[test]
    fn test_register_custom_implementation() {
        let mut registry = TransformRegistry::with_builtins();
        registry.register(Arc::new(Echo));
        assert_eq!(registry.names(), ["echo", "oxc"]);
        assert_eq!(registry.resolve(Some("echo")).unwrap().name(), "echo");
    }

    #[test]
    fn test_unknown_implementation_fails_fast() {
        let registry = TransformRegistry::with_builtins();
        match registry.resolve(Some("swc")) {
            Err(RivetError::UnknownImplementation { name, available }) => {
                assert_eq!(name, "swc");
                assert_eq!(available, "oxc");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
