//! Adapter selection by identifier.
//!
//! Configuration names an adapter (`adapter = "image"`); the registry maps
//! that name to a constructor. The default registry carries the pure-Rust
//! adapter; embedders register their own backends alongside it.

use super::backend::ImageAdapter;
use super::rust_backend::{self, RustAdapter};
use std::collections::BTreeMap;
use thiserror::Error;

type Constructor = fn() -> Box<dyn ImageAdapter>;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown adapter '{name}' (registered: {})", .registered.join(", "))]
pub struct UnknownAdapter {
    pub name: String,
    pub registered: Vec<String>,
}

pub struct AdapterRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(rust_backend::IDENTITY, rust_adapter);
        registry
    }

    /// Register (or replace) the constructor for `name`.
    pub fn register(&mut self, name: &str, constructor: Constructor) {
        self.constructors.insert(name.to_string(), constructor);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn ImageAdapter>, UnknownAdapter> {
        self.constructors
            .get(name)
            .map(|construct| construct())
            .ok_or_else(|| UnknownAdapter {
                name: name.to_string(),
                registered: self.names().map(str::to_string).collect(),
            })
    }
}

fn rust_adapter() -> Box<dyn ImageAdapter> {
    Box::new(RustAdapter::new())
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockAdapter;

    #[test]
    fn defaults_include_image_adapter() {
        let registry = AdapterRegistry::with_defaults();
        let adapter = registry.create("image").unwrap();
        assert_eq!(adapter.identity(), "image");
    }

    #[test]
    fn unknown_adapter_lists_registered_names() {
        let registry = AdapterRegistry::with_defaults();
        let err = registry.create("sharp").err().unwrap();
        assert_eq!(err.name, "sharp");
        assert_eq!(err.registered, vec!["image".to_string()]);
        assert_eq!(
            err.to_string(),
            "unknown adapter 'sharp' (registered: image)"
        );
    }

    #[test]
    fn register_injects_alternative() {
        let mut registry = AdapterRegistry::with_defaults();
        fn mock() -> Box<dyn ImageAdapter> {
            Box::new(MockAdapter::with_dimensions(10, 10))
        }
        registry.register("mock", mock);

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["image", "mock"]);
        assert_eq!(registry.create("mock").unwrap().identity(), "mock");
    }
}
