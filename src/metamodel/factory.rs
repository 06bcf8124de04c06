//! Entity instantiation
//!
//! A [`FactoryRegistry`] maps entity names to [`ObjectFactory`] trait
//! objects. An editing context resolves the factories it needs once, when it
//! is built.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{EntityDescription, ModelRepository};
use crate::item::Value;

/// Builds the initial property values of a new object.
pub trait ObjectFactory: Send + Sync {
    fn instantiate(&self, entity: &EntityDescription) -> BTreeMap<String, Value>;
}

/// Fills every property with its type's default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {
    fn instantiate(&self, entity: &EntityDescription) -> BTreeMap<String, Value> {
        entity
            .properties
            .iter()
            .filter_map(|p| p.default_value().map(|v| (p.name.clone(), v)))
            .collect()
    }
}

/// Entity name -> factory.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn ObjectFactory>>,
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("FactoryRegistry").field("entities", &names).finish()
    }
}

impl FactoryRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [`DefaultObjectFactory`] for every entity in `model`.
    pub fn with_defaults(model: &ModelRepository) -> Self {
        let mut registry = Self::new();
        let factory: Arc<dyn ObjectFactory> = Arc::new(DefaultObjectFactory);
        for entity in model.entities() {
            registry
                .factories
                .insert(entity.name.clone(), Arc::clone(&factory));
        }
        registry
    }

    /// Registers or replaces the factory for `entity`.
    pub fn register(&mut self, entity: impl Into<String>, factory: Arc<dyn ObjectFactory>) {
        self.factories.insert(entity.into(), factory);
    }

    pub fn resolve(&self, entity: &str) -> Option<Arc<dyn ObjectFactory>> {
        self.factories.get(entity).cloned()
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.factories.contains_key(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metamodel::{PropertyDescription, PropertyType};

    struct Titled;

    impl ObjectFactory for Titled {
        fn instantiate(&self, _entity: &EntityDescription) -> BTreeMap<String, Value> {
            BTreeMap::from([("title".to_string(), Value::string("Untitled"))])
        }
    }

    fn model() -> ModelRepository {
        let mut model = ModelRepository::new();
        model.register_package("docs", 1);
        model
            .register_entity(
                EntityDescription::new("Document", "docs")
                    .with_property(PropertyDescription::new("title", PropertyType::String))
                    .with_property(PropertyDescription::new("owner", PropertyType::Reference)),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_default_factory_skips_single_references() {
        let model = model();
        let values = DefaultObjectFactory.instantiate(model.entity("Document").unwrap());
        assert_eq!(values.get("title"), Some(&Value::String(String::new())));
        assert!(!values.contains_key("owner"));
    }

    #[test]
    fn test_custom_factory_overrides_default() {
        let model = model();
        let mut registry = FactoryRegistry::with_defaults(&model);
        registry.register("Document", Arc::new(Titled));
        let factory = registry.resolve("Document").unwrap();
        let values = factory.instantiate(model.entity("Document").unwrap());
        assert_eq!(values.get("title"), Some(&Value::string("Untitled")));
        assert!(registry.resolve("Folder").is_none());
    }
}
