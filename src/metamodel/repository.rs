//! Model repository: packages and entity descriptions
//!
//! Loaded once and shared read-only. The JSON form is:
//!
//! ```json
//! { "packages": { "docs": 2 },
//!   "entities": [ { "name": "Document", "package": "docs",
//!                   "properties": [ { "name": "title", "type": "string" } ] } ] }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::errors::{MetamodelError, MetamodelResult};
use super::EntityDescription;

/// Read-only schema oracle.
#[derive(Debug, Clone, Default)]
pub struct ModelRepository {
    packages: BTreeMap<String, i64>,
    entities: BTreeMap<String, EntityDescription>,
}

#[derive(Deserialize)]
struct ModelDocument {
    #[serde(default)]
    packages: BTreeMap<String, i64>,
    #[serde(default)]
    entities: Vec<EntityDescription>,
}

impl ModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or bumps a package to `version`.
    pub fn register_package(&mut self, name: impl Into<String>, version: i64) {
        self.packages.insert(name.into(), version);
    }

    /// Registers an entity. Its package, and the package of every property
    /// that names one, must already be registered.
    pub fn register_entity(&mut self, entity: EntityDescription) -> MetamodelResult<()> {
        if !self.packages.contains_key(&entity.package) {
            return Err(MetamodelError::UnknownPackage(entity.package.clone()));
        }
        if self.entities.contains_key(&entity.name) {
            return Err(MetamodelError::DuplicateEntity(entity.name.clone()));
        }
        let mut seen = HashSet::new();
        for property in &entity.properties {
            if !seen.insert(property.name.as_str()) {
                return Err(MetamodelError::DuplicateProperty {
                    entity: entity.name.clone(),
                    property: property.name.clone(),
                });
            }
            if let Some(package) = &property.package {
                if !self.packages.contains_key(package) {
                    return Err(MetamodelError::UnknownPackage(package.clone()));
                }
            }
        }
        self.entities.insert(entity.name.clone(), entity);
        Ok(())
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescription> {
        self.entities.values()
    }

    /// Current version of `package`.
    pub fn package_version(&self, package: &str) -> Option<i64> {
        self.packages.get(package).copied()
    }

    pub fn has_package(&self, package: &str) -> bool {
        self.packages.contains_key(package)
    }

    /// Whether `entity` declares `property` in the current metamodel.
    pub fn has_property(&self, entity: &str, property: &str) -> bool {
        self.entity(entity)
            .map_or(false, |e| e.property(property).is_some())
    }

    /// Parses a JSON model document.
    pub fn from_json_str(content: &str) -> MetamodelResult<Self> {
        Self::parse(content, "<inline>")
    }

    /// Loads a JSON model document from disk.
    pub fn from_file(path: &Path) -> MetamodelResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| MetamodelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, source_name: &str) -> MetamodelResult<Self> {
        let document: ModelDocument =
            serde_json::from_str(content).map_err(|e| MetamodelError::Malformed {
                source_name: source_name.to_string(),
                reason: format!("Invalid JSON: {}", e),
            })?;
        let mut repository = Self::new();
        for (name, version) in document.packages {
            repository.register_package(name, version);
        }
        for entity in document.entities {
            repository.register_entity(entity)?;
        }
        Ok(repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metamodel::{PropertyDescription, PropertyType};

    #[test]
    fn test_from_json() {
        let repo = ModelRepository::from_json_str(
            r#"{ "packages": { "docs": 2 },
                 "entities": [ { "name": "Document", "package": "docs",
                                 "properties": [ { "name": "title", "type": "string" } ] } ] }"#,
        )
        .unwrap();
        assert_eq!(repo.package_version("docs"), Some(2));
        assert!(repo.has_property("Document", "title"));
        assert!(!repo.has_property("Document", "body"));
    }

    #[test]
    fn test_entity_requires_known_package() {
        let mut repo = ModelRepository::new();
        let result = repo.register_entity(EntityDescription::new("Document", "docs"));
        assert!(matches!(result, Err(MetamodelError::UnknownPackage(_))));
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let mut repo = ModelRepository::new();
        repo.register_package("docs", 1);
        repo.register_entity(EntityDescription::new("Document", "docs"))
            .unwrap();
        let result = repo.register_entity(EntityDescription::new("Document", "docs"));
        assert!(matches!(result, Err(MetamodelError::DuplicateEntity(_))));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let mut repo = ModelRepository::new();
        repo.register_package("docs", 1);
        let entity = EntityDescription::new("Document", "docs")
            .with_property(PropertyDescription::new("title", PropertyType::String))
            .with_property(PropertyDescription::new("title", PropertyType::Int));
        assert!(matches!(
            repo.register_entity(entity),
            Err(MetamodelError::DuplicateProperty { .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        let result = ModelRepository::from_json_str("{ not json");
        assert!(matches!(result, Err(MetamodelError::Malformed { .. })));
    }
}
