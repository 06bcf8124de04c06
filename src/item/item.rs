//! Item - flat snapshot of one object's properties
//!
//! An item is pure data: entity identity, the package version the entity
//! was serialized under, and a map of property values. Other objects are
//! referenced by UUID only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Value;

/// Serialized state of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    uuid: Uuid,
    entity: String,
    package: String,
    package_version: i64,
    values: BTreeMap<String, Value>,
    /// Declaring package of properties that do not live in the entity's package.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    property_packages: BTreeMap<String, String>,
}

impl Item {
    /// Creates an item with no property values.
    pub fn new(
        uuid: Uuid,
        entity: impl Into<String>,
        package: impl Into<String>,
        package_version: i64,
    ) -> Self {
        Self {
            uuid,
            entity: entity.into(),
            package: package.into(),
            package_version,
            values: BTreeMap::new(),
            property_packages: BTreeMap::new(),
        }
    }

    /// Builder-style value assignment.
    pub fn with_value(mut self, property: impl Into<String>, value: Value) -> Self {
        self.values.insert(property.into(), value);
        self
    }

    #[inline]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[inline]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Package that declares the entity.
    #[inline]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Version of [`package`](Self::package) the item was written under.
    #[inline]
    pub fn package_version(&self) -> i64 {
        self.package_version
    }

    pub fn value(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn set_value(&mut self, property: impl Into<String>, value: Value) {
        self.values.insert(property.into(), value);
    }

    pub fn remove_value(&mut self, property: &str) -> Option<Value> {
        self.values.remove(property)
    }

    /// Package declaring `property`. Defaults to the entity's package.
    pub fn property_package(&self, property: &str) -> &str {
        self.property_packages
            .get(property)
            .map(String::as_str)
            .unwrap_or(&self.package)
    }

    pub fn property_packages(&self) -> &BTreeMap<String, String> {
        &self.property_packages
    }

    /// UUIDs of the objects this item owns, in property order.
    pub fn composite_children(&self) -> Vec<Uuid> {
        self.values
            .values()
            .flat_map(Value::composite_children)
            .collect()
    }

    pub(crate) fn relocate_entity(&mut self, package: &str, package_version: i64) {
        self.package = package.to_string();
        self.package_version = package_version;
    }

    pub(crate) fn set_package_version(&mut self, package_version: i64) {
        self.package_version = package_version;
    }

    pub(crate) fn relocate_property(&mut self, property: &str, package: &str) {
        if package == self.package {
            self.property_packages.remove(property);
        } else {
            self.property_packages
                .insert(property.to_string(), package.to_string());
        }
    }

    pub(crate) fn with_property_packages(mut self, packages: BTreeMap<String, String>) -> Self {
        self.property_packages = packages;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_package_defaults_to_entity_package() {
        let item = Item::new(Uuid::new_v4(), "Document", "docs", 1)
            .with_value("title", Value::string("a"));
        assert_eq!(item.property_package("title"), "docs");
    }

    #[test]
    fn test_relocate_property_back_to_entity_package_clears_entry() {
        let mut item = Item::new(Uuid::new_v4(), "Document", "docs", 1);
        item.relocate_property("title", "text");
        assert_eq!(item.property_package("title"), "text");
        item.relocate_property("title", "docs");
        assert!(item.property_packages().is_empty());
    }

    #[test]
    fn test_composite_children() {
        let child = Uuid::new_v4();
        let item = Item::new(Uuid::new_v4(), "Folder", "docs", 1)
            .with_value("contents", Value::Array(vec![Value::CompositeReference(child)]))
            .with_value("link", Value::Reference(Uuid::new_v4()));
        assert_eq!(item.composite_children(), vec![child]);
    }

    #[test]
    fn test_serde_omits_empty_property_packages() {
        let item = Item::new(Uuid::new_v4(), "Document", "docs", 1);
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("property_packages").is_none());
        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }
}
