//! One migration batch: the moves registered for a (package, version) pair

use serde::{Deserialize, Serialize};

use super::errors::{MigrationError, MigrationResult};
use super::ModelElementMove;
use crate::item::Item;
use crate::metamodel::ModelRepository;

/// Moves that bring `package` up to `destination_version`.
///
/// Applied as a single batch: every move is checked before any is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMigration {
    pub package: String,
    pub destination_version: i64,
    #[serde(default)]
    pub entity_moves: Vec<ModelElementMove>,
    #[serde(default)]
    pub property_moves: Vec<ModelElementMove>,
}

impl SchemaMigration {
    pub fn new(package: impl Into<String>, destination_version: i64) -> Self {
        Self {
            package: package.into(),
            destination_version,
            entity_moves: Vec::new(),
            property_moves: Vec::new(),
        }
    }

    pub fn with_entity_move(mut self, element_move: ModelElementMove) -> Self {
        self.entity_moves.push(element_move);
        self
    }

    pub fn with_property_move(mut self, element_move: ModelElementMove) -> Self {
        self.property_moves.push(element_move);
        self
    }

    /// Checks that every move's owner name matches its kind.
    pub fn validate(&self) -> MigrationResult<()> {
        for element_move in &self.entity_moves {
            element_move.validate_as_entity_move()?;
        }
        for element_move in &self.property_moves {
            element_move.validate_as_property_move()?;
        }
        Ok(())
    }

    /// Applies the batch to `item`. Returns whether the item changed.
    ///
    /// Applying the same batch again is a no-op.
    pub fn apply(&self, item: &mut Item, model: &ModelRepository) -> MigrationResult<bool> {
        self.validate()?;
        for element_move in &self.entity_moves {
            self.check_target(element_move, model)?;
            let known = model.entity(&element_move.name).is_some()
                || item.entity() == element_move.name;
            if !known {
                return Err(MigrationError::UnresolvableEntity {
                    entity: element_move.name.clone(),
                    package: self.package.clone(),
                    version: self.destination_version,
                });
            }
        }
        for element_move in &self.property_moves {
            self.check_target(element_move, model)?;
            let owner = element_move.owner_name.as_deref().unwrap_or_default();
            let known = model.has_property(owner, &element_move.name)
                || (item.entity() == owner && item.value(&element_move.name).is_some());
            if !known {
                return Err(MigrationError::UnresolvableProperty {
                    owner: owner.to_string(),
                    property: element_move.name.clone(),
                    package: self.package.clone(),
                    version: self.destination_version,
                });
            }
        }

        let before = item.clone();
        for element_move in &self.entity_moves {
            if item.entity() == element_move.name {
                item.relocate_entity(&element_move.package_name, element_move.package_version);
            }
        }
        for element_move in &self.property_moves {
            let owned = element_move.owner_name.as_deref() == Some(item.entity());
            if owned && item.value(&element_move.name).is_some() {
                item.relocate_property(&element_move.name, &element_move.package_name);
            }
        }
        Ok(*item != before)
    }

    fn check_target(
        &self,
        element_move: &ModelElementMove,
        model: &ModelRepository,
    ) -> MigrationResult<()> {
        if model.has_package(&element_move.package_name) {
            Ok(())
        } else {
            Err(MigrationError::UnknownTargetPackage {
                package: self.package.clone(),
                version: self.destination_version,
                target: element_move.package_name.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::item::Value;
    use crate::metamodel::{EntityDescription, PropertyDescription, PropertyType};

    fn model() -> ModelRepository {
        let mut model = ModelRepository::new();
        model.register_package("docs", 2);
        model.register_package("text", 1);
        model
            .register_entity(
                EntityDescription::new("Document", "docs").with_property(
                    PropertyDescription::new("title", PropertyType::String).in_package("text"),
                ),
            )
            .unwrap();
        model
    }

    fn stored_document() -> Item {
        Item::new(Uuid::new_v4(), "Document", "docs", 1).with_value("title", Value::string("a"))
    }

    #[test]
    fn test_property_move_keeps_value() {
        let migration = SchemaMigration::new("docs", 2)
            .with_property_move(ModelElementMove::property("Document", "title", "text", 1));
        let mut item = stored_document();
        assert!(migration.apply(&mut item, &model()).unwrap());
        assert_eq!(item.property_package("title"), "text");
        assert_eq!(item.value("title"), Some(&Value::string("a")));
    }

    #[test]
    fn test_apply_twice_is_noop() {
        let migration = SchemaMigration::new("docs", 2)
            .with_entity_move(ModelElementMove::entity("Document", "text", 1))
            .with_property_move(ModelElementMove::property("Document", "title", "text", 1));
        let model = model();
        let mut item = stored_document();
        migration.apply(&mut item, &model).unwrap();
        let once = item.clone();
        assert!(!migration.apply(&mut item, &model).unwrap());
        assert_eq!(item, once);
    }

    #[test]
    fn test_unknown_property_is_unresolvable() {
        let migration = SchemaMigration::new("docs", 2)
            .with_property_move(ModelElementMove::property("Document", "subtitle", "text", 1));
        let mut item = stored_document();
        let before = item.clone();
        let err = migration.apply(&mut item, &model()).unwrap_err();
        assert!(matches!(err, MigrationError::UnresolvableProperty { .. }));
        assert_eq!(item, before);
    }

    #[test]
    fn test_property_known_only_to_item_is_resolvable() {
        let migration = SchemaMigration::new("docs", 2)
            .with_property_move(ModelElementMove::property("Document", "legacy", "text", 1));
        let mut item = stored_document().with_value("legacy", Value::Int(1));
        assert!(migration.apply(&mut item, &model()).unwrap());
        assert_eq!(item.property_package("legacy"), "text");
    }

    #[test]
    fn test_unknown_target_package() {
        let migration = SchemaMigration::new("docs", 2)
            .with_entity_move(ModelElementMove::entity("Document", "nowhere", 1));
        let err = migration.apply(&mut stored_document(), &model()).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownTargetPackage { .. }));
    }
}
