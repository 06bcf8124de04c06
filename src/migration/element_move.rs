//! Entity and property moves between packages

use serde::{Deserialize, Serialize};

use super::errors::{MigrationError, MigrationResult};

/// Relocation of an entity or a property into another package.
///
/// A property move names the entity that owns the property in
/// `owner_name`; an entity move leaves it unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelElementMove {
    /// Entity or property name
    pub name: String,
    /// Owning entity, for property moves only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    /// Destination package
    pub package_name: String,
    /// Version of the destination package that requires the move
    pub package_version: i64,
}

impl ModelElementMove {
    /// Moves entity `name` into `package` at `version`.
    pub fn entity(name: impl Into<String>, package: impl Into<String>, version: i64) -> Self {
        Self {
            name: name.into(),
            owner_name: None,
            package_name: package.into(),
            package_version: version,
        }
    }

    /// Moves `owner.name` into `package` at `version`.
    pub fn property(
        owner: impl Into<String>,
        name: impl Into<String>,
        package: impl Into<String>,
        version: i64,
    ) -> Self {
        Self {
            name: name.into(),
            owner_name: Some(owner.into()),
            package_name: package.into(),
            package_version: version,
        }
    }

    pub fn is_property_move(&self) -> bool {
        self.owner_name.is_some()
    }

    pub(crate) fn validate_as_entity_move(&self) -> MigrationResult<()> {
        self.validate_common()?;
        if self.owner_name.is_some() {
            return Err(self.invalid("entity moves must not set an owner name"));
        }
        Ok(())
    }

    pub(crate) fn validate_as_property_move(&self) -> MigrationResult<()> {
        self.validate_common()?;
        match self.owner_name.as_deref() {
            None => Err(self.invalid("property moves require an owner name")),
            Some(owner) if owner.is_empty() => Err(self.invalid("owner name is empty")),
            Some(_) => Ok(()),
        }
    }

    fn validate_common(&self) -> MigrationResult<()> {
        if self.name.is_empty() {
            return Err(self.invalid("name is empty"));
        }
        if self.package_name.is_empty() {
            return Err(self.invalid("destination package is empty"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> MigrationError {
        MigrationError::InvalidMove {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_are_consistent() {
        assert!(ModelElementMove::entity("Document", "text", 2)
            .validate_as_entity_move()
            .is_ok());
        assert!(ModelElementMove::property("Document", "title", "text", 2)
            .validate_as_property_move()
            .is_ok());
    }

    #[test]
    fn test_owner_mismatch_is_rejected() {
        let entity_move = ModelElementMove::entity("Document", "text", 2);
        assert!(entity_move.validate_as_property_move().is_err());

        let property_move = ModelElementMove::property("Document", "title", "text", 2);
        let err = property_move.validate_as_entity_move().unwrap_err();
        assert_eq!(
            err.category(),
            crate::error::ErrorCategory::ConsistencyViolation
        );
    }
}
