//! Migration errors

use thiserror::Error;

use crate::error::ErrorCategory;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("invalid move of '{name}': {reason}")]
    InvalidMove { name: String, reason: String },

    #[error("a migration for package '{package}' version {version} is already registered")]
    DuplicateMigration { package: String, version: i64 },

    #[error("migration {package}@{version} moves entity '{entity}', which is unknown to both the item and the metamodel")]
    UnresolvableEntity {
        entity: String,
        package: String,
        version: i64,
    },

    #[error("migration {package}@{version} moves property '{owner}.{property}', which is unknown to both the item and the metamodel")]
    UnresolvableProperty {
        owner: String,
        property: String,
        package: String,
        version: i64,
    },

    #[error("migration {package}@{version} targets unknown package '{target}'")]
    UnknownTargetPackage {
        package: String,
        version: i64,
        target: String,
    },

    #[error("item package '{0}' is not in the metamodel")]
    UnknownPackage(String),

    #[error("item was written under {package}@{stored}, newer than the metamodel's version {current}")]
    VersionAhead {
        package: String,
        stored: i64,
        current: i64,
    },

    #[error("entity moves loop back to {package}@{version}")]
    Cycle { package: String, version: i64 },
}

impl MigrationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MigrationError::InvalidMove { .. } => ErrorCategory::ConsistencyViolation,
            MigrationError::DuplicateMigration { .. } => ErrorCategory::Conflict,
            _ => ErrorCategory::SchemaUnresolvable,
        }
    }
}

/// Result type for schema migration
pub type MigrationResult<T> = Result<T, MigrationError>;
