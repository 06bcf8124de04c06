//! Metamodel errors

use thiserror::Error;

use crate::error::ErrorCategory;

#[derive(Debug, Error)]
pub enum MetamodelError {
    #[error("unknown package '{0}'")]
    UnknownPackage(String),

    #[error("entity '{0}' is already registered")]
    DuplicateEntity(String),

    #[error("entity '{entity}' declares property '{property}' twice")]
    DuplicateProperty { entity: String, property: String },

    #[error("malformed metamodel '{source_name}': {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("failed to read metamodel '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl MetamodelError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MetamodelError::Io { .. } => ErrorCategory::Storage,
            _ => ErrorCategory::ConsistencyViolation,
        }
    }
}

/// Result type for metamodel operations
pub type MetamodelResult<T> = Result<T, MetamodelError>;
