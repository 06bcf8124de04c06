//! Editing context errors

use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorCategory;
use crate::item::ItemGraphError;
use crate::migration::MigrationError;
use crate::revision::{PersistentRootId, RevisionNumber};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("object {0} not found")]
    ObjectNotFound(Uuid),

    #[error("object {0} is deleted in this context")]
    ObjectDeleted(Uuid),

    #[error("entity '{0}' is not in the metamodel")]
    UnknownEntity(String),

    #[error("no factory registered for entity '{0}'")]
    NoFactoryForEntity(String),

    #[error("entity '{entity}' has no property '{property}'")]
    UnknownProperty { entity: String, property: String },

    #[error("property '{entity}.{property}' expects {expected}, got {found}")]
    PropertyTypeMismatch {
        entity: String,
        property: String,
        expected: String,
        found: &'static str,
    },

    #[error("persistent root {0} has not been committed yet")]
    RootNotCommitted(PersistentRootId),

    #[error("persistent root {persistent_root} has no revision numbered at or below {max}")]
    NoRevisionAtOrBelow {
        persistent_root: PersistentRootId,
        max: RevisionNumber,
    },

    #[error("persistent root {0} has uncommitted changes")]
    UncommittedChanges(PersistentRootId),

    #[error("object {0} has uncommitted changes")]
    ObjectHasChanges(Uuid),

    #[error("commit of persistent root {persistent_root} failed: {source}")]
    CommitFailed {
        persistent_root: PersistentRootId,
        #[source]
        source: StoreError,
    },

    #[error("persistent root {persistent_root} would be inconsistent: {source}")]
    InvalidGraph {
        persistent_root: PersistentRootId,
        #[source]
        source: ItemGraphError,
    },

    #[error("a current editing context is already installed")]
    CurrentContextAlreadySet,
}

impl ContextError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ContextError::Store(err) => err.category(),
            ContextError::CommitFailed { source, .. } => source.category(),
            ContextError::Migration(err) => err.category(),
            ContextError::ObjectNotFound(_)
            | ContextError::ObjectDeleted(_)
            | ContextError::RootNotCommitted(_)
            | ContextError::NoRevisionAtOrBelow { .. } => ErrorCategory::NotFound,
            ContextError::UncommittedChanges(_)
            | ContextError::ObjectHasChanges(_)
            | ContextError::CurrentContextAlreadySet => ErrorCategory::Conflict,
            ContextError::UnknownEntity(_)
            | ContextError::NoFactoryForEntity(_)
            | ContextError::UnknownProperty { .. }
            | ContextError::PropertyTypeMismatch { .. }
            | ContextError::InvalidGraph { .. } => ErrorCategory::ConsistencyViolation,
        }
    }

    /// Stable code string
    pub fn code(&self) -> &'static str {
        self.category().code()
    }

    /// Persistent root whose commit failed, if this is a commit failure.
    pub fn failed_root(&self) -> Option<PersistentRootId> {
        match self {
            ContextError::CommitFailed {
                persistent_root, ..
            }
            | ContextError::InvalidGraph {
                persistent_root, ..
            } => Some(*persistent_root),
            _ => None,
        }
    }
}

/// Result type for editing context operations
pub type ContextResult<T> = Result<T, ContextError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::{BranchId, RevisionId};

    #[test]
    fn test_commit_failure_takes_source_category() {
        let root = PersistentRootId::new();
        let err = ContextError::CommitFailed {
            persistent_root: root,
            source: StoreError::TipMoved {
                branch: BranchId::new(),
                expected: RevisionId::new(),
                actual: RevisionId::new(),
            },
        };
        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert_eq!(err.failed_root(), Some(root));
    }

    #[test]
    fn test_not_found_propagates_from_store() {
        let err = ContextError::from(StoreError::ObjectNotFound(Uuid::new_v4()));
        assert_eq!(err.code(), "CO_NOT_FOUND");
    }
}
