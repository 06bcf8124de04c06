//! Store errors

use thiserror::Error;
use uuid::Uuid;

use crate::backend::BackendError;
use crate::error::ErrorCategory;
use crate::item::ItemGraphError;
use crate::revision::{BranchId, NumberingError, PersistentRootId, RevisionGraphError, RevisionId};

/// Errors from store actions and reads.
#[derive(Debug, Error)]
pub enum StoreError {
    // Not found
    #[error("persistent root {0} not found")]
    PersistentRootNotFound(PersistentRootId),

    #[error("persistent root {0} has been deleted")]
    DeletedRoot(PersistentRootId),

    #[error("branch {0} not found")]
    BranchNotFound(BranchId),

    #[error("branch {0} has been deleted")]
    DeletedBranch(BranchId),

    #[error("no branch named '{name}' in persistent root {persistent_root}")]
    BranchNameNotFound {
        persistent_root: PersistentRootId,
        name: String,
    },

    #[error("revision {0} not found")]
    RevisionNotFound(RevisionId),

    #[error("object {0} does not belong to any persistent root")]
    ObjectNotFound(Uuid),

    #[error("object {uuid} has no item at revision {revision}")]
    ItemNotFound { uuid: Uuid, revision: RevisionId },

    // Conflict
    #[error("persistent root {0} already exists")]
    DuplicatePersistentRoot(PersistentRootId),

    #[error("branch {0} already exists")]
    DuplicateBranch(BranchId),

    #[error("revision {0} already exists")]
    DuplicateRevision(RevisionId),

    #[error("branch name '{name}' already used in persistent root {persistent_root}")]
    BranchNameTaken {
        persistent_root: PersistentRootId,
        name: String,
    },

    #[error("branch {branch} moved: expected tip {expected}, found {actual}")]
    TipMoved {
        branch: BranchId,
        expected: RevisionId,
        actual: RevisionId,
    },

    #[error("object {uuid} already belongs to persistent root {owner}")]
    ObjectOwnedElsewhere { uuid: Uuid, owner: PersistentRootId },

    // Consistency
    #[error("branch {branch} does not belong to persistent root {persistent_root}")]
    BranchNotInRoot {
        branch: BranchId,
        persistent_root: PersistentRootId,
    },

    #[error("revision {revision} does not belong to persistent root {persistent_root}")]
    RevisionNotInRoot {
        revision: RevisionId,
        persistent_root: PersistentRootId,
    },

    #[error("revision {revision} is not in the history of branch {parent_branch}")]
    InvalidForkPoint {
        revision: RevisionId,
        parent_branch: BranchId,
    },

    #[error("cannot delete branch {0}: it is the current branch")]
    CannotDeleteCurrentBranch(BranchId),

    #[error("delta for persistent root {persistent_root} is rooted at {actual}, expected {expected}")]
    RootObjectMismatch {
        persistent_root: PersistentRootId,
        expected: Uuid,
        actual: Uuid,
    },

    #[error("invalid item graph for persistent root {persistent_root}: {source}")]
    InvalidGraph {
        persistent_root: PersistentRootId,
        #[source]
        source: ItemGraphError,
    },

    #[error(transparent)]
    History(#[from] RevisionGraphError),

    // Storage
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error(transparent)]
    Numbering(#[from] NumberingError),
}

impl StoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::PersistentRootNotFound(_)
            | StoreError::DeletedRoot(_)
            | StoreError::BranchNotFound(_)
            | StoreError::DeletedBranch(_)
            | StoreError::BranchNameNotFound { .. }
            | StoreError::RevisionNotFound(_)
            | StoreError::ObjectNotFound(_)
            | StoreError::ItemNotFound { .. } => ErrorCategory::NotFound,

            StoreError::DuplicatePersistentRoot(_)
            | StoreError::DuplicateBranch(_)
            | StoreError::DuplicateRevision(_)
            | StoreError::BranchNameTaken { .. }
            | StoreError::TipMoved { .. }
            | StoreError::ObjectOwnedElsewhere { .. } => ErrorCategory::Conflict,

            StoreError::BranchNotInRoot { .. }
            | StoreError::RevisionNotInRoot { .. }
            | StoreError::InvalidForkPoint { .. }
            | StoreError::CannotDeleteCurrentBranch(_)
            | StoreError::RootObjectMismatch { .. }
            | StoreError::InvalidGraph { .. } => ErrorCategory::ConsistencyViolation,

            StoreError::History(RevisionGraphError::MissingRevision(_)) => ErrorCategory::NotFound,
            StoreError::History(RevisionGraphError::Replay { .. }) => {
                ErrorCategory::ConsistencyViolation
            }

            StoreError::Backend(_) | StoreError::Encoding(_) | StoreError::Numbering(_) => {
                ErrorCategory::Storage
            }
        }
    }

    /// Stable code string
    pub fn code(&self) -> &'static str {
        self.category().code()
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.category() == ErrorCategory::Conflict
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleted_root_is_not_found() {
        let err = StoreError::DeletedRoot(PersistentRootId::new());
        assert!(err.is_not_found());
        assert_eq!(err.code(), "CO_NOT_FOUND");
    }

    #[test]
    fn test_tip_moved_is_retryable_conflict() {
        let err = StoreError::TipMoved {
            branch: BranchId::new(),
            expected: RevisionId::new(),
            actual: RevisionId::new(),
        };
        assert!(err.is_conflict());
        assert!(err.category().is_retryable());
    }

    #[test]
    fn test_backend_failure_is_storage() {
        let err = StoreError::from(BackendError::write_failed_no_source("disk full"));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }
}
