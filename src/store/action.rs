//! Store actions
//!
//! The closed set of mutations the store accepts. Actions are only applied
//! inside a [`StoreTransaction`](super::StoreTransaction).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::ItemGraphDelta;
use crate::revision::{BranchId, CommitMetadata, PersistentRootId, RevisionId};

/// One atomic mutation of the revision graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StoreAction {
    /// New persistent root with one current branch at an empty root revision.
    CreatePersistentRoot {
        persistent_root: PersistentRootId,
        root_object: Uuid,
        branch: BranchId,
        branch_name: String,
        initial_revision: RevisionId,
        metadata: CommitMetadata,
    },

    /// New branch whose tip is `initial_revision`, which must be in the
    /// history of `parent_branch`.
    CreateBranch {
        persistent_root: PersistentRootId,
        branch: BranchId,
        name: String,
        parent_branch: BranchId,
        initial_revision: RevisionId,
    },

    SetCurrentBranch {
        persistent_root: PersistentRootId,
        branch: BranchId,
    },

    /// Appends a revision on `branch`. `parent_revision` must be the
    /// branch's current tip.
    WriteRevision {
        persistent_root: PersistentRootId,
        branch: BranchId,
        revision: RevisionId,
        parent_revision: RevisionId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        merged_revisions: Vec<RevisionId>,
        delta: ItemGraphDelta,
        metadata: CommitMetadata,
    },

    /// Marks a non-current branch deleted.
    DeleteBranch {
        persistent_root: PersistentRootId,
        branch: BranchId,
    },

    /// Terminal. Marks the root and every branch deleted.
    DeletePersistentRoot { persistent_root: PersistentRootId },
}

impl StoreAction {
    /// Action name for logs
    pub fn name(&self) -> &'static str {
        match self {
            StoreAction::CreatePersistentRoot { .. } => "create_persistent_root",
            StoreAction::CreateBranch { .. } => "create_branch",
            StoreAction::SetCurrentBranch { .. } => "set_current_branch",
            StoreAction::WriteRevision { .. } => "write_revision",
            StoreAction::DeleteBranch { .. } => "delete_branch",
            StoreAction::DeletePersistentRoot { .. } => "delete_persistent_root",
        }
    }

    /// The persistent root the action addresses.
    pub fn persistent_root(&self) -> PersistentRootId {
        match self {
            StoreAction::CreatePersistentRoot { persistent_root, .. }
            | StoreAction::CreateBranch { persistent_root, .. }
            | StoreAction::SetCurrentBranch { persistent_root, .. }
            | StoreAction::WriteRevision { persistent_root, .. }
            | StoreAction::DeleteBranch { persistent_root, .. }
            | StoreAction::DeletePersistentRoot { persistent_root } => *persistent_root,
        }
    }
}
