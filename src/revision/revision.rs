//! Immutable revision records

use serde::{Deserialize, Serialize};

use super::{BranchId, CommitMetadata, PersistentRootId, RevisionId, RevisionNumber};
use crate::item::ItemGraphDelta;

/// One committed state of a persistent root.
///
/// The first parent is the revision the delta applies to; any further
/// parents are merge parents and only matter for ancestry. A root revision
/// has no parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    id: RevisionId,
    number: RevisionNumber,
    persistent_root: PersistentRootId,
    branch: BranchId,
    parents: Vec<RevisionId>,
    metadata: CommitMetadata,
    delta: ItemGraphDelta,
}

impl Revision {
    pub(crate) fn new(
        id: RevisionId,
        number: RevisionNumber,
        persistent_root: PersistentRootId,
        branch: BranchId,
        parents: Vec<RevisionId>,
        metadata: CommitMetadata,
        delta: ItemGraphDelta,
    ) -> Self {
        Self {
            id,
            number,
            persistent_root,
            branch,
            parents,
            metadata,
            delta,
        }
    }

    #[inline]
    pub fn id(&self) -> RevisionId {
        self.id
    }

    #[inline]
    pub fn number(&self) -> RevisionNumber {
        self.number
    }

    #[inline]
    pub fn persistent_root(&self) -> PersistentRootId {
        self.persistent_root
    }

    /// Branch the revision was written on.
    #[inline]
    pub fn branch(&self) -> BranchId {
        self.branch
    }

    /// First parent, `None` for a root revision.
    pub fn parent(&self) -> Option<RevisionId> {
        self.parents.first().copied()
    }

    pub fn parents(&self) -> &[RevisionId] {
        &self.parents
    }

    pub fn merged_parents(&self) -> &[RevisionId] {
        self.parents.get(1..).unwrap_or(&[])
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn metadata(&self) -> &CommitMetadata {
        &self.metadata
    }

    pub fn delta(&self) -> &ItemGraphDelta {
        &self.delta
    }
}
