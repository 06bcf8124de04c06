//! Branch and persistent root records
//!
//! Both are mutable only through store actions; the setters are crate-private.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BranchId, PersistentRootId, RevisionId};

/// Named pointer to the tip of one line of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    id: BranchId,
    name: String,
    persistent_root: PersistentRootId,
    tip: RevisionId,
    parent_branch: Option<BranchId>,
    /// Fork point; `None` for the first branch of a root.
    parent_revision: Option<RevisionId>,
    deleted: bool,
}

impl Branch {
    pub(crate) fn new(
        id: BranchId,
        name: impl Into<String>,
        persistent_root: PersistentRootId,
        tip: RevisionId,
        parent_branch: Option<BranchId>,
        parent_revision: Option<RevisionId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            persistent_root,
            tip,
            parent_branch,
            parent_revision,
            deleted: false,
        }
    }

    #[inline]
    pub fn id(&self) -> BranchId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn persistent_root(&self) -> PersistentRootId {
        self.persistent_root
    }

    #[inline]
    pub fn tip(&self) -> RevisionId {
        self.tip
    }

    pub fn parent_branch(&self) -> Option<BranchId> {
        self.parent_branch
    }

    pub fn parent_revision(&self) -> Option<RevisionId> {
        self.parent_revision
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn set_tip(&mut self, tip: RevisionId) {
        self.tip = tip;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

/// A versioned aggregate: the unit of commit, branching and deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentRoot {
    id: PersistentRootId,
    root_object: Uuid,
    branches: BTreeSet<BranchId>,
    current_branch: BranchId,
    deleted: bool,
}

impl PersistentRoot {
    pub(crate) fn new(id: PersistentRootId, root_object: Uuid, first_branch: BranchId) -> Self {
        Self {
            id,
            root_object,
            branches: BTreeSet::from([first_branch]),
            current_branch: first_branch,
            deleted: false,
        }
    }

    #[inline]
    pub fn id(&self) -> PersistentRootId {
        self.id
    }

    /// UUID of the object at the top of the root's composite tree.
    #[inline]
    pub fn root_object(&self) -> Uuid {
        self.root_object
    }

    /// Every branch ever created in this root, deleted ones included.
    pub fn branches(&self) -> &BTreeSet<BranchId> {
        &self.branches
    }

    #[inline]
    pub fn current_branch(&self) -> BranchId {
        self.current_branch
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn contains_branch(&self, branch: BranchId) -> bool {
        self.branches.contains(&branch)
    }

    pub(crate) fn add_branch(&mut self, branch: BranchId) {
        self.branches.insert(branch);
    }

    pub(crate) fn set_current_branch(&mut self, branch: BranchId) {
        self.current_branch = branch;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}
