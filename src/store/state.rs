//! Committed store state and the transaction staging overlay
//!
//! A transaction never touches [`StoreState`] while it is being validated.
//! Every action is checked against the committed state plus whatever the
//! earlier actions of the same transaction staged in a
//! [`TransactionScope`]. Only a fully validated scope is turned into
//! [`StagedChanges`], persisted, and then absorbed.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::cache::SnapshotCache;
use super::errors::{StoreError, StoreResult};
use super::StoreAction;
use crate::item::{ItemGraph, ItemGraphDelta};
use crate::revision::{
    is_ancestor, materialize, Branch, BranchId, CommitMetadata, PersistentRoot, PersistentRootId,
    Revision, RevisionId, RevisionLookup, RevisionNumber,
};

/// Everything the store has committed.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) roots: HashMap<PersistentRootId, PersistentRoot>,
    pub(crate) branches: HashMap<BranchId, Branch>,
    pub(crate) revisions: HashMap<RevisionId, Arc<Revision>>,
    /// Object UUID -> owning persistent root
    pub(crate) object_roots: HashMap<Uuid, PersistentRootId>,
}

impl RevisionLookup for StoreState {
    fn revision(&self, id: RevisionId) -> Option<&Revision> {
        self.revisions.get(&id).map(Arc::as_ref)
    }
}

impl StoreState {
    /// Inserts a replayed persistent root record.
    pub(crate) fn restore_root(&mut self, root: PersistentRoot) {
        self.object_roots.insert(root.root_object(), root.id());
        self.roots.insert(root.id(), root);
    }

    pub(crate) fn restore_branch(&mut self, branch: Branch) {
        self.branches.insert(branch.id(), branch);
    }

    pub(crate) fn restore_revision(&mut self, revision: Revision) {
        for item in revision.delta().items() {
            self.object_roots
                .insert(item.uuid(), revision.persistent_root());
        }
        self.revisions.insert(revision.id(), Arc::new(revision));
    }

    /// Live root, or the matching not-found error.
    pub(crate) fn live_root(&self, id: PersistentRootId) -> StoreResult<&PersistentRoot> {
        match self.roots.get(&id) {
            None => Err(StoreError::PersistentRootNotFound(id)),
            Some(root) if root.is_deleted() => Err(StoreError::DeletedRoot(id)),
            Some(root) => Ok(root),
        }
    }

    /// Live branch of a live root.
    pub(crate) fn live_branch(&self, id: BranchId) -> StoreResult<&Branch> {
        let branch = self
            .branches
            .get(&id)
            .ok_or(StoreError::BranchNotFound(id))?;
        self.live_root(branch.persistent_root())?;
        if branch.is_deleted() {
            return Err(StoreError::DeletedBranch(id));
        }
        Ok(branch)
    }

    /// Revision whose persistent root is still live.
    pub(crate) fn live_revision(&self, id: RevisionId) -> StoreResult<&Arc<Revision>> {
        let revision = self
            .revisions
            .get(&id)
            .ok_or(StoreError::RevisionNotFound(id))?;
        self.live_root(revision.persistent_root())?;
        Ok(revision)
    }

    /// Folds a validated, persisted transaction into the state.
    pub(crate) fn absorb(&mut self, staged: StagedChanges) {
        for root in staged.roots {
            self.roots.insert(root.id(), root);
        }
        for branch in staged.branches {
            self.branches.insert(branch.id(), branch);
        }
        for revision in staged.revisions {
            self.revisions.insert(revision.id(), revision);
        }
        self.object_roots.extend(staged.object_roots);
    }
}

/// What a validated transaction changes, in write order.
#[derive(Debug, Default)]
pub(crate) struct StagedChanges {
    pub(crate) roots: Vec<PersistentRoot>,
    pub(crate) branches: Vec<Branch>,
    pub(crate) revisions: Vec<Arc<Revision>>,
    pub(crate) object_roots: Vec<(Uuid, PersistentRootId)>,
    pub(crate) graphs: Vec<(RevisionId, Arc<ItemGraph>)>,
}

/// Copy-on-write overlay over [`StoreState`] for one transaction.
pub(crate) struct TransactionScope<'a> {
    base: &'a StoreState,
    cache: &'a SnapshotCache,
    roots: HashMap<PersistentRootId, PersistentRoot>,
    branches: HashMap<BranchId, Branch>,
    revisions: HashMap<RevisionId, Arc<Revision>>,
    revision_order: Vec<RevisionId>,
    object_roots: HashMap<Uuid, PersistentRootId>,
    graphs: HashMap<RevisionId, Arc<ItemGraph>>,
    next_number: u64,
}

impl RevisionLookup for TransactionScope<'_> {
    fn revision(&self, id: RevisionId) -> Option<&Revision> {
        self.revisions
            .get(&id)
            .or_else(|| self.base.revisions.get(&id))
            .map(Arc::as_ref)
    }
}

impl<'a> TransactionScope<'a> {
    pub(crate) fn new(
        base: &'a StoreState,
        cache: &'a SnapshotCache,
        next_number: RevisionNumber,
    ) -> Self {
        Self {
            base,
            cache,
            roots: HashMap::new(),
            branches: HashMap::new(),
            revisions: HashMap::new(),
            revision_order: Vec::new(),
            object_roots: HashMap::new(),
            graphs: HashMap::new(),
            next_number: next_number.value(),
        }
    }

    /// Validates `action` against the current overlay and stages its effect.
    pub(crate) fn apply(&mut self, action: &StoreAction) -> StoreResult<()> {
        match action {
            StoreAction::CreatePersistentRoot {
                persistent_root,
                root_object,
                branch,
                branch_name,
                initial_revision,
                metadata,
            } => self.create_persistent_root(
                *persistent_root,
                *root_object,
                *branch,
                branch_name,
                *initial_revision,
                metadata,
            ),
            StoreAction::CreateBranch {
                persistent_root,
                branch,
                name,
                parent_branch,
                initial_revision,
            } => self.create_branch(
                *persistent_root,
                *branch,
                name,
                *parent_branch,
                *initial_revision,
            ),
            StoreAction::SetCurrentBranch {
                persistent_root,
                branch,
            } => self.set_current_branch(*persistent_root, *branch),
            StoreAction::WriteRevision {
                persistent_root,
                branch,
                revision,
                parent_revision,
                merged_revisions,
                delta,
                metadata,
            } => self.write_revision(
                *persistent_root,
                *branch,
                *revision,
                *parent_revision,
                merged_revisions,
                delta,
                metadata,
            ),
            StoreAction::DeleteBranch {
                persistent_root,
                branch,
            } => self.delete_branch(*persistent_root, *branch),
            StoreAction::DeletePersistentRoot { persistent_root } => {
                self.delete_persistent_root(*persistent_root)
            }
        }
    }

    /// Consumes the scope, yielding what must be persisted and absorbed.
    pub(crate) fn into_staged(self) -> StagedChanges {
        let mut revisions = self.revisions;
        let mut graphs = self.graphs;
        let mut staged = StagedChanges {
            roots: self.roots.into_values().collect(),
            branches: self.branches.into_values().collect(),
            object_roots: self.object_roots.into_iter().collect(),
            ..StagedChanges::default()
        };
        for id in self.revision_order {
            if let Some(revision) = revisions.remove(&id) {
                staged.revisions.push(revision);
            }
            if let Some(graph) = graphs.remove(&id) {
                staged.graphs.push((id, graph));
            }
        }
        staged
    }

    fn root(&self, id: PersistentRootId) -> Option<&PersistentRoot> {
        self.roots.get(&id).or_else(|| self.base.roots.get(&id))
    }

    fn live_root(&self, id: PersistentRootId) -> StoreResult<&PersistentRoot> {
        match self.root(id) {
            None => Err(StoreError::PersistentRootNotFound(id)),
            Some(root) if root.is_deleted() => Err(StoreError::DeletedRoot(id)),
            Some(root) => Ok(root),
        }
    }

    fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branches.get(&id).or_else(|| self.base.branches.get(&id))
    }

    /// Live branch that belongs to `persistent_root`.
    fn branch_in_root(&self, persistent_root: PersistentRootId, id: BranchId) -> StoreResult<&Branch> {
        let root = self.live_root(persistent_root)?;
        let branch = self.branch(id).ok_or(StoreError::BranchNotFound(id))?;
        if branch.persistent_root() != persistent_root || !root.contains_branch(id) {
            return Err(StoreError::BranchNotInRoot {
                branch: id,
                persistent_root,
            });
        }
        if branch.is_deleted() {
            return Err(StoreError::DeletedBranch(id));
        }
        Ok(branch)
    }

    fn owner_of(&self, uuid: Uuid) -> Option<PersistentRootId> {
        self.object_roots
            .get(&uuid)
            .or_else(|| self.base.object_roots.get(&uuid))
            .copied()
    }

    fn revision_exists(&self, id: RevisionId) -> bool {
        self.revision(id).is_some()
    }

    fn cached_graph(&self, id: RevisionId) -> Option<Arc<ItemGraph>> {
        self.graphs.get(&id).cloned().or_else(|| self.cache.get(id))
    }

    fn take_number(&mut self) -> RevisionNumber {
        let number = RevisionNumber::new(self.next_number);
        self.next_number += 1;
        number
    }

    fn stage_revision(&mut self, revision: Revision, graph: ItemGraph) {
        let id = revision.id();
        self.revision_order.push(id);
        self.revisions.insert(id, Arc::new(revision));
        self.graphs.insert(id, Arc::new(graph));
    }

    fn stage_root(&mut self, root: PersistentRoot) {
        self.roots.insert(root.id(), root);
    }

    fn stage_branch(&mut self, branch: Branch) {
        self.branches.insert(branch.id(), branch);
    }

    fn create_persistent_root(
        &mut self,
        persistent_root: PersistentRootId,
        root_object: Uuid,
        branch: BranchId,
        branch_name: &str,
        initial_revision: RevisionId,
        metadata: &CommitMetadata,
    ) -> StoreResult<()> {
        if self.root(persistent_root).is_some() {
            return Err(StoreError::DuplicatePersistentRoot(persistent_root));
        }
        if self.branch(branch).is_some() {
            return Err(StoreError::DuplicateBranch(branch));
        }
        if self.revision_exists(initial_revision) {
            return Err(StoreError::DuplicateRevision(initial_revision));
        }
        if let Some(owner) = self.owner_of(root_object) {
            return Err(StoreError::ObjectOwnedElsewhere {
                uuid: root_object,
                owner,
            });
        }

        let number = self.take_number();
        let revision = Revision::new(
            initial_revision,
            number,
            persistent_root,
            branch,
            Vec::new(),
            metadata.clone(),
            ItemGraphDelta::new(root_object),
        );
        self.stage_revision(revision, ItemGraph::new(root_object));
        self.stage_branch(Branch::new(
            branch,
            branch_name,
            persistent_root,
            initial_revision,
            None,
            None,
        ));
        self.stage_root(PersistentRoot::new(persistent_root, root_object, branch));
        self.object_roots.insert(root_object, persistent_root);
        Ok(())
    }

    fn create_branch(
        &mut self,
        persistent_root: PersistentRootId,
        branch: BranchId,
        name: &str,
        parent_branch: BranchId,
        initial_revision: RevisionId,
    ) -> StoreResult<()> {
        let root = self.live_root(persistent_root)?.clone();
        if self.branch(branch).is_some() {
            return Err(StoreError::DuplicateBranch(branch));
        }
        let name_taken = root
            .branches()
            .iter()
            .filter_map(|id| self.branch(*id))
            .any(|existing| !existing.is_deleted() && existing.name() == name);
        if name_taken {
            return Err(StoreError::BranchNameTaken {
                persistent_root,
                name: name.to_string(),
            });
        }

        let parent_tip = self.branch_in_root(persistent_root, parent_branch)?.tip();
        if !self.revision_exists(initial_revision) {
            return Err(StoreError::RevisionNotFound(initial_revision));
        }
        if !is_ancestor(&*self, initial_revision, parent_tip) {
            return Err(StoreError::InvalidForkPoint {
                revision: initial_revision,
                parent_branch,
            });
        }

        let mut root = root;
        root.add_branch(branch);
        self.stage_root(root);
        self.stage_branch(Branch::new(
            branch,
            name,
            persistent_root,
            initial_revision,
            Some(parent_branch),
            Some(initial_revision),
        ));
        Ok(())
    }

    fn set_current_branch(
        &mut self,
        persistent_root: PersistentRootId,
        branch: BranchId,
    ) -> StoreResult<()> {
        self.branch_in_root(persistent_root, branch)?;
        let mut root = self.live_root(persistent_root)?.clone();
        root.set_current_branch(branch);
        self.stage_root(root);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_revision(
        &mut self,
        persistent_root: PersistentRootId,
        branch_id: BranchId,
        revision: RevisionId,
        parent_revision: RevisionId,
        merged_revisions: &[RevisionId],
        delta: &ItemGraphDelta,
        metadata: &CommitMetadata,
    ) -> StoreResult<()> {
        let root_object = self.live_root(persistent_root)?.root_object();
        let branch = self.branch_in_root(persistent_root, branch_id)?.clone();

        if self.revision_exists(revision) {
            return Err(StoreError::DuplicateRevision(revision));
        }
        if branch.tip() != parent_revision {
            return Err(StoreError::TipMoved {
                branch: branch_id,
                expected: parent_revision,
                actual: branch.tip(),
            });
        }
        for merged in merged_revisions {
            let owner = self
                .revision(*merged)
                .ok_or(StoreError::RevisionNotFound(*merged))?
                .persistent_root();
            if owner != persistent_root {
                return Err(StoreError::RevisionNotInRoot {
                    revision: *merged,
                    persistent_root,
                });
            }
        }
        if delta.root() != root_object {
            return Err(StoreError::RootObjectMismatch {
                persistent_root,
                expected: root_object,
                actual: delta.root(),
            });
        }
        for item in delta.items() {
            if let Some(owner) = self.owner_of(item.uuid()) {
                if owner != persistent_root {
                    return Err(StoreError::ObjectOwnedElsewhere {
                        uuid: item.uuid(),
                        owner,
                    });
                }
            }
        }

        let mut graph = materialize(&*self, root_object, parent_revision, |id| {
            self.cached_graph(id)
        })?;
        graph
            .apply(delta)
            .and_then(|_| graph.validate())
            .map_err(|source| StoreError::InvalidGraph {
                persistent_root,
                source,
            })?;

        let mut parents = vec![parent_revision];
        parents.extend(merged_revisions.iter().copied());
        let number = self.take_number();
        self.stage_revision(
            Revision::new(
                revision,
                number,
                persistent_root,
                branch_id,
                parents,
                metadata.clone(),
                delta.clone(),
            ),
            graph,
        );
        for item in delta.items() {
            self.object_roots.insert(item.uuid(), persistent_root);
        }

        let mut branch = branch;
        branch.set_tip(revision);
        self.stage_branch(branch);
        Ok(())
    }

    fn delete_branch(&mut self, persistent_root: PersistentRootId, branch_id: BranchId) -> StoreResult<()> {
        let mut branch = self.branch_in_root(persistent_root, branch_id)?.clone();
        if self.live_root(persistent_root)?.current_branch() == branch_id {
            return Err(StoreError::CannotDeleteCurrentBranch(branch_id));
        }
        branch.mark_deleted();
        self.stage_branch(branch);
        Ok(())
    }

    fn delete_persistent_root(&mut self, persistent_root: PersistentRootId) -> StoreResult<()> {
        let mut root = self.live_root(persistent_root)?.clone();
        let branches: Vec<Branch> = root
            .branches()
            .iter()
            .filter_map(|id| self.branch(*id).cloned())
            .collect();
        for mut branch in branches {
            branch.mark_deleted();
            self.stage_branch(branch);
        }
        root.mark_deleted();
        self.stage_root(root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Item, Value};

    struct Fixture {
        state: StoreState,
        cache: SnapshotCache,
        root: PersistentRootId,
        root_object: Uuid,
        main: BranchId,
        r0: RevisionId,
    }

    fn fixture() -> Fixture {
        let state = StoreState::default();
        let cache = SnapshotCache::new(8);
        let (root, root_object, main, r0) = (
            PersistentRootId::new(),
            Uuid::new_v4(),
            BranchId::new(),
            RevisionId::new(),
        );
        let staged = {
            let mut scope = TransactionScope::new(&state, &cache, RevisionNumber::new(1));
            scope
                .apply(&StoreAction::CreatePersistentRoot {
                    persistent_root: root,
                    root_object,
                    branch: main,
                    branch_name: "main".into(),
                    initial_revision: r0,
                    metadata: CommitMetadata::now(),
                })
                .unwrap();
            scope.into_staged()
        };
        let mut state = state;
        state.absorb(staged);
        Fixture {
            state,
            cache,
            root,
            root_object,
            main,
            r0,
        }
    }

    fn titled(uuid: Uuid, title: &str) -> ItemGraphDelta {
        let mut delta = ItemGraphDelta::new(uuid);
        delta.insert_item(
            Item::new(uuid, "Document", "docs", 1).with_value("title", Value::string(title)),
        );
        delta
    }

    #[test]
    fn test_later_action_sees_earlier_action() {
        let fx = fixture();
        let mut scope = TransactionScope::new(&fx.state, &fx.cache, RevisionNumber::new(2));
        let r1 = RevisionId::new();
        scope
            .apply(&StoreAction::WriteRevision {
                persistent_root: fx.root,
                branch: fx.main,
                revision: r1,
                parent_revision: fx.r0,
                merged_revisions: vec![],
                delta: titled(fx.root_object, "a"),
                metadata: CommitMetadata::now(),
            })
            .unwrap();
        scope
            .apply(&StoreAction::CreateBranch {
                persistent_root: fx.root,
                branch: BranchId::new(),
                name: "feature".into(),
                parent_branch: fx.main,
                initial_revision: r1,
            })
            .unwrap();

        let staged = scope.into_staged();
        assert_eq!(staged.revisions.len(), 1);
        assert_eq!(staged.revisions[0].number(), RevisionNumber::new(2));
        assert_eq!(staged.graphs.len(), 1);
        // Nothing reached the base state.
        assert_eq!(fx.state.branches[&fx.main].tip(), fx.r0);
    }

    #[test]
    fn test_stale_parent_is_tip_moved() {
        let fx = fixture();
        let mut scope = TransactionScope::new(&fx.state, &fx.cache, RevisionNumber::new(2));
        let err = scope
            .apply(&StoreAction::WriteRevision {
                persistent_root: fx.root,
                branch: fx.main,
                revision: RevisionId::new(),
                parent_revision: RevisionId::new(),
                merged_revisions: vec![],
                delta: titled(fx.root_object, "a"),
                metadata: CommitMetadata::now(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::TipMoved { .. }));
    }

    #[test]
    fn test_detached_item_is_invalid_graph() {
        let fx = fixture();
        let mut delta = titled(fx.root_object, "a");
        delta.insert_item(Item::new(Uuid::new_v4(), "Note", "docs", 1));
        let mut scope = TransactionScope::new(&fx.state, &fx.cache, RevisionNumber::new(2));
        let err = scope
            .apply(&StoreAction::WriteRevision {
                persistent_root: fx.root,
                branch: fx.main,
                revision: RevisionId::new(),
                parent_revision: fx.r0,
                merged_revisions: vec![],
                delta,
                metadata: CommitMetadata::now(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidGraph { .. }));
    }

    #[test]
    fn test_cannot_delete_current_branch() {
        let fx = fixture();
        let mut scope = TransactionScope::new(&fx.state, &fx.cache, RevisionNumber::new(2));
        let err = scope
            .apply(&StoreAction::DeleteBranch {
                persistent_root: fx.root,
                branch: fx.main,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::CannotDeleteCurrentBranch(_)));
    }

    #[test]
    fn test_delete_root_marks_branches() {
        let fx = fixture();
        let mut scope = TransactionScope::new(&fx.state, &fx.cache, RevisionNumber::new(2));
        scope
            .apply(&StoreAction::DeletePersistentRoot {
                persistent_root: fx.root,
            })
            .unwrap();
        let err = scope
            .apply(&StoreAction::SetCurrentBranch {
                persistent_root: fx.root,
                branch: fx.main,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::DeletedRoot(_)));

        let staged = scope.into_staged();
        assert!(staged.branches.iter().all(Branch::is_deleted));
        assert!(staged.roots.iter().all(PersistentRoot::is_deleted));
    }
}
