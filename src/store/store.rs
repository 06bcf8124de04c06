//! The store handle
//!
//! A `Store` is a cheap, cloneable, thread-safe handle. Every mutation goes
//! through [`Store::commit`], which runs under the store lock:
//!
//! 1. validate every action in a staging overlay
//! 2. encode the staged records and write them as one backend batch
//! 3. absorb the staged changes and publish the new revision numbers
//!
//! A failure in 1 or 2 leaves the committed state exactly as it was.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::cache::SnapshotCache;
use super::errors::{StoreError, StoreResult};
use super::state::{StagedChanges, StoreState, TransactionScope};
use super::{StoreAction, StoreTransaction, TransactionReceipt};
use crate::backend::{Backend, BackendRecord, FileBackend, MemoryBackend, RecordKey};
use crate::config::StoreConfig;
use crate::item::{Item, ItemGraph, ItemGraphDelta};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::revision::{
    commit_track_ids, is_ancestor, lowest_common_ancestor, materialize, Branch, BranchId,
    CommitMetadata, CommitTrack, PersistentRoot, PersistentRootId, Revision, RevisionId,
    RevisionNumber, RevisionNumberAuthority,
};

struct StoreInner {
    config: StoreConfig,
    state: StoreState,
    backend: Box<dyn Backend>,
    authority: RevisionNumberAuthority,
    snapshots: SnapshotCache,
}

/// Shared handle to a versioned object store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Store")
            .field("persistent_roots", &inner.state.roots.len())
            .field("revisions", &inner.state.revisions.len())
            .field("data_dir", &inner.config.data_dir)
            .finish()
    }
}

impl Store {
    /// Empty store with an in-memory backend.
    pub fn in_memory() -> Self {
        let config = StoreConfig::in_memory();
        let snapshots = SnapshotCache::new(config.snapshot_cache_capacity);
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                config,
                state: StoreState::default(),
                backend: Box::new(MemoryBackend::new()),
                authority: RevisionNumberAuthority::new(),
                snapshots,
            })),
        }
    }

    /// Opens the store described by `config`.
    ///
    /// With a data directory the file backend is used and its records are
    /// replayed; without one the store starts empty in memory. Also applies
    /// the configured log level.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        Logger::set_min_severity(config.log_level);
        let backend: Box<dyn Backend> = match &config.data_dir {
            Some(dir) => Box::new(FileBackend::open(dir, config.sync_writes)?),
            None => Box::new(MemoryBackend::new()),
        };
        Self::with_backend(backend, config.clone())
    }

    /// Builds a store over an existing backend, replaying its records.
    pub fn with_backend(mut backend: Box<dyn Backend>, config: StoreConfig) -> StoreResult<Self> {
        let mut state = StoreState::default();
        let mut authority = RevisionNumberAuthority::new();

        for key in backend.keys() {
            let body = match backend.read(&key)? {
                Some(body) => body,
                None => continue,
            };
            match key {
                RecordKey::PersistentRoot(_) => {
                    state.restore_root(serde_json::from_slice::<PersistentRoot>(&body)?)
                }
                RecordKey::Branch(_) => {
                    state.restore_branch(serde_json::from_slice::<Branch>(&body)?)
                }
                RecordKey::Revision(_) => {
                    let revision: Revision = serde_json::from_slice(&body)?;
                    authority.observe_replayed(revision.number())?;
                    state.restore_revision(revision);
                }
            }
        }

        log_event_with_fields(
            Event::StoreOpened,
            &[
                ("persistent_roots", &state.roots.len().to_string()),
                ("branches", &state.branches.len().to_string()),
                ("revisions", &state.revisions.len().to_string()),
                (
                    "data_dir",
                    &config
                        .data_dir
                        .as_ref()
                        .map(|dir| dir.display().to_string())
                        .unwrap_or_else(|| "<memory>".into()),
                ),
            ],
        );

        let snapshots = SnapshotCache::new(config.snapshot_cache_capacity);
        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner {
                config,
                state,
                backend,
                authority,
                snapshots,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // State is only mutated after every fallible step, so a panic
        // elsewhere cannot leave it half-applied.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> StoreConfig {
        self.lock().config.clone()
    }

    /// Applies a transaction atomically.
    pub fn commit(&self, transaction: &StoreTransaction) -> StoreResult<TransactionReceipt> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let result = Self::stage(inner, transaction).and_then(|staged| {
            let records = encode_records(&staged)?;
            inner.backend.write_batch(&records)?;
            Ok(staged)
        });

        let staged = match result {
            Ok(staged) => staged,
            Err(err) => {
                log_event_with_fields(
                    Event::TransactionRejected,
                    &[
                        ("actions", &transaction.len().to_string()),
                        ("code", err.code()),
                        ("error", &err.to_string()),
                    ],
                );
                return Err(err);
            }
        };

        let mut receipt = Vec::with_capacity(staged.revisions.len());
        for revision in &staged.revisions {
            inner.authority.mark_committed(revision.number())?;
            receipt.push((revision.id(), revision.number()));
        }
        for (revision, graph) in &staged.graphs {
            inner.snapshots.insert(*revision, Arc::clone(graph));
        }
        inner.state.absorb(staged);

        let roots = transaction
            .persistent_roots()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        log_event_with_fields(
            Event::TransactionCommitted,
            &[
                ("actions", &transaction.len().to_string()),
                ("revisions", &receipt.len().to_string()),
                ("persistent_roots", &roots),
            ],
        );
        Ok(TransactionReceipt::new(receipt))
    }

    fn stage(inner: &StoreInner, transaction: &StoreTransaction) -> StoreResult<StagedChanges> {
        let mut scope = TransactionScope::new(
            &inner.state,
            &inner.snapshots,
            inner.authority.next_number(),
        );
        for action in transaction.actions() {
            scope.apply(action)?;
        }
        Ok(scope.into_staged())
    }

    // ---- read API ----

    /// Live persistent root.
    pub fn persistent_root(&self, id: PersistentRootId) -> StoreResult<PersistentRoot> {
        self.lock().state.live_root(id).cloned()
    }

    /// Ids of every live persistent root, sorted.
    pub fn persistent_root_ids(&self) -> Vec<PersistentRootId> {
        let inner = self.lock();
        let mut ids: Vec<_> = inner
            .state
            .roots
            .values()
            .filter(|root| !root.is_deleted())
            .map(PersistentRoot::id)
            .collect();
        ids.sort();
        ids
    }

    /// Live branch of a live root.
    pub fn branch(&self, id: BranchId) -> StoreResult<Branch> {
        self.lock().state.live_branch(id).cloned()
    }

    /// Live branches of a root, sorted by name.
    pub fn branches(&self, persistent_root: PersistentRootId) -> StoreResult<Vec<Branch>> {
        let inner = self.lock();
        let root = inner.state.live_root(persistent_root)?;
        let mut branches: Vec<Branch> = root
            .branches()
            .iter()
            .filter_map(|id| inner.state.branches.get(id))
            .filter(|branch| !branch.is_deleted())
            .cloned()
            .collect();
        branches.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(branches)
    }

    /// Live branch of `persistent_root` called `name`.
    pub fn branch_named(&self, persistent_root: PersistentRootId, name: &str) -> StoreResult<Branch> {
        self.branches(persistent_root)?
            .into_iter()
            .find(|branch| branch.name() == name)
            .ok_or_else(|| StoreError::BranchNameNotFound {
                persistent_root,
                name: name.to_string(),
            })
    }

    pub fn current_branch(&self, persistent_root: PersistentRootId) -> StoreResult<Branch> {
        let inner = self.lock();
        let current = inner.state.live_root(persistent_root)?.current_branch();
        inner.state.live_branch(current).cloned()
    }

    /// Tip of the root's current branch.
    pub fn tip_revision(&self, persistent_root: PersistentRootId) -> StoreResult<Arc<Revision>> {
        let inner = self.lock();
        let current = inner.state.live_root(persistent_root)?.current_branch();
        let tip = inner.state.live_branch(current)?.tip();
        inner.state.live_revision(tip).cloned()
    }

    pub fn revision(&self, id: RevisionId) -> StoreResult<Arc<Revision>> {
        self.lock().state.live_revision(id).cloned()
    }

    /// History of a branch, tip first.
    pub fn commit_track(&self, branch: BranchId) -> StoreResult<CommitTrack> {
        let tip = self.branch(branch)?.tip();
        self.commit_track_from(tip)
    }

    /// First-parent history from `revision`, `revision` first.
    pub fn commit_track_from(&self, revision: RevisionId) -> StoreResult<CommitTrack> {
        let inner = self.lock();
        inner.state.live_revision(revision)?;
        let revisions = commit_track_ids(&inner.state, revision)?
            .into_iter()
            .filter_map(|id| inner.state.revisions.get(&id).cloned())
            .collect();
        Ok(CommitTrack::new(revisions))
    }

    /// Whether `ancestor` is in the history of `descendant`.
    pub fn is_ancestor(&self, ancestor: RevisionId, descendant: RevisionId) -> StoreResult<bool> {
        let inner = self.lock();
        inner.state.live_revision(ancestor)?;
        inner.state.live_revision(descendant)?;
        Ok(is_ancestor(&inner.state, ancestor, descendant))
    }

    /// Highest-numbered common ancestor of two revisions.
    pub fn lowest_common_ancestor(
        &self,
        a: RevisionId,
        b: RevisionId,
    ) -> StoreResult<Option<RevisionId>> {
        let inner = self.lock();
        inner.state.live_revision(a)?;
        inner.state.live_revision(b)?;
        Ok(lowest_common_ancestor(&inner.state, a, b))
    }

    /// Full item graph of `persistent_root` at `revision`.
    pub fn item_graph(
        &self,
        persistent_root: PersistentRootId,
        revision: RevisionId,
    ) -> StoreResult<Arc<ItemGraph>> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let root_object = inner.state.live_root(persistent_root)?.root_object();
        let owner = inner.state.live_revision(revision)?.persistent_root();
        if owner != persistent_root {
            return Err(StoreError::RevisionNotInRoot {
                revision,
                persistent_root,
            });
        }
        if let Some(graph) = inner.snapshots.get(revision) {
            return Ok(graph);
        }

        let snapshots = &inner.snapshots;
        let graph = Arc::new(materialize(&inner.state, root_object, revision, |id| {
            snapshots.get(id)
        })?);
        inner.snapshots.insert(revision, Arc::clone(&graph));
        Ok(graph)
    }

    /// The item for `uuid` in `persistent_root` at `revision`.
    pub fn item(
        &self,
        persistent_root: PersistentRootId,
        uuid: Uuid,
        revision: RevisionId,
    ) -> StoreResult<Item> {
        self.item_graph(persistent_root, revision)?
            .item(uuid)
            .cloned()
            .ok_or(StoreError::ItemNotFound { uuid, revision })
    }

    /// The live persistent root that owns object `uuid`.
    pub fn persistent_root_for_object(&self, uuid: Uuid) -> StoreResult<PersistentRootId> {
        let inner = self.lock();
        let root = *inner
            .state
            .object_roots
            .get(&uuid)
            .ok_or(StoreError::ObjectNotFound(uuid))?;
        inner.state.live_root(root)?;
        Ok(root)
    }

    pub fn highest_revision_number(&self) -> Option<RevisionNumber> {
        self.lock().authority.highest()
    }

    // ---- single-action conveniences ----

    /// Creates a persistent root with one branch at an empty root revision.
    pub fn create_persistent_root(
        &self,
        root_object: Uuid,
        branch_name: &str,
        metadata: CommitMetadata,
    ) -> StoreResult<PersistentRoot> {
        let persistent_root = PersistentRootId::new();
        self.commit(&StoreTransaction::new().with(StoreAction::CreatePersistentRoot {
            persistent_root,
            root_object,
            branch: BranchId::new(),
            branch_name: branch_name.to_string(),
            initial_revision: RevisionId::new(),
            metadata,
        }))?;
        self.persistent_root(persistent_root)
    }

    /// Forks `parent_branch` at `initial_revision`.
    pub fn create_branch(
        &self,
        persistent_root: PersistentRootId,
        name: &str,
        parent_branch: BranchId,
        initial_revision: RevisionId,
    ) -> StoreResult<Branch> {
        let branch = BranchId::new();
        self.commit(&StoreTransaction::new().with(StoreAction::CreateBranch {
            persistent_root,
            branch,
            name: name.to_string(),
            parent_branch,
            initial_revision,
        }))?;
        self.branch(branch)
    }

    pub fn set_current_branch(
        &self,
        persistent_root: PersistentRootId,
        branch: BranchId,
    ) -> StoreResult<()> {
        self.commit(&StoreTransaction::new().with(StoreAction::SetCurrentBranch {
            persistent_root,
            branch,
        }))
        .map(|_| ())
    }

    /// Appends one revision on `branch` on top of `parent_revision`.
    pub fn write_revision(
        &self,
        persistent_root: PersistentRootId,
        branch: BranchId,
        parent_revision: RevisionId,
        delta: ItemGraphDelta,
        metadata: CommitMetadata,
    ) -> StoreResult<Arc<Revision>> {
        let revision = RevisionId::new();
        self.commit(&StoreTransaction::new().with(StoreAction::WriteRevision {
            persistent_root,
            branch,
            revision,
            parent_revision,
            merged_revisions: Vec::new(),
            delta,
            metadata,
        }))?;
        self.revision(revision)
    }

    pub fn delete_persistent_root(&self, persistent_root: PersistentRootId) -> StoreResult<()> {
        self.commit(
            &StoreTransaction::new().with(StoreAction::DeletePersistentRoot { persistent_root }),
        )
        .map(|_| ())
    }
}

fn encode_records(staged: &StagedChanges) -> StoreResult<Vec<BackendRecord>> {
    let mut records = Vec::with_capacity(
        staged.roots.len() + staged.branches.len() + staged.revisions.len(),
    );
    for revision in &staged.revisions {
        records.push(BackendRecord::new(
            RecordKey::Revision(revision.id()),
            serde_json::to_vec(revision.as_ref())?,
        ));
    }
    for branch in &staged.branches {
        records.push(BackendRecord::new(
            RecordKey::Branch(branch.id()),
            serde_json::to_vec(branch)?,
        ));
    }
    for root in &staged.roots {
        records.push(BackendRecord::new(
            RecordKey::PersistentRoot(root.id()),
            serde_json::to_vec(root)?,
        ));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult};
    use crate::item::Value;

    fn titled(uuid: Uuid, title: &str) -> ItemGraphDelta {
        let mut delta = ItemGraphDelta::new(uuid);
        delta.insert_item(
            Item::new(uuid, "Document", "docs", 1).with_value("title", Value::string(title)),
        );
        delta
    }

    struct FailingBackend;

    impl Backend for FailingBackend {
        fn write_batch(&mut self, _records: &[BackendRecord]) -> BackendResult<()> {
            Err(BackendError::write_failed_no_source("disk full"))
        }

        fn read(&mut self, _key: &RecordKey) -> BackendResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn keys(&self) -> Vec<RecordKey> {
            Vec::new()
        }
    }

    #[test]
    fn test_create_root_starts_with_empty_revision() {
        let store = Store::in_memory();
        let object = Uuid::new_v4();
        let root = store
            .create_persistent_root(object, "main", CommitMetadata::now())
            .unwrap();

        let tip = store.tip_revision(root.id()).unwrap();
        assert!(tip.is_root());
        assert_eq!(tip.number(), RevisionNumber::new(1));
        assert!(store.item_graph(root.id(), tip.id()).unwrap().is_empty());
        assert_eq!(store.persistent_root_for_object(object).unwrap(), root.id());
    }

    #[test]
    fn test_write_revision_advances_tip() {
        let store = Store::in_memory();
        let object = Uuid::new_v4();
        let root = store
            .create_persistent_root(object, "main", CommitMetadata::now())
            .unwrap();
        let r0 = store.tip_revision(root.id()).unwrap().id();

        let r1 = store
            .write_revision(
                root.id(),
                root.current_branch(),
                r0,
                titled(object, "a"),
                CommitMetadata::now(),
            )
            .unwrap();
        assert_eq!(r1.parent(), Some(r0));
        assert_eq!(store.current_branch(root.id()).unwrap().tip(), r1.id());
        let item = store.item(root.id(), object, r1.id()).unwrap();
        assert_eq!(item.value("title"), Some(&Value::string("a")));
        assert!(store.item(root.id(), object, r0).unwrap_err().is_not_found());
    }

    #[test]
    fn test_backend_failure_leaves_state_untouched() {
        let store = Store::with_backend(Box::new(FailingBackend), StoreConfig::in_memory()).unwrap();
        let err = store
            .create_persistent_root(Uuid::new_v4(), "main", CommitMetadata::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(store.persistent_root_ids().is_empty());
        assert!(store.highest_revision_number().is_none());
    }

    #[test]
    fn test_revision_numbers_increase_across_roots() {
        let store = Store::in_memory();
        let a = store
            .create_persistent_root(Uuid::new_v4(), "main", CommitMetadata::now())
            .unwrap();
        let b = store
            .create_persistent_root(Uuid::new_v4(), "main", CommitMetadata::now())
            .unwrap();
        let na = store.tip_revision(a.id()).unwrap().number();
        let nb = store.tip_revision(b.id()).unwrap().number();
        assert!(na < nb);
        assert_eq!(store.highest_revision_number(), Some(nb));
    }

    #[test]
    fn test_graph_of_other_root_revision_rejected() {
        let store = Store::in_memory();
        let a = store
            .create_persistent_root(Uuid::new_v4(), "main", CommitMetadata::now())
            .unwrap();
        let b = store
            .create_persistent_root(Uuid::new_v4(), "main", CommitMetadata::now())
            .unwrap();
        let b_tip = store.tip_revision(b.id()).unwrap().id();
        assert!(matches!(
            store.item_graph(a.id(), b_tip),
            Err(StoreError::RevisionNotInRoot { .. })
        ));
    }
}
