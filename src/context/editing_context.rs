//! EditingContext - the in-memory working copy
//!
//! A context holds live proxies for objects drawn from one store. Objects
//! are faulted in lazily from the revision the context has loaded for their
//! persistent root. Every property write is recorded in the damaged map;
//! commit turns the damage into one transaction per persistent root.
//!
//! Contexts are isolated from one another: a commit in one context is seen
//! by another only after that context reloads the affected root.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::errors::{ContextError, ContextResult};
use super::object::{write_property, CoObject, ObjectMut, ObjectOwner};
use crate::config::ContextConfig;
use crate::item::{ItemGraph, Value};
use crate::metamodel::{
    EntityDescription, FactoryRegistry, ModelRepository, ObjectFactory, PropertyDescription,
};
use crate::migration::{MigrationError, MigrationRegistry};
use crate::observability::{trace_event_with_fields, Event};
use crate::revision::{
    BranchId, CommitTrack, PersistentRootId, Revision, RevisionId, RevisionNumber,
};
use crate::store::{Store, StoreError};

/// A persistent root created in this context and not yet committed.
///
/// Its identifiers are allocated up front so proxies can refer to the root
/// before the store knows about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingRoot {
    pub(crate) root_object: Uuid,
    pub(crate) branch: BranchId,
    pub(crate) initial_revision: RevisionId,
}

/// Working copy over a [`Store`].
pub struct EditingContext {
    pub(super) store: Store,
    pub(super) model: Arc<ModelRepository>,
    pub(super) migrations: Arc<MigrationRegistry>,
    pub(super) factories: HashMap<String, Arc<dyn ObjectFactory>>,
    pub(super) config: ContextConfig,

    /// Identity map: at most one proxy per UUID.
    pub(super) objects: HashMap<Uuid, CoObject>,
    pub(super) pending_roots: BTreeMap<PersistentRootId, PendingRoot>,
    /// Revision each touched root is read at and committed on top of.
    pub(super) root_revisions: HashMap<PersistentRootId, RevisionId>,
    pub(super) root_branches: HashMap<PersistentRootId, BranchId>,

    pub(super) inserted: BTreeSet<Uuid>,
    pub(super) deleted: BTreeSet<Uuid>,
    pub(super) deleted_roots: BTreeSet<PersistentRootId>,
    /// Object -> names of properties written since the last commit.
    pub(super) damaged: BTreeMap<Uuid, BTreeSet<String>>,
}

impl fmt::Debug for EditingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditingContext")
            .field("objects", &self.objects.len())
            .field("pending_roots", &self.pending_roots.len())
            .field("inserted", &self.inserted)
            .field("deleted", &self.deleted)
            .field("damaged", &self.damaged)
            .finish()
    }
}

impl EditingContext {
    /// Context with a default factory for every entity and no migrations.
    pub fn new(store: Store, model: Arc<ModelRepository>) -> Self {
        let factories = resolve_factories(&model, &FactoryRegistry::with_defaults(&model));
        Self {
            store,
            model,
            migrations: Arc::new(MigrationRegistry::new()),
            factories,
            config: ContextConfig::default(),
            objects: HashMap::new(),
            pending_roots: BTreeMap::new(),
            root_revisions: HashMap::new(),
            root_branches: HashMap::new(),
            inserted: BTreeSet::new(),
            deleted: BTreeSet::new(),
            deleted_roots: BTreeSet::new(),
            damaged: BTreeMap::new(),
        }
    }

    /// Migrations applied to every item faulted in.
    pub fn with_migrations(mut self, migrations: Arc<MigrationRegistry>) -> Self {
        self.migrations = migrations;
        self
    }

    /// Replaces the factories. Resolved once, here; entities missing from
    /// `registry` cannot be instantiated by this context.
    pub fn with_factories(mut self, registry: &FactoryRegistry) -> Self {
        self.factories = resolve_factories(&self.model, registry);
        self
    }

    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn model(&self) -> &ModelRepository {
        &self.model
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    // ---- persistent roots ----

    /// Revision this context reads `persistent_root` at.
    ///
    /// Resolved on first use from the root's current branch (or the branch
    /// selected with `switch_branch`) and then held until commit or reload.
    /// A configured `max_revision_number` picks the newest revision on that
    /// branch numbered at or below the limit.
    pub fn revision_for_root(&mut self, persistent_root: PersistentRootId) -> ContextResult<RevisionId> {
        if let Some(revision) = self.root_revisions.get(&persistent_root) {
            return Ok(*revision);
        }
        if self.pending_roots.contains_key(&persistent_root) {
            return Err(ContextError::RootNotCommitted(persistent_root));
        }
        let branch = self.branch_for_root(persistent_root)?;
        let revision = self.resolve_revision(persistent_root, branch)?;
        self.root_branches.insert(persistent_root, branch);
        self.root_revisions.insert(persistent_root, revision);
        Ok(revision)
    }

    /// Branch this context commits to for `persistent_root`.
    pub fn branch_for_root(&self, persistent_root: PersistentRootId) -> ContextResult<BranchId> {
        if let Some(pending) = self.pending_roots.get(&persistent_root) {
            return Ok(pending.branch);
        }
        match self.root_branches.get(&persistent_root) {
            Some(branch) => Ok(*branch),
            None => Ok(self.store.current_branch(persistent_root)?.id()),
        }
    }

    /// First-parent history of the revision this context reads the root at.
    pub fn commit_track_for_root(&mut self, persistent_root: PersistentRootId) -> ContextResult<CommitTrack> {
        let revision = self.revision_for_root(persistent_root)?;
        Ok(self.store.commit_track_from(revision)?)
    }

    /// Persistent root owning `uuid`, resident or not.
    pub fn persistent_root_of(&self, uuid: Uuid) -> ContextResult<PersistentRootId> {
        if let Some(proxy) = self.objects.get(&uuid) {
            return Ok(proxy.persistent_root());
        }
        self.store
            .persistent_root_for_object(uuid)
            .map_err(|err| match err {
                StoreError::ObjectNotFound(uuid) => ContextError::ObjectNotFound(uuid),
                other => other.into(),
            })
    }

    pub fn root_object_of(&self, persistent_root: PersistentRootId) -> ContextResult<Uuid> {
        match self.pending_roots.get(&persistent_root) {
            Some(pending) => Ok(pending.root_object),
            None => Ok(self.store.persistent_root(persistent_root)?.root_object()),
        }
    }

    /// Whether `persistent_root` was created here and not committed yet.
    pub fn is_pending_root(&self, persistent_root: PersistentRootId) -> bool {
        self.pending_roots.contains_key(&persistent_root)
    }

    pub(super) fn resolve_revision(
        &self,
        persistent_root: PersistentRootId,
        branch: BranchId,
    ) -> ContextResult<RevisionId> {
        let branch = self.store.branch(branch)?;
        let Some(max) = self.config.max_revision_number else {
            return Ok(branch.tip());
        };
        let max = RevisionNumber::new(max);
        self.store
            .commit_track(branch.id())?
            .latest_at_or_below(max)
            .map(Revision::id)
            .ok_or(ContextError::NoRevisionAtOrBelow {
                persistent_root,
                max,
            })
    }

    pub(super) fn ensure_editable_root(&mut self, persistent_root: PersistentRootId) -> ContextResult<()> {
        if self.deleted_roots.contains(&persistent_root) {
            return Err(StoreError::DeletedRoot(persistent_root).into());
        }
        if !self.pending_roots.contains_key(&persistent_root) {
            self.revision_for_root(persistent_root)?;
        }
        Ok(())
    }

    // ---- lookup ----

    /// The resident proxy for `uuid`, or a new fault for it.
    ///
    /// A fault is only created when the item exists at the revision the
    /// context reads its persistent root at.
    pub fn object_with_uuid(&mut self, uuid: Uuid) -> ContextResult<&CoObject> {
        if !self.objects.contains_key(&uuid) {
            let persistent_root = self.persistent_root_of(uuid)?;
            let revision = self.revision_for_root(persistent_root)?;
            let graph = self.store.item_graph(persistent_root, revision)?;
            let item = graph.item(uuid).ok_or(ContextError::ObjectNotFound(uuid))?;
            self.objects.insert(
                uuid,
                CoObject::fault(uuid, item.entity(), persistent_root, None),
            );
        }
        self.objects
            .get(&uuid)
            .ok_or(ContextError::ObjectNotFound(uuid))
    }

    /// Proxy for `uuid` pinned at `revision`.
    ///
    /// A resident proxy is re-pinned and dropped back to a fault if it was
    /// loaded from another revision. Refused for objects with uncommitted
    /// changes.
    pub fn object_with_uuid_at(&mut self, uuid: Uuid, revision: RevisionId) -> ContextResult<&CoObject> {
        let persistent_root = self.persistent_root_of(uuid)?;
        let graph = self.store.item_graph(persistent_root, revision)?;
        let item = graph
            .item(uuid)
            .ok_or(StoreError::ItemNotFound { uuid, revision })?;

        match self.objects.get_mut(&uuid) {
            Some(proxy) => {
                if self.damaged.contains_key(&uuid)
                    || self.inserted.contains(&uuid)
                    || self.deleted.contains(&uuid)
                {
                    return Err(ContextError::ObjectHasChanges(uuid));
                }
                if proxy.loaded_revision() != Some(revision) {
                    proxy.refault();
                }
                proxy.pin(Some(revision));
            }
            None => {
                self.objects.insert(
                    uuid,
                    CoObject::fault(uuid, item.entity(), persistent_root, Some(revision)),
                );
            }
        }
        self.objects
            .get(&uuid)
            .ok_or(ContextError::ObjectNotFound(uuid))
    }

    /// Like [`object_with_uuid`](Self::object_with_uuid), with the fault resolved.
    pub fn loaded_object(&mut self, uuid: Uuid) -> ContextResult<&CoObject> {
        self.object_with_uuid(uuid)?;
        self.load_object(uuid)?;
        self.objects
            .get(&uuid)
            .ok_or(ContextError::ObjectNotFound(uuid))
    }

    pub fn object_mut(&mut self, uuid: Uuid) -> ContextResult<ObjectMut<'_>> {
        self.object_with_uuid(uuid)?;
        Ok(ObjectMut::new(self, uuid))
    }

    pub fn is_resident(&self, uuid: Uuid) -> bool {
        self.objects.contains_key(&uuid)
    }

    // ---- property access ----

    pub fn value(&mut self, uuid: Uuid, property: &str) -> ContextResult<Option<Value>> {
        Ok(self.loaded_object(uuid)?.value(property).cloned())
    }

    /// Writes a property and marks it damaged.
    ///
    /// The value must match the property's declared type and multiplicity.
    pub fn set_value(&mut self, uuid: Uuid, property: &str, value: Value) -> ContextResult<()> {
        self.check_writable(uuid, property, Some(&value))?;
        write_property(self, uuid, property, Some(value))
    }

    pub fn remove_value(&mut self, uuid: Uuid, property: &str) -> ContextResult<()> {
        self.check_writable(uuid, property, None)?;
        write_property(self, uuid, property, None)
    }

    fn check_writable(&mut self, uuid: Uuid, property: &str, value: Option<&Value>) -> ContextResult<()> {
        if self.deleted.contains(&uuid) {
            return Err(ContextError::ObjectDeleted(uuid));
        }
        let entity = self.loaded_object(uuid)?.entity().to_string();
        let Some(description) = self
            .model
            .entity(&entity)
            .and_then(|e| e.property(property))
        else {
            return Err(ContextError::UnknownProperty {
                entity,
                property: property.to_string(),
            });
        };
        match value {
            Some(value) if !description.accepts(value) => Err(ContextError::PropertyTypeMismatch {
                expected: description.expected_shape(),
                found: value.type_name(),
                entity,
                property: property.to_string(),
            }),
            _ => Ok(()),
        }
    }

    // ---- insert / delete ----

    /// Inserts a new object as the root object of a new persistent root.
    ///
    /// The persistent root is created in the store at the next commit.
    pub fn insert_object(&mut self, entity: &str) -> ContextResult<Uuid> {
        let uuid = Uuid::new_v4();
        let persistent_root = PersistentRootId::new();
        let proxy = self.instantiate(uuid, entity, persistent_root)?;

        self.pending_roots.insert(
            persistent_root,
            PendingRoot {
                root_object: uuid,
                branch: BranchId::new(),
                initial_revision: RevisionId::new(),
            },
        );
        self.objects.insert(uuid, proxy);
        self.inserted.insert(uuid);
        Ok(uuid)
    }

    /// Inserts a new object into the persistent root that owns `owner`.
    ///
    /// The caller attaches it through a composite reference before commit;
    /// a detached object fails graph validation.
    pub fn insert_object_in(&mut self, entity: &str, owner: Uuid) -> ContextResult<Uuid> {
        let persistent_root = self.persistent_root_of(owner)?;
        self.ensure_editable_root(persistent_root)?;
        let uuid = Uuid::new_v4();
        let proxy = self.instantiate(uuid, entity, persistent_root)?;
        self.objects.insert(uuid, proxy);
        self.inserted.insert(uuid);
        Ok(uuid)
    }

    pub(super) fn instantiate(
        &self,
        uuid: Uuid,
        entity: &str,
        persistent_root: PersistentRootId,
    ) -> ContextResult<CoObject> {
        let description = self
            .model
            .entity(entity)
            .ok_or_else(|| ContextError::UnknownEntity(entity.to_string()))?;
        let factory = self
            .factories
            .get(entity)
            .ok_or_else(|| ContextError::NoFactoryForEntity(entity.to_string()))?;
        let version = self
            .model
            .package_version(&description.package)
            .ok_or_else(|| MigrationError::UnknownPackage(description.package.clone()))?;

        Ok(CoObject::inserted(
            uuid,
            &description.name,
            &description.package,
            version,
            persistent_root,
            factory.instantiate(description),
        ))
    }

    /// Schedules `uuid` and everything it owns for removal at commit.
    ///
    /// Deleting a root object schedules deletion of its persistent root.
    /// Otherwise the composite reference held by the owner is removed, which
    /// damages the owner's property. Deleted objects stay readable until
    /// commit.
    pub fn delete_object(&mut self, uuid: Uuid) -> ContextResult<()> {
        if self.deleted.contains(&uuid) {
            return Ok(());
        }
        let persistent_root = self.persistent_root_of(uuid)?;
        let subtree = self.composite_subtree(uuid)?;
        if self.root_object_of(persistent_root)? == uuid {
            self.deleted_roots.insert(persistent_root);
        } else if let Some((owner, property)) = self.composite_owner(persistent_root, uuid)? {
            let detached = self
                .value(owner, &property)?
                .and_then(|value| value.without_composite(uuid));
            write_property(self, owner, &property, detached)?;
        }
        self.deleted.extend(subtree);
        Ok(())
    }

    /// Object and property holding the composite reference to `child`.
    ///
    /// Loaded proxies are searched first; objects not loaded are found
    /// through the graph at the revision the root is read at.
    fn composite_owner(
        &mut self,
        persistent_root: PersistentRootId,
        child: Uuid,
    ) -> ContextResult<Option<(Uuid, String)>> {
        let resident = self
            .objects
            .values()
            .filter(|proxy| {
                proxy.persistent_root() == persistent_root
                    && !proxy.is_fault()
                    && !self.deleted.contains(&proxy.uuid())
            })
            .find_map(|proxy| {
                self.owning_property(proxy, child)
                    .map(|property| (proxy.uuid(), property))
            });
        if resident.is_some() || self.pending_roots.contains_key(&persistent_root) {
            return Ok(resident);
        }

        let revision = self.revision_for_root(persistent_root)?;
        let graph = self.store.item_graph(persistent_root, revision)?;
        let stored_owner = graph
            .items()
            .filter(|item| self.objects.get(&item.uuid()).map_or(true, CoObject::is_fault))
            .find(|item| item.composite_children().contains(&child))
            .map(|item| item.uuid());
        let Some(owner) = stored_owner else {
            return Ok(None);
        };
        self.loaded_object(owner)?;
        Ok(self
            .objects
            .get(&owner)
            .and_then(|proxy| self.owning_property(proxy, child))
            .map(|property| (owner, property)))
    }

    fn owning_property(&self, proxy: &CoObject, child: Uuid) -> Option<String> {
        let entity = self.model.entity(proxy.entity());
        proxy
            .values()
            .iter()
            .find(|(property, value)| {
                declared_composite(entity, property) && value.composite_children().contains(&child)
            })
            .map(|(property, _)| property.clone())
    }

    /// Objects `proxy` owns through properties the metamodel declares composite.
    pub(super) fn owned_children(&self, proxy: &CoObject) -> Vec<Uuid> {
        let entity = self.model.entity(proxy.entity());
        proxy
            .values()
            .iter()
            .filter(|(property, _)| declared_composite(entity, property))
            .flat_map(|(_, value)| value.composite_children())
            .collect()
    }

    /// `uuid` followed by everything it transitively owns, loading as needed.
    pub(super) fn composite_subtree(&mut self, uuid: Uuid) -> ContextResult<Vec<Uuid>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![uuid];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            self.loaded_object(next)?;
            let mut children = self
                .objects
                .get(&next)
                .map(|proxy| self.owned_children(proxy))
                .unwrap_or_default();
            out.push(next);
            children.reverse();
            stack.extend(children);
        }
        Ok(out)
    }

    // ---- change tracking ----

    pub fn has_changes(&self) -> bool {
        !self.inserted.is_empty()
            || !self.deleted.is_empty()
            || !self.damaged.is_empty()
            || !self.deleted_roots.is_empty()
    }

    pub fn object_has_changes(&self, uuid: Uuid) -> bool {
        self.damaged.contains_key(&uuid)
    }

    /// Existing objects with damaged properties. Excludes inserted and deleted objects.
    pub fn changed_object_uuids(&self) -> BTreeSet<Uuid> {
        self.damaged
            .keys()
            .filter(|uuid| !self.inserted.contains(uuid) && !self.deleted.contains(uuid))
            .copied()
            .collect()
    }

    pub fn inserted_object_uuids(&self) -> &BTreeSet<Uuid> {
        &self.inserted
    }

    pub fn deleted_object_uuids(&self) -> &BTreeSet<Uuid> {
        &self.deleted
    }

    /// Properties of `uuid` written since the last commit.
    pub fn damaged_properties(&self, uuid: Uuid) -> Option<&BTreeSet<String>> {
        self.damaged.get(&uuid)
    }

    /// UUIDs of resident, non-deleted objects. Faults are included.
    pub fn loaded_objects(&self) -> Vec<Uuid> {
        let mut uuids: Vec<Uuid> = self
            .objects
            .values()
            .filter(|proxy| !self.deleted.contains(&proxy.uuid()))
            .map(CoObject::uuid)
            .collect();
        uuids.sort();
        uuids
    }

    pub(super) fn objects_in_root(&self, persistent_root: PersistentRootId) -> Vec<Uuid> {
        let mut uuids: Vec<Uuid> = self
            .objects
            .values()
            .filter(|proxy| proxy.persistent_root() == persistent_root)
            .map(CoObject::uuid)
            .collect();
        uuids.sort();
        uuids
    }

    pub(super) fn root_has_changes(&self, persistent_root: PersistentRootId) -> bool {
        self.pending_roots.contains_key(&persistent_root)
            || self.deleted_roots.contains(&persistent_root)
            || self.objects_in_root(persistent_root).into_iter().any(|uuid| {
                self.inserted.contains(&uuid)
                    || self.deleted.contains(&uuid)
                    || self.damaged.contains_key(&uuid)
            })
    }

    /// Every persistent root with something to commit or discard.
    pub(super) fn changed_roots(&self) -> BTreeSet<PersistentRootId> {
        let mut roots: BTreeSet<PersistentRootId> = self.pending_roots.keys().copied().collect();
        roots.extend(self.deleted_roots.iter().copied());
        let touched = self
            .inserted
            .iter()
            .chain(self.deleted.iter())
            .chain(self.damaged.keys());
        for uuid in touched {
            if let Some(proxy) = self.objects.get(uuid) {
                roots.insert(proxy.persistent_root());
            }
        }
        roots
    }

    /// Drops every trace of `persistent_root` from the context.
    pub(super) fn forget_root(&mut self, persistent_root: PersistentRootId) {
        for uuid in self.objects_in_root(persistent_root) {
            self.objects.remove(&uuid);
            self.inserted.remove(&uuid);
            self.deleted.remove(&uuid);
            self.damaged.remove(&uuid);
        }
        self.pending_roots.remove(&persistent_root);
        self.root_revisions.remove(&persistent_root);
        self.root_branches.remove(&persistent_root);
        self.deleted_roots.remove(&persistent_root);
    }

    /// Points resident proxies of a root at a newly loaded `graph`.
    ///
    /// Proxies absent from the graph are dropped, the rest become faults.
    /// Pinned proxies are left alone.
    pub(super) fn reset_root_objects(&mut self, persistent_root: PersistentRootId, graph: &ItemGraph) {
        for uuid in self.objects_in_root(persistent_root) {
            let Some(proxy) = self.objects.get_mut(&uuid) else {
                continue;
            };
            if proxy.pinned_revision().is_some() {
                continue;
            }
            if graph.contains(uuid) {
                proxy.refault();
            } else {
                self.objects.remove(&uuid);
            }
        }
    }
}

impl ObjectOwner for EditingContext {
    fn load_object(&mut self, uuid: Uuid) -> ContextResult<()> {
        let (persistent_root, pinned) = match self.objects.get(&uuid) {
            None => return Err(ContextError::ObjectNotFound(uuid)),
            Some(proxy) if !proxy.is_fault() => return Ok(()),
            Some(proxy) => (proxy.persistent_root(), proxy.pinned_revision()),
        };
        let revision = match pinned {
            Some(revision) => revision,
            None => self.revision_for_root(persistent_root)?,
        };
        let item = self.store.item(persistent_root, uuid, revision)?;
        let item = self.migrations.migrate_item(item, &self.model)?;

        trace_event_with_fields(
            Event::ObjectFaulted,
            &[
                ("uuid", &uuid.to_string()),
                ("revision", &revision.to_string()),
            ],
        );
        if let Some(proxy) = self.objects.get_mut(&uuid) {
            proxy.load_from(item, revision);
        }
        Ok(())
    }

    fn proxy_mut(&mut self, uuid: Uuid) -> Option<&mut CoObject> {
        self.objects.get_mut(&uuid)
    }

    fn mark_object_damaged(&mut self, uuid: Uuid, property: &str) {
        self.damaged
            .entry(uuid)
            .or_default()
            .insert(property.to_string());
        if let Some(proxy) = self.objects.get_mut(&uuid) {
            proxy.set_has_changes(true);
        }
    }

    fn mark_object_undamaged(&mut self, uuid: Uuid) {
        self.damaged.remove(&uuid);
        if let Some(proxy) = self.objects.get_mut(&uuid) {
            proxy.set_has_changes(false);
        }
    }

    fn revision_for_object(&mut self, uuid: Uuid) -> ContextResult<RevisionId> {
        let proxy = self
            .objects
            .get(&uuid)
            .ok_or(ContextError::ObjectNotFound(uuid))?;
        match proxy.pinned_revision() {
            Some(revision) => Ok(revision),
            None => {
                let persistent_root = proxy.persistent_root();
                self.revision_for_root(persistent_root)
            }
        }
    }

    fn commit_track_for_object(&mut self, uuid: Uuid) -> ContextResult<CommitTrack> {
        let revision = self.revision_for_object(uuid)?;
        Ok(self.store.commit_track_from(revision)?)
    }
}

/// Whether the metamodel declares `property` of `entity` as composite.
pub(super) fn declared_composite(entity: Option<&EntityDescription>, property: &str) -> bool {
    entity
        .and_then(|e| e.property(property))
        .map_or(false, PropertyDescription::is_composite)
}

fn resolve_factories(
    model: &ModelRepository,
    registry: &FactoryRegistry,
) -> HashMap<String, Arc<dyn ObjectFactory>> {
    model
        .entities()
        .filter_map(|entity| {
            registry
                .resolve(&entity.name)
                .map(|factory| (entity.name.clone(), factory))
        })
        .collect()
}
