//! Object proxies and the internal capability interface
//!
//! The context owns every [`CoObject`] in a UUID index. Callers read
//! proxies through shared borrows and mutate them through [`ObjectMut`],
//! which routes every write back into the context so the damaged map stays
//! the single source of truth for uncommitted changes.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::errors::{ContextError, ContextResult};
use super::EditingContext;
use crate::item::{Item, Value};
use crate::revision::{CommitTrack, PersistentRootId, RevisionId};

/// Load state of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Identity only; values load on first access.
    Fault,
    Loaded,
}

/// Live representation of one item in an editing context.
#[derive(Debug, Clone)]
pub struct CoObject {
    uuid: Uuid,
    entity: String,
    package: String,
    package_version: i64,
    persistent_root: PersistentRootId,
    state: ObjectState,
    values: BTreeMap<String, Value>,
    property_packages: BTreeMap<String, String>,
    loaded_revision: Option<RevisionId>,
    pinned_revision: Option<RevisionId>,
    has_changes: bool,
}

impl CoObject {
    pub(crate) fn fault(
        uuid: Uuid,
        entity: impl Into<String>,
        persistent_root: PersistentRootId,
        pinned_revision: Option<RevisionId>,
    ) -> Self {
        Self {
            uuid,
            entity: entity.into(),
            package: String::new(),
            package_version: 0,
            persistent_root,
            state: ObjectState::Fault,
            values: BTreeMap::new(),
            property_packages: BTreeMap::new(),
            loaded_revision: None,
            pinned_revision,
            has_changes: false,
        }
    }

    /// A loaded proxy for an object that does not exist in the store yet.
    pub(crate) fn inserted(
        uuid: Uuid,
        entity: impl Into<String>,
        package: impl Into<String>,
        package_version: i64,
        persistent_root: PersistentRootId,
        values: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            uuid,
            entity: entity.into(),
            package: package.into(),
            package_version,
            persistent_root,
            state: ObjectState::Loaded,
            values,
            property_packages: BTreeMap::new(),
            loaded_revision: None,
            pinned_revision: None,
            has_changes: false,
        }
    }

    #[inline]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[inline]
    pub fn persistent_root(&self) -> PersistentRootId {
        self.persistent_root
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub fn is_fault(&self) -> bool {
        self.state == ObjectState::Fault
    }

    /// Revision the values were loaded from. `None` for faults and new objects.
    pub fn loaded_revision(&self) -> Option<RevisionId> {
        self.loaded_revision
    }

    /// Revision this proxy is pinned to, overriding the context's revision.
    pub fn pinned_revision(&self) -> Option<RevisionId> {
        self.pinned_revision
    }

    /// Cached has-changes bit. Mirrors the context's damaged map.
    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// Loaded value. Always `None` on a fault.
    pub fn value(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Package declaring the entity. Empty on a fault.
    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn package_version(&self) -> i64 {
        self.package_version
    }

    pub(crate) fn property_packages(&self) -> &BTreeMap<String, String> {
        &self.property_packages
    }

    /// Fills a proxy from a (migrated) item.
    pub(crate) fn load_from(&mut self, item: Item, revision: RevisionId) {
        self.entity = item.entity().to_string();
        self.package = item.package().to_string();
        self.package_version = item.package_version();
        self.property_packages = item.property_packages().clone();
        self.values = item.values().clone();
        self.loaded_revision = Some(revision);
        self.state = ObjectState::Loaded;
    }

    /// Drops loaded values, turning the proxy back into a fault.
    pub(crate) fn refault(&mut self) {
        self.values.clear();
        self.property_packages.clear();
        self.loaded_revision = None;
        self.state = ObjectState::Fault;
    }

    pub(crate) fn pin(&mut self, revision: Option<RevisionId>) {
        self.pinned_revision = revision;
    }

    pub(crate) fn set_loaded_revision(&mut self, revision: RevisionId) {
        self.loaded_revision = Some(revision);
    }

    pub(crate) fn set_has_changes(&mut self, has_changes: bool) {
        self.has_changes = has_changes;
    }

    pub(crate) fn set_raw_value(&mut self, property: &str, value: Option<Value>) {
        match value {
            Some(value) => self.values.insert(property.to_string(), value),
            None => self.values.remove(property),
        };
    }

    pub(crate) fn set_property_packages(&mut self, packages: BTreeMap<String, String>) {
        self.property_packages = packages;
    }

    /// Serialized form written at commit.
    pub(crate) fn to_item(&self) -> Item {
        let mut item = Item::new(self.uuid, &self.entity, &self.package, self.package_version)
            .with_property_packages(self.property_packages.clone());
        for (property, value) in &self.values {
            item.set_value(property.clone(), value.clone());
        }
        item
    }
}

/// Hooks a proxy needs from its owning context.
///
/// Implemented by [`EditingContext`]; not part of the public API.
pub(crate) trait ObjectOwner {
    /// Resolves a fault. No-op for loaded proxies.
    fn load_object(&mut self, uuid: Uuid) -> ContextResult<()>;

    fn proxy_mut(&mut self, uuid: Uuid) -> Option<&mut CoObject>;

    fn mark_object_damaged(&mut self, uuid: Uuid, property: &str);

    fn mark_object_undamaged(&mut self, uuid: Uuid);

    fn revision_for_object(&mut self, uuid: Uuid) -> ContextResult<RevisionId>;

    fn commit_track_for_object(&mut self, uuid: Uuid) -> ContextResult<CommitTrack>;
}

/// Writes one property and records the damage. `None` removes the value.
pub(crate) fn write_property<O: ObjectOwner + ?Sized>(
    owner: &mut O,
    uuid: Uuid,
    property: &str,
    value: Option<Value>,
) -> ContextResult<()> {
    owner.load_object(uuid)?;
    let proxy = owner
        .proxy_mut(uuid)
        .ok_or(ContextError::ObjectNotFound(uuid))?;
    proxy.set_raw_value(property, value);
    owner.mark_object_damaged(uuid, property);
    Ok(())
}

/// Mutable handle to one object, borrowed from its context.
pub struct ObjectMut<'a> {
    ctx: &'a mut EditingContext,
    uuid: Uuid,
}

impl<'a> ObjectMut<'a> {
    pub(crate) fn new(ctx: &'a mut EditingContext, uuid: Uuid) -> Self {
        Self { ctx, uuid }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Reads a property, faulting the object in if needed.
    pub fn get(&mut self, property: &str) -> ContextResult<Option<Value>> {
        self.ctx.value(self.uuid, property)
    }

    pub fn set(&mut self, property: &str, value: Value) -> ContextResult<&mut Self> {
        self.ctx.set_value(self.uuid, property, value)?;
        Ok(self)
    }

    pub fn remove(&mut self, property: &str) -> ContextResult<&mut Self> {
        self.ctx.remove_value(self.uuid, property)?;
        Ok(self)
    }

    pub fn has_changes(&self) -> bool {
        self.ctx.object_has_changes(self.uuid)
    }

    /// Revision the object is read at.
    pub fn revision(&mut self) -> ContextResult<RevisionId> {
        self.ctx.revision_for_object(self.uuid)
    }

    pub fn commit_track(&mut self) -> ContextResult<CommitTrack> {
        self.ctx.commit_track_for_object(self.uuid)
    }
}
