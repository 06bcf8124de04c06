//! Copying and importing objects
//!
//! A copy gets fresh UUIDs for the whole composite subtree; an import
//! moves state across contexts under the same UUIDs.

use std::collections::{BTreeSet, HashMap, HashSet};

use uuid::Uuid;

use super::editing_context::{declared_composite, PendingRoot};
use super::errors::{ContextError, ContextResult};
use super::object::{CoObject, ObjectOwner};
use super::EditingContext;
use crate::revision::{BranchId, PersistentRootId, RevisionId};

impl EditingContext {
    /// Copies `source` and everything it owns.
    ///
    /// References held in properties the metamodel declares composite point
    /// at the copied objects; every other reference keeps its target. With `destination` the copy
    /// joins the persistent root owning that object and must be attached
    /// before commit; without it the copy is the root object of a new
    /// persistent root.
    pub fn insert_object_copy(&mut self, source: Uuid, destination: Option<Uuid>) -> ContextResult<Uuid> {
        let subtree = self.composite_subtree(source)?;
        for uuid in &subtree {
            let entity = self.loaded_object(*uuid)?.entity().to_string();
            if self.model.entity(&entity).is_none() {
                return Err(ContextError::UnknownEntity(entity));
            }
            if !self.factories.contains_key(&entity) {
                return Err(ContextError::NoFactoryForEntity(entity));
            }
        }

        let mapping: HashMap<Uuid, Uuid> = subtree
            .iter()
            .map(|uuid| (*uuid, Uuid::new_v4()))
            .collect();
        let copied_root = mapping
            .get(&source)
            .copied()
            .ok_or(ContextError::ObjectNotFound(source))?;
        let persistent_root = match destination {
            Some(owner) => {
                let persistent_root = self.persistent_root_of(owner)?;
                self.ensure_editable_root(persistent_root)?;
                persistent_root
            }
            None => PersistentRootId::new(),
        };

        let mut copies = Vec::with_capacity(subtree.len());
        for uuid in &subtree {
            let original = self
                .objects
                .get(uuid)
                .ok_or(ContextError::ObjectNotFound(*uuid))?;
            let entity = self.model.entity(original.entity());
            let mut copy = self.instantiate(mapping[uuid], original.entity(), persistent_root)?;
            for (property, value) in original.values() {
                let owning = declared_composite(entity, property);
                let remap = |target: Uuid, composite: bool| {
                    if owning && composite {
                        mapping.get(&target).copied().unwrap_or(target)
                    } else {
                        target
                    }
                };
                copy.set_raw_value(property, Some(value.map_references(&remap)));
            }
            copy.set_property_packages(original.property_packages().clone());
            copies.push(copy);
        }

        if destination.is_none() {
            self.pending_roots.insert(
                persistent_root,
                PendingRoot {
                    root_object: copied_root,
                    branch: BranchId::new(),
                    initial_revision: RevisionId::new(),
                },
            );
        }
        for copy in copies {
            self.inserted.insert(copy.uuid());
            self.objects.insert(copy.uuid(), copy);
        }
        Ok(copied_root)
    }

    /// Brings the state of `uuid` from `source` into this context.
    ///
    /// The object's persistent root must exist in this context's store.
    /// Properties that differ from what this context reads are marked
    /// damaged; an object the store does not have yet counts as inserted.
    /// With `relationship_consistency`, owned objects not resident here are
    /// imported too.
    pub fn import_object(
        &mut self,
        source: &mut EditingContext,
        uuid: Uuid,
        relationship_consistency: bool,
    ) -> ContextResult<()> {
        let mut seen = HashSet::new();
        let mut queue = vec![uuid];
        while let Some(next) = queue.pop() {
            if !seen.insert(next) {
                continue;
            }
            let proxy = source.loaded_object(next)?.clone();
            if relationship_consistency {
                queue.extend(
                    self.owned_children(&proxy)
                        .into_iter()
                        .filter(|child| !self.objects.contains_key(child)),
                );
            }
            self.adopt(proxy)?;
        }
        Ok(())
    }

    fn adopt(&mut self, proxy: CoObject) -> ContextResult<()> {
        let uuid = proxy.uuid();
        let persistent_root = proxy.persistent_root();
        self.store.persistent_root(persistent_root)?;
        let revision = self.revision_for_root(persistent_root)?;
        let stored = match self.store.item_graph(persistent_root, revision)?.item(uuid) {
            Some(item) => Some(self.migrations.migrate_item(item.clone(), &self.model)?),
            None => None,
        };

        let mut local = CoObject::fault(uuid, proxy.entity(), persistent_root, None);
        local.load_from(proxy.to_item(), revision);
        self.objects.insert(uuid, local);

        let Some(stored) = stored else {
            self.inserted.insert(uuid);
            return Ok(());
        };
        let changed: BTreeSet<&String> = stored
            .values()
            .keys()
            .chain(proxy.values().keys())
            .filter(|property| stored.value(property) != proxy.value(property))
            .collect();
        for property in changed {
            self.mark_object_damaged(uuid, property);
        }
        Ok(())
    }
}
