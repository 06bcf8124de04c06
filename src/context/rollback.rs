//! Discarding, reloading and reverting
//!
//! None of these touch the store. Reverting stages the changes needed to
//! return a root to an older revision; the next commit writes them as a
//! new revision, so history is preserved.

use std::collections::BTreeSet;

use uuid::Uuid;

use super::errors::{ContextError, ContextResult};
use super::object::{CoObject, ObjectOwner};
use super::EditingContext;
use crate::observability::{log_event_with_fields, Event};
use crate::revision::{BranchId, PersistentRootId, RevisionId};
use crate::store::StoreError;

impl EditingContext {
    /// Drops every uncommitted change in the context.
    ///
    /// Inserted objects disappear, damaged objects fall back to faults and
    /// scheduled deletions are cancelled.
    pub fn discard_all_changes(&mut self) {
        let roots = self.changed_roots();
        for persistent_root in &roots {
            self.discard_root_changes(*persistent_root);
        }
        log_event_with_fields(
            Event::ChangesDiscarded,
            &[("roots", &roots.len().to_string())],
        );
    }

    /// Discards the changes of one persistent root.
    pub fn discard_changes_in_root(&mut self, persistent_root: PersistentRootId) {
        self.discard_root_changes(persistent_root);
        log_event_with_fields(
            Event::ChangesDiscarded,
            &[("persistent_root", &persistent_root.to_string())],
        );
    }

    /// Discards the changes of the persistent root owning `uuid`.
    pub fn discard_all_changes_in_object(&mut self, uuid: Uuid) -> ContextResult<()> {
        let persistent_root = self.persistent_root_of(uuid)?;
        self.discard_changes_in_root(persistent_root);
        Ok(())
    }

    fn discard_root_changes(&mut self, persistent_root: PersistentRootId) {
        if self.pending_roots.contains_key(&persistent_root) {
            self.forget_root(persistent_root);
            return;
        }
        self.deleted_roots.remove(&persistent_root);
        for uuid in self.objects_in_root(persistent_root) {
            if self.inserted.remove(&uuid) {
                self.objects.remove(&uuid);
                self.damaged.remove(&uuid);
                self.deleted.remove(&uuid);
                continue;
            }
            self.deleted.remove(&uuid);
            if self.damaged.contains_key(&uuid) {
                if let Some(proxy) = self.objects.get_mut(&uuid) {
                    proxy.refault();
                }
                self.mark_object_undamaged(uuid);
            }
        }
    }

    /// Discards the root's changes and reloads it at `revision`, or at the
    /// branch tip (subject to `max_revision_number`) when `None`.
    ///
    /// Returns the revision now loaded.
    pub fn reload_root_object_tree(
        &mut self,
        uuid: Uuid,
        revision: Option<RevisionId>,
    ) -> ContextResult<RevisionId> {
        let persistent_root = self.persistent_root_of(uuid)?;
        if self.pending_roots.contains_key(&persistent_root) {
            return Err(ContextError::RootNotCommitted(persistent_root));
        }
        let revision = match revision {
            Some(revision) => revision,
            None => {
                let branch = self.branch_for_root(persistent_root)?;
                self.resolve_revision(persistent_root, branch)?
            }
        };
        let graph = self.store.item_graph(persistent_root, revision)?;

        self.discard_root_changes(persistent_root);
        self.root_revisions.insert(persistent_root, revision);
        self.reset_root_objects(persistent_root, &graph);
        Ok(revision)
    }

    /// Makes this context read and commit `persistent_root` on `branch`.
    ///
    /// Does not change the store's current branch. Refused while the root
    /// has uncommitted changes.
    pub fn switch_branch(&mut self, persistent_root: PersistentRootId, branch: BranchId) -> ContextResult<()> {
        if self.pending_roots.contains_key(&persistent_root) {
            return Err(ContextError::RootNotCommitted(persistent_root));
        }
        if self.root_has_changes(persistent_root) {
            return Err(ContextError::UncommittedChanges(persistent_root));
        }
        if self.store.branch(branch)?.persistent_root() != persistent_root {
            return Err(StoreError::BranchNotInRoot {
                branch,
                persistent_root,
            }
            .into());
        }
        let revision = self.resolve_revision(persistent_root, branch)?;
        let graph = self.store.item_graph(persistent_root, revision)?;

        self.root_branches.insert(persistent_root, branch);
        self.root_revisions.insert(persistent_root, revision);
        self.reset_root_objects(persistent_root, &graph);
        Ok(())
    }

    /// Stages the changes that return the persistent root owning `uuid` to
    /// its state at `target`.
    ///
    /// Items that differ are rewritten, items added since are deleted and
    /// items removed since come back as insertions.
    pub fn revert_to_revision(&mut self, uuid: Uuid, target: RevisionId) -> ContextResult<()> {
        let persistent_root = self.persistent_root_of(uuid)?;
        if self.pending_roots.contains_key(&persistent_root) {
            return Err(ContextError::RootNotCommitted(persistent_root));
        }
        if self.root_has_changes(persistent_root) {
            return Err(ContextError::UncommittedChanges(persistent_root));
        }
        let current = self.revision_for_root(persistent_root)?;
        let base = self.store.item_graph(persistent_root, current)?;
        let old = self.store.item_graph(persistent_root, target)?;

        for item in old.items() {
            let uuid = item.uuid();
            let stored = base.item(uuid);
            if stored == Some(item) {
                continue;
            }
            let changed: BTreeSet<String> = match stored {
                Some(stored) => stored
                    .values()
                    .keys()
                    .chain(item.values().keys())
                    .filter(|property| stored.value(property) != item.value(property))
                    .cloned()
                    .collect(),
                None => BTreeSet::new(),
            };
            if stored.is_some() && changed.is_empty() {
                continue;
            }

            let migrated = self.migrations.migrate_item(item.clone(), &self.model)?;
            let mut proxy = CoObject::fault(uuid, item.entity(), persistent_root, None);
            proxy.load_from(migrated, current);
            self.objects.insert(uuid, proxy);
            if stored.is_none() {
                self.inserted.insert(uuid);
            }
            for property in &changed {
                self.mark_object_damaged(uuid, property);
            }
        }

        for uuid in base.uuids() {
            if !old.contains(uuid) {
                self.object_with_uuid(uuid)?;
                self.deleted.insert(uuid);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::item::Value;
    use crate::metamodel::{EntityDescription, ModelRepository, PropertyDescription, PropertyType};
    use crate::store::Store;

    fn model() -> Arc<ModelRepository> {
        let mut model = ModelRepository::new();
        model.register_package("docs", 1);
        model
            .register_entity(
                EntityDescription::new("Document", "docs")
                    .with_property(PropertyDescription::new("title", PropertyType::String))
                    .with_property(
                        PropertyDescription::new("contents", PropertyType::CompositeReference)
                            .ordered(),
                    ),
            )
            .unwrap();
        Arc::new(model)
    }

    fn committed_document(store: &Store, title: &str) -> (EditingContext, Uuid, PersistentRootId) {
        let mut ctx = EditingContext::new(store.clone(), model());
        let doc = ctx.insert_object("Document").unwrap();
        ctx.set_value(doc, "title", Value::string(title)).unwrap();
        let root = ctx.persistent_root_of(doc).unwrap();
        ctx.commit().unwrap();
        (ctx, doc, root)
    }

    #[test]
    fn test_discard_restores_committed_values() {
        let store = Store::in_memory();
        let (mut ctx, doc, _) = committed_document(&store, "a");
        ctx.set_value(doc, "title", Value::string("b")).unwrap();
        let fresh = ctx.insert_object("Document").unwrap();

        ctx.discard_all_changes();
        assert!(!ctx.has_changes());
        assert!(!ctx.is_resident(fresh));
        assert!(ctx.object_with_uuid(doc).unwrap().is_fault());
        assert_eq!(ctx.value(doc, "title").unwrap(), Some(Value::string("a")));
    }

    #[test]
    fn test_discard_in_object_is_scoped_to_its_root() {
        let store = Store::in_memory();
        let (mut ctx, doc, _) = committed_document(&store, "a");
        let other = ctx.insert_object("Document").unwrap();
        ctx.set_value(doc, "title", Value::string("b")).unwrap();

        ctx.discard_all_changes_in_object(doc).unwrap();
        assert!(!ctx.object_has_changes(doc));
        assert!(ctx.inserted_object_uuids().contains(&other));
    }

    #[test]
    fn test_discard_cancels_deletion() {
        let store = Store::in_memory();
        let (mut ctx, doc, root) = committed_document(&store, "a");
        ctx.delete_object(doc).unwrap();
        ctx.discard_all_changes();
        assert!(!ctx.has_changes());
        assert!(ctx.commit().unwrap().is_empty());
        assert!(store.persistent_root(root).is_ok());
    }

    #[test]
    fn test_reload_picks_up_other_context_commit() {
        let store = Store::in_memory();
        let (mut ours, doc, _) = committed_document(&store, "a");
        let mut theirs = EditingContext::new(store.clone(), model());
        theirs.set_value(doc, "title", Value::string("b")).unwrap();
        theirs.commit().unwrap();

        assert_eq!(ours.value(doc, "title").unwrap(), Some(Value::string("a")));
        ours.reload_root_object_tree(doc, None).unwrap();
        assert_eq!(ours.value(doc, "title").unwrap(), Some(Value::string("b")));
    }

    #[test]
    fn test_revert_writes_new_revision_with_old_state() {
        let store = Store::in_memory();
        let (mut ctx, doc, root) = committed_document(&store, "a");
        let first = ctx.revision_for_root(root).unwrap();
        ctx.set_value(doc, "title", Value::string("b")).unwrap();
        ctx.commit().unwrap();

        ctx.revert_to_revision(doc, first).unwrap();
        assert!(ctx.object_has_changes(doc));
        let reverted = ctx.commit().unwrap()[&root];
        assert_ne!(reverted, first);
        assert_eq!(
            store.item(root, doc, reverted).unwrap().value("title"),
            Some(&Value::string("a"))
        );
        assert_eq!(ctx.commit_track_for_root(root).unwrap().len(), 4);
    }

    #[test]
    fn test_revert_refused_with_uncommitted_changes() {
        let store = Store::in_memory();
        let (mut ctx, doc, root) = committed_document(&store, "a");
        let first = ctx.revision_for_root(root).unwrap();
        ctx.set_value(doc, "title", Value::string("b")).unwrap();
        assert!(matches!(
            ctx.revert_to_revision(doc, first),
            Err(ContextError::UncommittedChanges(_))
        ));
    }

    #[test]
    fn test_switch_branch_reads_branch_tip() {
        let store = Store::in_memory();
        let (mut ctx, doc, root) = committed_document(&store, "a");
        let main = store.current_branch(root).unwrap();
        let feature = store
            .create_branch(root, "feature", main.id(), main.tip())
            .unwrap();

        ctx.switch_branch(root, feature.id()).unwrap();
        ctx.set_value(doc, "title", Value::string("b")).unwrap();
        let revision = ctx.commit().unwrap()[&root];
        assert_eq!(store.revision(revision).unwrap().branch(), feature.id());
        assert_eq!(store.branch(main.id()).unwrap().tip(), main.tip());

        assert!(matches!(
            ctx.switch_branch(root, BranchId::new()),
            Err(ContextError::Store(StoreError::BranchNotFound(_)))
        ));
    }
}
