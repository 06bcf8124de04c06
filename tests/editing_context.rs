//! Editing context tests
//!
//! Covers:
//! - damage tracking and commit fidelity
//! - faulting, isolation between contexts and reloads
//! - pinning to older revisions
//! - copy and import across contexts
//! - failed commits leave the working copy untouched

use std::sync::Arc;

use coreobject::context::{ContextError, EditingContext};
use coreobject::item::Value;
use coreobject::metamodel::{EntityDescription, ModelRepository, PropertyDescription, PropertyType};
use coreobject::store::{Store, StoreError};
use coreobject::{ContextConfig, ErrorCategory};
use uuid::Uuid;

// =============================================================================
// Test Utilities
// =============================================================================

fn model() -> Arc<ModelRepository> {
    let mut model = ModelRepository::new();
    model.register_package("docs", 1);
    model
        .register_entity(
            EntityDescription::new("Document", "docs")
                .with_property(PropertyDescription::new("title", PropertyType::String))
                .with_property(PropertyDescription::new("tags", PropertyType::String).unordered())
                .with_property(
                    PropertyDescription::new("contents", PropertyType::CompositeReference)
                        .ordered(),
                ),
        )
        .unwrap();
    model
        .register_entity(
            EntityDescription::new("Paragraph", "docs")
                .with_property(PropertyDescription::new("text", PropertyType::String)),
        )
        .unwrap();
    Arc::new(model)
}

fn context(store: &Store) -> EditingContext {
    EditingContext::new(store.clone(), model())
}

/// Document owning one paragraph, committed.
fn committed_tree(ctx: &mut EditingContext) -> (Uuid, Uuid) {
    let doc = ctx.insert_object("Document").unwrap();
    let para = ctx.insert_object_in("Paragraph", doc).unwrap();
    ctx.set_value(doc, "title", Value::string("a")).unwrap();
    ctx.set_value(para, "text", Value::string("hello")).unwrap();
    ctx.set_value(doc, "contents", Value::Array(vec![Value::CompositeReference(para)]))
        .unwrap();
    ctx.commit().unwrap();
    (doc, para)
}

// =============================================================================
// Damage and commit
// =============================================================================

/// Only damaged objects are written; the written delta matches the damage.
#[test]
fn test_commit_writes_only_damaged_objects() {
    let store = Store::in_memory();
    let mut ctx = context(&store);
    let (doc, para) = committed_tree(&mut ctx);
    let root = ctx.persistent_root_of(doc).unwrap();

    ctx.set_value(para, "text", Value::string("changed")).unwrap();
    assert_eq!(ctx.changed_object_uuids().into_iter().collect::<Vec<_>>(), vec![para]);

    let revision = ctx
        .commit_with_type("edit", "change paragraph", Some("rewrote the opening paragraph"))
        .unwrap()[&root];
    let revision = store.revision(revision).unwrap();
    let metadata = revision.metadata();
    assert_eq!(metadata.commit_type.as_deref(), Some("edit"));
    assert_eq!(metadata.short_description.as_deref(), Some("change paragraph"));
    assert_eq!(
        metadata.long_description.as_deref(),
        Some("rewrote the opening paragraph")
    );
    let written: Vec<Uuid> = revision.delta().items().map(|item| item.uuid()).collect();
    assert_eq!(written, vec![para]);
    assert!(revision.delta().removed().is_empty());
    assert_eq!(revision.metadata().commit_type.as_deref(), Some("edit"));
    assert_eq!(
        revision.metadata().short_description.as_deref(),
        Some("change paragraph")
    );
    assert!(!ctx.has_changes());
}

/// Committed state reads back identically from a fresh context.
#[test]
fn test_committed_values_round_trip_through_store() {
    let store = Store::in_memory();
    let mut writer = context(&store);
    let (doc, para) = committed_tree(&mut writer);
    writer
        .set_value(
            doc,
            "tags",
            Value::Set(coreobject::item::ValueSet::from_values([
                Value::string("x"),
                Value::string("y"),
            ])),
        )
        .unwrap();
    writer.commit().unwrap();

    let mut reader = context(&store);
    assert_eq!(reader.value(para, "text").unwrap(), Some(Value::string("hello")));
    assert_eq!(
        reader.value(doc, "tags").unwrap(),
        Some(Value::Set(coreobject::item::ValueSet::from_values([
            Value::string("y"),
            Value::string("x"),
        ])))
    );
    assert_eq!(reader.loaded_objects().len(), 2);
}

/// Commits in one context stay invisible to another until it reloads.
#[test]
fn test_contexts_are_isolated_until_reload() {
    let store = Store::in_memory();
    let mut first = context(&store);
    let (doc, _) = committed_tree(&mut first);

    let mut second = context(&store);
    assert_eq!(second.value(doc, "title").unwrap(), Some(Value::string("a")));

    first.set_value(doc, "title", Value::string("b")).unwrap();
    first.commit().unwrap();
    assert_eq!(second.value(doc, "title").unwrap(), Some(Value::string("a")));

    second.reload_root_object_tree(doc, None).unwrap();
    assert_eq!(second.value(doc, "title").unwrap(), Some(Value::string("b")));
}

/// A failed commit leaves the failing root's changes in place for a retry.
#[test]
fn test_failed_commit_leaves_working_copy_untouched() {
    let store = Store::in_memory();
    let mut ours = context(&store);
    let (doc, para) = committed_tree(&mut ours);

    let mut theirs = context(&store);
    theirs.set_value(para, "text", Value::string("theirs")).unwrap();
    theirs.commit().unwrap();

    ours.set_value(doc, "title", Value::string("ours")).unwrap();
    let err = ours.commit().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Conflict);
    assert!(matches!(
        err,
        ContextError::CommitFailed {
            source: StoreError::TipMoved { .. },
            ..
        }
    ));
    assert!(ours.object_has_changes(doc));
    assert_eq!(ours.value(doc, "title").unwrap(), Some(Value::string("ours")));

    // Reload discards our edit; re-applying on the new tip succeeds.
    ours.reload_root_object_tree(doc, None).unwrap();
    ours.set_value(doc, "title", Value::string("ours")).unwrap();
    assert_eq!(ours.commit().unwrap().len(), 1);
    assert_eq!(ours.value(para, "text").unwrap(), Some(Value::string("theirs")));
}

/// Committing an inconsistent graph fails before the store is touched.
#[test]
fn test_shared_child_rejected_before_write() {
    let store = Store::in_memory();
    let mut ctx = context(&store);
    let (doc, para) = committed_tree(&mut ctx);
    let highest = store.highest_revision_number();

    let other = ctx.insert_object_in("Document", doc).unwrap();
    ctx.set_value(
        doc,
        "contents",
        Value::Array(vec![
            Value::CompositeReference(para),
            Value::CompositeReference(other),
        ]),
    )
    .unwrap();
    ctx.set_value(other, "contents", Value::Array(vec![Value::CompositeReference(para)]))
        .unwrap();

    let err = ctx.commit().unwrap_err();
    assert!(matches!(err, ContextError::InvalidGraph { .. }), "got {err}");
    assert_eq!(err.category(), ErrorCategory::ConsistencyViolation);
    assert_eq!(store.highest_revision_number(), highest);
}

// =============================================================================
// Pinning
// =============================================================================

/// A context with a revision limit reads the newest revision at or below it.
#[test]
fn test_max_revision_number_pins_reads() {
    let store = Store::in_memory();
    let mut ctx = context(&store);
    let (doc, _) = committed_tree(&mut ctx);
    let root = ctx.persistent_root_of(doc).unwrap();
    let limit = store.highest_revision_number().unwrap().value();

    ctx.set_value(doc, "title", Value::string("b")).unwrap();
    ctx.commit().unwrap();

    let mut pinned = EditingContext::new(store.clone(), model())
        .with_config(ContextConfig::pinned(limit));
    assert_eq!(pinned.value(doc, "title").unwrap(), Some(Value::string("a")));
    assert_eq!(pinned.commit_track_for_root(root).unwrap().len(), 2);

    let mut too_low = EditingContext::new(store, model()).with_config(ContextConfig::pinned(0));
    assert!(matches!(
        too_low.value(doc, "title"),
        Err(ContextError::NoRevisionAtOrBelow { .. })
    ));
}

// =============================================================================
// Copy and import
// =============================================================================

/// A copy into a new persistent root commits as an independent tree.
#[test]
fn test_copy_commits_as_new_root() {
    let store = Store::in_memory();
    let mut ctx = context(&store);
    let (doc, _) = committed_tree(&mut ctx);

    let copy = ctx.insert_object_copy(doc, None).unwrap();
    let copy_root = ctx.persistent_root_of(copy).unwrap();
    ctx.commit().unwrap();

    assert_eq!(store.persistent_root_ids().len(), 2);
    assert_eq!(store.persistent_root(copy_root).unwrap().root_object(), copy);
    let graph = store
        .item_graph(copy_root, store.tip_revision(copy_root).unwrap().id())
        .unwrap();
    assert_eq!(graph.len(), 2);
    assert!(!graph.contains(doc));
}

/// Importing with relationship consistency brings the owned tree along.
#[test]
fn test_import_between_contexts() {
    let store = Store::in_memory();
    let mut source = context(&store);
    let (doc, para) = committed_tree(&mut source);
    source.set_value(para, "text", Value::string("imported")).unwrap();

    let mut target = context(&store);
    target.import_object(&mut source, doc, true).unwrap();
    assert!(target.object_has_changes(para));
    assert!(!target.object_has_changes(doc));
    target.commit().unwrap();

    let mut reader = context(&store);
    assert_eq!(reader.value(para, "text").unwrap(), Some(Value::string("imported")));
}
