//! End-to-end branching scenario
//!
//! Root "main" at an empty revision, an edit committed on main, a feature
//! branch forked from it, and a second edit on the feature branch that
//! leaves main untouched.

use std::sync::Arc;

use coreobject::context::EditingContext;
use coreobject::item::Value;
use coreobject::metamodel::{EntityDescription, ModelRepository, PropertyDescription, PropertyType};
use coreobject::store::Store;

fn model() -> Arc<ModelRepository> {
    let mut model = ModelRepository::new();
    model.register_package("docs", 1);
    model
        .register_entity(
            EntityDescription::new("Document", "docs")
                .with_property(PropertyDescription::new("title", PropertyType::String)),
        )
        .unwrap();
    Arc::new(model)
}

#[test]
fn test_branch_and_edit_scenario() {
    let store = Store::in_memory();
    let mut ctx = EditingContext::new(store.clone(), model());

    // main: R0 (empty) then R1 with title "a"
    let doc = ctx.insert_object("Document").unwrap();
    ctx.set_value(doc, "title", Value::string("a")).unwrap();
    let root = ctx.persistent_root_of(doc).unwrap();
    let r1 = ctx.commit_with_type("edit", "set title", None).unwrap()[&root];

    let main = store.current_branch(root).unwrap();
    assert_eq!(main.name(), "main");
    assert_eq!(main.tip(), r1);
    let r0 = store.revision(r1).unwrap().parent().unwrap();
    assert!(store.item_graph(root, r0).unwrap().is_empty());
    assert_eq!(
        store.revision(r1).unwrap().metadata().commit_type.as_deref(),
        Some("edit")
    );

    // feature forks at R1 and gets R2 with title "b"
    let feature = store.create_branch(root, "feature", main.id(), r1).unwrap();
    ctx.switch_branch(root, feature.id()).unwrap();
    ctx.set_value(doc, "title", Value::string("b")).unwrap();
    let r2 = ctx.commit().unwrap()[&root];

    let r2_revision = store.revision(r2).unwrap();
    assert_eq!(r2_revision.parent(), Some(r1));
    assert_eq!(r2_revision.branch(), feature.id());
    assert!(r2_revision.number() > store.revision(r1).unwrap().number());

    // main is untouched
    assert_eq!(store.branch(main.id()).unwrap().tip(), r1);
    assert_eq!(store.current_branch(root).unwrap().id(), main.id());
    let mut on_main = EditingContext::new(store.clone(), model());
    assert_eq!(on_main.value(doc, "title").unwrap(), Some(Value::string("a")));
    assert_eq!(
        on_main.object_with_uuid_at(doc, r1).unwrap().pinned_revision(),
        Some(r1)
    );
    assert_eq!(on_main.value(doc, "title").unwrap(), Some(Value::string("a")));

    // the feature tip reads "b"
    let mut on_feature = EditingContext::new(store.clone(), model());
    on_feature.switch_branch(root, feature.id()).unwrap();
    assert_eq!(on_feature.value(doc, "title").unwrap(), Some(Value::string("b")));
    assert_eq!(store.lowest_common_ancestor(r1, r2).unwrap(), Some(r1));
}
