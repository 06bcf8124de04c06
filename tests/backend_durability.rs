//! Backend durability tests
//!
//! Covers:
//! - committed state survives reopening the store
//! - revision numbering resumes after replay
//! - an incomplete trailing frame is discarded on open
//! - a checksum mismatch fails the open, never silently

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use coreobject::backend::BackendErrorCode;
use coreobject::context::EditingContext;
use coreobject::item::Value;
use coreobject::metamodel::{EntityDescription, ModelRepository, PropertyDescription, PropertyType};
use coreobject::store::{Store, StoreError};
use coreobject::{ErrorCategory, StoreConfig};
use tempfile::TempDir;
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
                .with_property(PropertyDescription::new("title", PropertyType::String)),
        )
        .unwrap();
    Arc::new(model)
}

fn record_file(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("store").join("records.dat")
}

/// Commits one titled document and returns its UUID.
fn write_document(data_dir: &Path, title: &str) -> Uuid {
    let store = Store::open(&StoreConfig::at(data_dir)).unwrap();
    let mut ctx = EditingContext::new(store, model());
    let doc = ctx.insert_object("Document").unwrap();
    ctx.set_value(doc, "title", Value::string(title)).unwrap();
    ctx.commit().unwrap();
    doc
}

fn read_title(data_dir: &Path, doc: Uuid) -> Option<Value> {
    let store = Store::open(&StoreConfig::at(data_dir)).unwrap();
    let mut ctx = EditingContext::new(store, model());
    ctx.value(doc, "title").unwrap()
}

// =============================================================================
// Tests
// =============================================================================

/// Everything committed before close is visible after reopen.
#[test]
fn test_committed_state_survives_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let doc = write_document(temp_dir.path(), "durable");
    assert_eq!(read_title(temp_dir.path(), doc), Some(Value::string("durable")));
}

/// Numbering continues above the highest replayed revision.
#[test]
fn test_revision_numbers_resume_after_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let first = write_document(temp_dir.path(), "a");

    let store = Store::open(&StoreConfig::at(temp_dir.path())).unwrap();
    let highest = store.highest_revision_number().unwrap();
    let mut ctx = EditingContext::new(store.clone(), model());
    ctx.set_value(first, "title", Value::string("b")).unwrap();
    let root = ctx.persistent_root_of(first).unwrap();
    let revision = ctx.commit().unwrap()[&root];

    assert!(store.revision(revision).unwrap().number() > highest);
    assert_eq!(read_title(temp_dir.path(), first), Some(Value::string("b")));
}

/// A partially written frame at the end of the file is dropped on open.
#[test]
fn test_torn_tail_is_discarded() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let doc = write_document(temp_dir.path(), "kept");
    let path = record_file(temp_dir.path());
    let valid_len = fs::metadata(&path).unwrap().len();

    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        // Declares a 255-byte frame, supplies three bytes of it.
        file.write_all(&[0xFF, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03]).unwrap();
    }

    assert_eq!(read_title(temp_dir.path(), doc), Some(Value::string("kept")));
    assert_eq!(fs::metadata(&path).unwrap().len(), valid_len);

    // The store keeps accepting writes after truncation.
    let second = write_document(temp_dir.path(), "after");
    assert_eq!(read_title(temp_dir.path(), second), Some(Value::string("after")));
}

/// Flipping a checksum byte makes the store refuse to open.
#[test]
fn test_corruption_fails_open() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write_document(temp_dir.path(), "doomed");
    let path = record_file(temp_dir.path());

    let mut contents = fs::read(&path).unwrap();
    let last = contents.len() - 1;
    contents[last] ^= 0xFF;
    fs::write(&path, contents).unwrap();

    let err = Store::open(&StoreConfig::at(temp_dir.path())).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Storage);
    match err {
        StoreError::Backend(backend) => {
            assert!(backend.is_fatal(), "corruption must be fatal");
            assert_eq!(backend.code(), BackendErrorCode::CoDataCorruption);
        }
        other => panic!("expected a backend error, got {other}"),
    }
}

/// An in-memory configuration never touches the filesystem.
#[test]
fn test_in_memory_config_has_no_data_dir() {
    let store = Store::open(&StoreConfig::in_memory()).unwrap();
    assert!(!store.config().is_persistent());
    let mut ctx = EditingContext::new(store, model());
    ctx.insert_object("Document").unwrap();
    assert_eq!(ctx.commit().unwrap().len(), 1);
}
