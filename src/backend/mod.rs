//! Durable record backend
//!
//! The store persists three kinds of records, each keyed by UUID:
//! persistent roots, branches and revisions. A backend only has to offer
//! atomic multi-record writes and point reads; the latest record per key
//! wins.

mod checksum;
mod errors;
mod file;
mod frame;
mod memory;

use serde::{Deserialize, Serialize};

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{BackendError, BackendErrorCode, BackendResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::revision::{BranchId, PersistentRootId, RevisionId};

/// Address of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordKey {
    PersistentRoot(PersistentRootId),
    Branch(BranchId),
    Revision(RevisionId),
}

/// A key plus its serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRecord {
    pub key: RecordKey,
    pub body: Vec<u8>,
}

impl BackendRecord {
    pub fn new(key: RecordKey, body: Vec<u8>) -> Self {
        Self { key, body }
    }
}

/// Durable key/record substrate.
pub trait Backend: Send {
    /// Writes every record or none of them.
    fn write_batch(&mut self, records: &[BackendRecord]) -> BackendResult<()>;

    /// Latest body stored under `key`.
    fn read(&mut self, key: &RecordKey) -> BackendResult<Option<Vec<u8>>>;

    /// Every key with at least one record, sorted.
    fn keys(&self) -> Vec<RecordKey>;
}
