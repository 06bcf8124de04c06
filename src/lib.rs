//! coreobject - version-controlled persistence for object graphs
//!
//! Objects are grouped into persistent roots. Every commit to a root
//! writes an immutable revision on a branch; any revision can be
//! materialized back into a full item graph.
//!
//! - `item`: values, items and item graphs
//! - `revision`: revisions, branches, commit tracks
//! - `store`: atomic transactions over the revision graph
//! - `backend`: durable record storage
//! - `context`: the in-memory working copy
//! - `metamodel` and `migration`: entity descriptions and schema upgrades

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod item;
pub mod metamodel;
pub mod migration;
pub mod observability;
pub mod revision;
pub mod store;

pub use config::{Config, ContextConfig, StoreConfig};
pub use context::{ContextError, EditingContext};
pub use error::ErrorCategory;
pub use item::{Item, ItemGraph, ItemGraphDelta, Value};
pub use revision::{BranchId, CommitMetadata, PersistentRootId, RevisionId, RevisionNumber};
pub use store::{Store, StoreAction, StoreError, StoreTransaction};
