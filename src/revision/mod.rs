//! Revision graph
//!
//! Revisions form a DAG per persistent root. Branches point into it and a
//! persistent root owns one or more branches. Nothing in this module
//! mutates shared state; the store owns the live records.

mod authority;
mod branch;
mod commit_track;
mod graph;
mod ids;
mod metadata;
#[allow(clippy::module_inception)]
mod revision;

pub use authority::{NumberingError, RevisionNumberAuthority};
pub use branch::{Branch, PersistentRoot};
pub use commit_track::CommitTrack;
pub use graph::{
    ancestors, commit_track_ids, is_ancestor, lowest_common_ancestor, materialize,
    RevisionGraphError, RevisionLookup,
};
pub use ids::{BranchId, PersistentRootId, RevisionId, RevisionNumber};
pub use metadata::CommitMetadata;
pub use revision::Revision;
