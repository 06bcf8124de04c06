//! Read-side queries over the revision DAG
//!
//! Everything here is generic over [`RevisionLookup`] so the store can run
//! the same queries against committed state and against a transaction's
//! staging overlay.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use super::{Revision, RevisionId};
use crate::item::{ItemGraph, ItemGraphError};

/// Point lookup of revisions by id.
pub trait RevisionLookup {
    fn revision(&self, id: RevisionId) -> Option<&Revision>;
}

/// Errors from walking the DAG.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevisionGraphError {
    #[error("revision {0} not found")]
    MissingRevision(RevisionId),

    #[error("replaying revision {revision} produced an invalid graph: {source}")]
    Replay {
        revision: RevisionId,
        #[source]
        source: ItemGraphError,
    },
}

/// First-parent walk from `from` back to the root revision, `from` first.
pub fn commit_track_ids<L: RevisionLookup + ?Sized>(
    lookup: &L,
    from: RevisionId,
) -> Result<Vec<RevisionId>, RevisionGraphError> {
    let mut ids = Vec::new();
    let mut next = Some(from);
    while let Some(id) = next {
        let revision = lookup
            .revision(id)
            .ok_or(RevisionGraphError::MissingRevision(id))?;
        ids.push(id);
        next = revision.parent();
    }
    Ok(ids)
}

/// Every revision reachable from `from` through any parent, `from` included.
pub fn ancestors<L: RevisionLookup + ?Sized>(lookup: &L, from: RevisionId) -> HashSet<RevisionId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([from]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(revision) = lookup.revision(id) {
            queue.extend(revision.parents().iter().copied());
        }
    }
    seen
}

/// Whether `ancestor` is reachable from `descendant`. A revision is its own
/// ancestor.
pub fn is_ancestor<L: RevisionLookup + ?Sized>(
    lookup: &L,
    ancestor: RevisionId,
    descendant: RevisionId,
) -> bool {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([descendant]);
    while let Some(id) = queue.pop_front() {
        if id == ancestor {
            return true;
        }
        if !seen.insert(id) {
            continue;
        }
        if let Some(revision) = lookup.revision(id) {
            queue.extend(revision.parents().iter().copied());
        }
    }
    false
}

/// Common ancestor of `a` and `b` with the highest revision number.
pub fn lowest_common_ancestor<L: RevisionLookup + ?Sized>(
    lookup: &L,
    a: RevisionId,
    b: RevisionId,
) -> Option<RevisionId> {
    let from_a = ancestors(lookup, a);
    ancestors(lookup, b)
        .into_iter()
        .filter(|id| from_a.contains(id))
        .filter_map(|id| lookup.revision(id))
        .max_by_key(|revision| revision.number())
        .map(Revision::id)
}

/// Rebuilds the item graph at `tip` by replaying first-parent deltas.
///
/// `cached` is consulted for each revision on the way down; replay starts
/// from the first hit instead of the root revision.
pub fn materialize<L, F>(
    lookup: &L,
    root_object: uuid::Uuid,
    tip: RevisionId,
    cached: F,
) -> Result<ItemGraph, RevisionGraphError>
where
    L: RevisionLookup + ?Sized,
    F: Fn(RevisionId) -> Option<Arc<ItemGraph>>,
{
    let mut pending = Vec::new();
    let mut graph = None;
    let mut next = Some(tip);
    while let Some(id) = next {
        if let Some(snapshot) = cached(id) {
            graph = Some(snapshot.as_ref().clone());
            break;
        }
        let revision = lookup
            .revision(id)
            .ok_or(RevisionGraphError::MissingRevision(id))?;
        pending.push(revision);
        next = revision.parent();
    }

    let mut graph = graph.unwrap_or_else(|| ItemGraph::new(root_object));
    for revision in pending.into_iter().rev() {
        graph
            .apply(revision.delta())
            .map_err(|source| RevisionGraphError::Replay {
                revision: revision.id(),
                source,
            })?;
    }
    Ok(graph)
}
