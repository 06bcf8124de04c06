//! Commit tracks: linear history derived from the revision DAG

use std::sync::Arc;

use super::{Revision, RevisionId, RevisionNumber};

/// Revisions reachable from a tip by first-parent links, tip first.
///
/// Never stored; always rebuilt from the DAG.
#[derive(Debug, Clone)]
pub struct CommitTrack {
    revisions: Vec<Arc<Revision>>,
}

impl CommitTrack {
    pub(crate) fn new(revisions: Vec<Arc<Revision>>) -> Self {
        Self { revisions }
    }

    pub fn tip(&self) -> Option<&Revision> {
        self.revisions.first().map(Arc::as_ref)
    }

    /// The root revision at the far end of the track.
    pub fn root(&self) -> Option<&Revision> {
        self.revisions.last().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Tip first.
    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter().map(Arc::as_ref)
    }

    pub fn ids(&self) -> Vec<RevisionId> {
        self.iter().map(Revision::id).collect()
    }

    pub fn contains(&self, id: RevisionId) -> bool {
        self.iter().any(|rev| rev.id() == id)
    }

    /// Newest revision on the track numbered at most `max`.
    pub fn latest_at_or_below(&self, max: RevisionNumber) -> Option<&Revision> {
        self.iter().find(|rev| rev.number() <= max)
    }
}
