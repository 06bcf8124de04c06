//! Bounded cache of materialized item graphs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::item::ItemGraph;
use crate::revision::RevisionId;

/// FIFO-evicting snapshot cache keyed by revision.
#[derive(Debug)]
pub(crate) struct SnapshotCache {
    capacity: usize,
    graphs: HashMap<RevisionId, Arc<ItemGraph>>,
    order: VecDeque<RevisionId>,
}

impl SnapshotCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            graphs: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn get(&self, revision: RevisionId) -> Option<Arc<ItemGraph>> {
        self.graphs.get(&revision).cloned()
    }

    pub(crate) fn insert(&mut self, revision: RevisionId, graph: Arc<ItemGraph>) {
        if self.graphs.insert(revision, graph).is_some() {
            return;
        }
        self.order.push_back(revision);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.graphs.remove(&evicted);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.graphs.len()
    }
}
