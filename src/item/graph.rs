//! ItemGraph and ItemGraphDelta
//!
//! An item graph is the full state of one persistent root at one revision:
//! a root UUID plus every item reachable from it. A delta is what a single
//! revision changes relative to its first parent. Replaying deltas from the
//! root revision to a tip reproduces the tip's graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ItemGraphError, ItemGraphResult};
use super::Item;

/// Connected set of items forming one persisted aggregate.
///
/// An empty graph (no items) is valid: it is the state of a freshly
/// created persistent root before its root object is first written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemGraph {
    root: Uuid,
    items: BTreeMap<Uuid, Item>,
}

impl ItemGraph {
    /// Creates an empty graph whose root object will be `root`.
    pub fn new(root: Uuid) -> Self {
        Self {
            root,
            items: BTreeMap::new(),
        }
    }

    /// Builds a graph from items. Does not validate.
    pub fn with_items(root: Uuid, items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            root,
            items: items.into_iter().map(|item| (item.uuid(), item)).collect(),
        }
    }

    #[inline]
    pub fn root(&self) -> Uuid {
        self.root
    }

    pub fn item(&self, uuid: Uuid) -> Option<&Item> {
        self.items.get(&uuid)
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.items.contains_key(&uuid)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn uuids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.items.keys().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert_item(&mut self, item: Item) {
        self.items.insert(item.uuid(), item);
    }

    pub fn remove_item(&mut self, uuid: Uuid) -> Option<Item> {
        self.items.remove(&uuid)
    }

    /// Applies a delta in place.
    pub fn apply(&mut self, delta: &ItemGraphDelta) -> ItemGraphResult<()> {
        if delta.root != self.root {
            return Err(ItemGraphError::RootMismatch {
                graph_root: self.root,
                delta_root: delta.root,
            });
        }
        for uuid in &delta.removed {
            self.items.remove(uuid);
        }
        for item in delta.items.values() {
            self.items.insert(item.uuid(), item.clone());
        }
        Ok(())
    }

    /// Checks the composite-tree invariants.
    ///
    /// - the root item is present whenever any item is
    /// - composite references never dangle
    /// - every item has at most one composite parent
    /// - no composite cycles
    /// - every item is reachable from the root
    pub fn validate(&self) -> ItemGraphResult<()> {
        if self.items.is_empty() {
            return Ok(());
        }
        if !self.items.contains_key(&self.root) {
            return Err(ItemGraphError::MissingRoot { root: self.root });
        }

        let mut parents: HashMap<Uuid, Uuid> = HashMap::new();
        for item in self.items.values() {
            for child in item.composite_children() {
                if !self.items.contains_key(&child) {
                    return Err(ItemGraphError::DanglingComposite {
                        owner: item.uuid(),
                        target: child,
                    });
                }
                if child == self.root {
                    return Err(ItemGraphError::CompositeCycle { uuid: child });
                }
                // Listing the same child twice from one owner also counts.
                if parents.insert(child, item.uuid()).is_some() {
                    return Err(ItemGraphError::MultipleParents { uuid: child });
                }
            }
        }

        let mut reached: HashSet<Uuid> = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(uuid) = stack.pop() {
            if !reached.insert(uuid) {
                return Err(ItemGraphError::CompositeCycle { uuid });
            }
            if let Some(item) = self.items.get(&uuid) {
                stack.extend(item.composite_children());
            }
        }

        // With single parents and a root without parents, anything left over
        // is either detached or sits on a cycle that never touches the root.
        if let Some(uuid) = self.items.keys().find(|uuid| !reached.contains(uuid)) {
            return Err(ItemGraphError::Unreachable {
                uuid: *uuid,
                root: self.root,
            });
        }
        Ok(())
    }

    /// UUIDs of `uuid` and everything it transitively owns.
    pub fn composite_subtree(&self, uuid: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![uuid];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(item) = self.items.get(&next) {
                out.push(next);
                let mut children = item.composite_children();
                children.reverse();
                stack.extend(children);
            }
        }
        out
    }

    /// Delta that turns `base` into `target`.
    ///
    /// Items equal in both are omitted; items only in `base` are removed.
    pub fn diff(base: &ItemGraph, target: &ItemGraph) -> ItemGraphDelta {
        let mut delta = ItemGraphDelta::new(target.root);
        for item in target.items() {
            if base.item(item.uuid()) != Some(item) {
                delta.insert_item(item.clone());
            }
        }
        for uuid in base.uuids() {
            if !target.contains(uuid) {
                delta.remove(uuid);
            }
        }
        delta
    }
}

/// The change one revision introduces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemGraphDelta {
    root: Uuid,
    items: BTreeMap<Uuid, Item>,
    removed: BTreeSet<Uuid>,
}

impl ItemGraphDelta {
    /// Creates an empty delta for the graph rooted at `root`.
    pub fn new(root: Uuid) -> Self {
        Self {
            root,
            items: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn root(&self) -> Uuid {
        self.root
    }

    /// Adds or replaces an item. Cancels a pending removal of the same UUID.
    pub fn insert_item(&mut self, item: Item) {
        self.removed.remove(&item.uuid());
        self.items.insert(item.uuid(), item);
    }

    /// Marks `uuid` removed. Cancels a pending write of the same UUID.
    pub fn remove(&mut self, uuid: Uuid) {
        self.items.remove(&uuid);
        self.removed.insert(uuid);
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn removed(&self) -> &BTreeSet<Uuid> {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.removed.is_empty()
    }

    /// Number of written plus removed items.
    pub fn len(&self) -> usize {
        self.items.len() + self.removed.len()
    }
}
