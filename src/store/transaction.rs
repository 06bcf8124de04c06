//! Transactions and receipts

use std::collections::BTreeSet;

use super::StoreAction;
use crate::revision::{PersistentRootId, RevisionId, RevisionNumber};

/// Ordered list of actions applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreTransaction {
    actions: Vec<StoreAction>,
}

impl StoreTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style push.
    pub fn with(mut self, action: StoreAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn push(&mut self, action: StoreAction) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[StoreAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Every persistent root addressed by the transaction.
    pub fn persistent_roots(&self) -> BTreeSet<PersistentRootId> {
        self.actions.iter().map(StoreAction::persistent_root).collect()
    }
}

/// What a committed transaction produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionReceipt {
    revisions: Vec<(RevisionId, RevisionNumber)>,
}

impl TransactionReceipt {
    pub(crate) fn new(revisions: Vec<(RevisionId, RevisionNumber)>) -> Self {
        Self { revisions }
    }

    /// New revisions in the order they were written.
    pub fn revisions(&self) -> &[(RevisionId, RevisionNumber)] {
        &self.revisions
    }

    pub fn number_of(&self, revision: RevisionId) -> Option<RevisionNumber> {
        self.revisions
            .iter()
            .find(|(id, _)| *id == revision)
            .map(|(_, number)| *number)
    }

    /// Number of the last revision written, if any.
    pub fn last_number(&self) -> Option<RevisionNumber> {
        self.revisions.last().map(|(_, number)| *number)
    }
}
