//! Committing a context
//!
//! Commit runs in two phases:
//!
//! 1. Plan: build the target item graph of every changed persistent root
//!    and validate it. Any violation aborts before the store sees anything.
//! 2. Submit: one [`StoreTransaction`] per root, in root order. A failed
//!    transaction stops the commit; roots already submitted stay committed
//!    and the failed root keeps its uncommitted changes.

use std::collections::BTreeMap;

use super::editing_context::PendingRoot;
use super::errors::{ContextError, ContextResult};
use super::object::ObjectOwner;
use super::EditingContext;
use crate::item::{ItemGraph, ItemGraphDelta};
use crate::observability::{log_event_with_fields, Event};
use crate::revision::{BranchId, CommitMetadata, PersistentRootId, RevisionId};
use crate::store::{StoreAction, StoreTransaction};

/// What commit does with one persistent root.
#[derive(Debug)]
enum RootPlan {
    /// Root created and deleted again before any commit.
    Discard,
    Delete,
    Write {
        create: Option<PendingRoot>,
        branch: BranchId,
        parent: RevisionId,
        revision: RevisionId,
        delta: ItemGraphDelta,
    },
    /// Damage that does not change the stored graph.
    Unchanged,
}

impl EditingContext {
    /// Commits every change with fresh metadata.
    ///
    /// Returns the revision written for each persistent root.
    pub fn commit(&mut self) -> ContextResult<BTreeMap<PersistentRootId, RevisionId>> {
        self.commit_with_metadata(CommitMetadata::now())
    }

    /// Commits with a commit type and descriptions recorded on every revision.
    pub fn commit_with_type(
        &mut self,
        commit_type: &str,
        short_description: &str,
        long_description: Option<&str>,
    ) -> ContextResult<BTreeMap<PersistentRootId, RevisionId>> {
        let mut metadata = CommitMetadata::now()
            .with_commit_type(commit_type)
            .with_short_description(short_description);
        if let Some(text) = long_description {
            metadata = metadata.with_long_description(text);
        }
        self.commit_with_metadata(metadata)
    }

    pub fn commit_with_metadata(
        &mut self,
        mut metadata: CommitMetadata,
    ) -> ContextResult<BTreeMap<PersistentRootId, RevisionId>> {
        if metadata.author.is_none() {
            metadata.author = self.config.author.clone();
        }

        let plans = self.plan_commit()?;
        let mut committed = BTreeMap::new();
        if plans.is_empty() {
            return Ok(committed);
        }
        log_event_with_fields(
            Event::ContextCommitStart,
            &[("roots", &plans.len().to_string())],
        );

        for (persistent_root, plan) in plans {
            if let Some(transaction) = self.transaction_for(persistent_root, &plan, &metadata) {
                if let Err(source) = self.store.commit(&transaction) {
                    log_event_with_fields(
                        Event::ContextCommitFailed,
                        &[
                            ("persistent_root", &persistent_root.to_string()),
                            ("code", source.code()),
                            ("error", &source.to_string()),
                        ],
                    );
                    return Err(ContextError::CommitFailed {
                        persistent_root,
                        source,
                    });
                }
            }
            if let Some(revision) = self.settle(persistent_root, plan) {
                committed.insert(persistent_root, revision);
            }
        }

        log_event_with_fields(
            Event::ContextCommitComplete,
            &[("revisions", &committed.len().to_string())],
        );
        Ok(committed)
    }

    fn plan_commit(&mut self) -> ContextResult<Vec<(PersistentRootId, RootPlan)>> {
        let mut plans = Vec::new();
        for persistent_root in self.changed_roots() {
            let plan = self.plan_root(persistent_root)?;
            plans.push((persistent_root, plan));
        }
        Ok(plans)
    }

    fn plan_root(&mut self, persistent_root: PersistentRootId) -> ContextResult<RootPlan> {
        let pending = self.pending_roots.get(&persistent_root).copied();
        if self.deleted_roots.contains(&persistent_root) {
            return Ok(match pending {
                Some(_) => RootPlan::Discard,
                None => RootPlan::Delete,
            });
        }

        let (base, parent, branch) = match pending {
            Some(pending) => (
                ItemGraph::new(pending.root_object),
                pending.initial_revision,
                pending.branch,
            ),
            None => {
                let parent = self.revision_for_root(persistent_root)?;
                let branch = self.branch_for_root(persistent_root)?;
                let base = self.store.item_graph(persistent_root, parent)?;
                ((*base).clone(), parent, branch)
            }
        };

        let mut target = base.clone();
        for uuid in self.objects_in_root(persistent_root) {
            if self.deleted.contains(&uuid) {
                target.remove_item(uuid);
            } else if self.inserted.contains(&uuid) || self.damaged.contains_key(&uuid) {
                if let Some(proxy) = self.objects.get(&uuid) {
                    target.insert_item(proxy.to_item());
                }
            }
        }
        target
            .validate()
            .map_err(|source| ContextError::InvalidGraph {
                persistent_root,
                source,
            })?;

        let delta = ItemGraph::diff(&base, &target);
        if delta.is_empty() && pending.is_none() {
            return Ok(RootPlan::Unchanged);
        }
        Ok(RootPlan::Write {
            create: pending,
            branch,
            parent,
            revision: RevisionId::new(),
            delta,
        })
    }

    fn transaction_for(
        &self,
        persistent_root: PersistentRootId,
        plan: &RootPlan,
        metadata: &CommitMetadata,
    ) -> Option<StoreTransaction> {
        match plan {
            RootPlan::Discard | RootPlan::Unchanged => None,
            RootPlan::Delete => Some(
                StoreTransaction::new().with(StoreAction::DeletePersistentRoot { persistent_root }),
            ),
            RootPlan::Write {
                create,
                branch,
                parent,
                revision,
                delta,
            } => {
                let mut transaction = StoreTransaction::new();
                if let Some(pending) = create {
                    transaction.push(StoreAction::CreatePersistentRoot {
                        persistent_root,
                        root_object: pending.root_object,
                        branch: pending.branch,
                        branch_name: self.config.default_branch_name.clone(),
                        initial_revision: pending.initial_revision,
                        metadata: metadata.clone(),
                    });
                }
                transaction.push(StoreAction::WriteRevision {
                    persistent_root,
                    branch: *branch,
                    revision: *revision,
                    parent_revision: *parent,
                    merged_revisions: Vec::new(),
                    delta: delta.clone(),
                    metadata: metadata.clone(),
                });
                Some(transaction)
            }
        }
    }

    /// Clears the committed root's change tracking. Returns the new revision.
    fn settle(&mut self, persistent_root: PersistentRootId, plan: RootPlan) -> Option<RevisionId> {
        let revision = match plan {
            RootPlan::Discard | RootPlan::Delete => {
                self.forget_root(persistent_root);
                return None;
            }
            RootPlan::Unchanged => None,
            RootPlan::Write {
                branch, revision, ..
            } => {
                self.pending_roots.remove(&persistent_root);
                self.root_branches.insert(persistent_root, branch);
                self.root_revisions.insert(persistent_root, revision);
                Some(revision)
            }
        };

        for uuid in self.objects_in_root(persistent_root) {
            if self.deleted.remove(&uuid) {
                self.objects.remove(&uuid);
                self.damaged.remove(&uuid);
                self.inserted.remove(&uuid);
                continue;
            }
            self.inserted.remove(&uuid);
            self.mark_object_undamaged(uuid);
            if let (Some(revision), Some(proxy)) = (revision, self.objects.get_mut(&uuid)) {
                if !proxy.is_fault() && proxy.pinned_revision().is_none() {
                    proxy.set_loaded_revision(revision);
                }
            }
        }
        revision
    }
}
