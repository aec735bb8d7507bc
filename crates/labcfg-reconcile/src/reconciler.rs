//! Flat snapshot reconciler
//!
//! [`Reconciler`] diffs a submitted snapshot against the persisted snapshot of
//! one slot and returns an explicit [`ChangeSet`]. It is a pure function of
//! its inputs: nothing is read from or written to storage here.
//!
//! Per submitted record:
//! - id `<= 0` → insert, materialized through the catalog
//! - id `> 0`, same tag → update (or unchanged when content is equal)
//! - id `> 0`, different tag → delete the old row, insert a new one
//! - id `> 0`, unknown → `StaleReference`
//!
//! Persisted rows missing from the submission are removed per [`RemovalPolicy`].

use crate::changeset::{
    ChangeSet, Delete, DeleteMode, DeleteReason, Insert, InsertReason, ParentLink, Unchanged,
    Update,
};
use crate::error::ReconcileError;
use crate::hierarchy::HierarchyReconciler;
use crate::policy::{RemovalPolicy, SlotPolicy};
use labcfg_record::{ChildRecord, RecordId, VariantCatalog, VariantEntry};
use std::collections::{HashMap, HashSet};

/// Outcome of reconciling one sibling group
#[derive(Debug, Default)]
pub(crate) struct Level<'p> {
    /// (position, id) of rows that keep their identity
    pub(crate) kept: Vec<(usize, RecordId)>,
    /// Positions of brand-new rows
    pub(crate) inserted: Vec<usize>,
    /// (position, retired id) of rows whose tag changed
    pub(crate) replaced: Vec<(usize, RecordId)>,
    /// Persisted rows missing from the submission
    pub(crate) absent: Vec<&'p ChildRecord>,
}

/// Diff engine for one flat child collection
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'c> {
    catalog: &'c VariantCatalog,
    removal: RemovalPolicy,
}

impl<'c> Reconciler<'c> {
    /// Reconciler with hard deletes
    #[inline]
    #[must_use]
    pub fn new(catalog: &'c VariantCatalog) -> Self {
        Self {
            catalog,
            removal: RemovalPolicy::HardDelete,
        }
    }

    /// With removal policy
    #[inline]
    #[must_use]
    pub fn with_removal(mut self, removal: RemovalPolicy) -> Self {
        self.removal = removal;
        self
    }

    /// Removal policy in effect
    #[inline]
    #[must_use]
    pub fn removal(&self) -> RemovalPolicy {
        self.removal
    }

    /// Catalog used to materialize rows
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &'c VariantCatalog {
        self.catalog
    }

    /// Compute the change set turning `persisted` into `submitted`
    ///
    /// `owner` is stamped onto every inserted row.
    ///
    /// # Errors
    /// - `DuplicateSubmittedId` if a non-zero id appears twice
    /// - `StaleReference` if an id `> 0` is not persisted in this slot
    /// - `UnknownVariant` if a tag is not registered
    pub fn plan(
        &self,
        submitted: &[ChildRecord],
        persisted: &[ChildRecord],
        owner: RecordId,
    ) -> Result<ChangeSet, ReconcileError> {
        check_duplicate_ids(submitted)?;

        let items: Vec<(usize, &ChildRecord)> = submitted.iter().enumerate().collect();
        let rows: Vec<&ChildRecord> = persisted.iter().collect();

        let mut changes = ChangeSet::default();
        let level = self.reconcile_level(&items, &rows, owner, None, &mut changes)?;

        for (_, retired) in level.replaced {
            changes.deletes.push(Delete {
                id: retired,
                mode: DeleteMode::Hard,
                reason: DeleteReason::TagChanged,
            });
        }
        for row in level.absent {
            if let Some(delete) = self.removal_for(row, DeleteReason::Absent) {
                changes.deletes.push(delete);
            }
        }

        let summary = changes.summary();
        tracing::debug!(
            owner = %owner,
            inserts = summary.inserts,
            updates = summary.updates,
            deletes = summary.deletes,
            unchanged = summary.unchanged,
            "flat reconciliation planned"
        );
        Ok(changes)
    }

    /// Reconcile one sibling group
    ///
    /// Emits inserts, updates and unchanged markers into `changes`. Removal of
    /// retired and absent rows is left to the caller, which knows whether
    /// descendants must go too.
    pub(crate) fn reconcile_level<'p>(
        &self,
        submitted: &[(usize, &ChildRecord)],
        persisted: &[&'p ChildRecord],
        owner: RecordId,
        parent: Option<ParentLink>,
        changes: &mut ChangeSet,
    ) -> Result<Level<'p>, ReconcileError> {
        let index: HashMap<RecordId, &ChildRecord> =
            persisted.iter().map(|row| (row.id, *row)).collect();
        let mut level = Level::default();

        for &(position, record) in submitted {
            let entry = self.entry(record)?;

            if record.id.is_new() {
                changes.inserts.push(new_insert(
                    entry,
                    position,
                    record,
                    owner,
                    parent,
                    InsertReason::New,
                ));
                level.inserted.push(position);
                continue;
            }

            let existing = index
                .get(&record.id)
                .copied()
                .ok_or(ReconcileError::StaleReference { id: record.id })?;

            if existing.tag != record.tag {
                // identity is never reused across shapes
                changes.inserts.push(new_insert(
                    entry,
                    position,
                    record,
                    owner,
                    parent,
                    InsertReason::TagChanged {
                        retired: existing.id,
                    },
                ));
                level.replaced.push((position, existing.id));
                continue;
            }

            // rows written outside the engine may lack defaults
            let candidate = entry.materialize(record);
            if entry.materialize(existing).content_eq(&candidate) {
                changes.unchanged.push(Unchanged {
                    position,
                    id: existing.id,
                });
            } else {
                let mut merged = existing.clone();
                merged.overwrite_from(&candidate);
                changes.updates.push(Update {
                    position,
                    record: merged,
                });
            }
            level.kept.push((position, existing.id));
        }

        let seen: HashSet<RecordId> = submitted
            .iter()
            .map(|(_, record)| record.id)
            .filter(|id| !id.is_new())
            .collect();
        level.absent = persisted
            .iter()
            .copied()
            .filter(|row| !seen.contains(&row.id))
            .collect();

        Ok(level)
    }

    /// Removal operation for `row`, or `None` if nothing needs writing
    pub(crate) fn removal_for(&self, row: &ChildRecord, reason: DeleteReason) -> Option<Delete> {
        match self.removal {
            RemovalPolicy::HardDelete => Some(Delete {
                id: row.id,
                mode: DeleteMode::Hard,
                reason,
            }),
            RemovalPolicy::Deactivate => row.active.then_some(Delete {
                id: row.id,
                mode: DeleteMode::Deactivate,
                reason,
            }),
        }
    }

    fn entry(&self, record: &ChildRecord) -> Result<&'c VariantEntry, ReconcileError> {
        self.catalog
            .lookup(record.tag.as_str())
            .ok_or_else(|| ReconcileError::UnknownVariant(record.tag.clone()))
    }
}

/// Plan one slot, choosing the flat or hierarchical reconciler
///
/// # Errors
/// Any [`ReconcileError`] raised by the chosen reconciler
pub fn plan_slot(
    catalog: &VariantCatalog,
    policy: SlotPolicy,
    submitted: &[ChildRecord],
    persisted: &[ChildRecord],
    owner: RecordId,
) -> Result<ChangeSet, ReconcileError> {
    let reconciler = Reconciler::new(catalog).with_removal(policy.removal);
    if policy.hierarchical {
        HierarchyReconciler::new(reconciler).plan(submitted, persisted, owner)
    } else {
        reconciler.plan(submitted, persisted, owner)
    }
}

/// Reject two submitted records sharing one non-zero id
pub(crate) fn check_duplicate_ids(submitted: &[ChildRecord]) -> Result<(), ReconcileError> {
    let mut seen = HashSet::new();
    for record in submitted {
        if !record.id.is_anonymous() && !seen.insert(record.id) {
            return Err(ReconcileError::DuplicateSubmittedId { id: record.id });
        }
    }
    Ok(())
}

fn new_insert(
    entry: &VariantEntry,
    position: usize,
    submitted: &ChildRecord,
    owner: RecordId,
    parent: Option<ParentLink>,
    reason: InsertReason,
) -> Insert {
    let mut record = entry.materialize(submitted);
    record.id = RecordId::NEW;
    record.owner_id = owner;
    // partner links are written by the binder once ids exist
    record.partner_id = None;
    record.parent_id = match parent {
        Some(ParentLink::Existing(id)) => Some(id),
        Some(ParentLink::Batch(_)) | None => None,
    };

    Insert {
        position,
        submitted_id: submitted.id,
        record,
        parent,
        reason,
    }
}
