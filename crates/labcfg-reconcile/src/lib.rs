//! LabCfg Reconciliation
//!
//! Turns a submitted snapshot of a child collection into the exact inserts,
//! updates and deletes needed against the persisted snapshot.
//!
//! # Core Concepts
//!
//! - [`Reconciler`]: pure diff of two flat snapshots
//! - [`HierarchyReconciler`]: level-by-level diff of a self-referential forest
//! - [`ChangeSet`]: explicit operation set, applied by the caller
//! - [`IdMap`]: submitted id → final id, filled while applying
//! - [`PartnerLinkBinder`]: mutual sibling references resolved after ids exist
//! - [`SlotPolicy`]: per-slot removal behavior and shape
//!
//! # Example
//!
//! ```rust,ignore
//! use labcfg_reconcile::{plan_slot, SlotPolicy};
//!
//! let changes = plan_slot(&catalog, SlotPolicy::flat(), &submitted, &persisted, owner)?;
//! for delete in &changes.deletes { /* apply */ }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod binder;
mod changeset;
mod error;
mod hierarchy;
mod idmap;
mod policy;
mod reconciler;

pub use binder::{PartnerLink, PartnerLinkBinder};
pub use changeset::{
    ChangeSet, Delete, DeleteMode, DeleteReason, Insert, InsertReason, ParentLink, PlanSummary,
    RecordState, Unchanged, Update,
};
pub use error::ReconcileError;
pub use hierarchy::HierarchyReconciler;
pub use idmap::IdMap;
pub use policy::{RemovalPolicy, SlotPolicy};
pub use reconciler::{plan_slot, Reconciler};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use labcfg_record::types::lab_catalog;
    use labcfg_record::{ChildRecord, RecordId};
    use labcfg_test_utils::{double_field, menu_group, persisted, text_field};
    use proptest::prelude::*;

    /// Apply a change set to an in-memory row list, generating ids from `next`
    fn apply(
        rows: &mut Vec<ChildRecord>,
        changes: &ChangeSet,
        submitted_ids: &[RecordId],
        next: &mut i64,
    ) -> IdMap {
        for delete in &changes.deletes {
            match delete.mode {
                DeleteMode::Hard => rows.retain(|r| r.id != delete.id),
                DeleteMode::Deactivate => {
                    for row in rows.iter_mut().filter(|r| r.id == delete.id) {
                        row.active = false;
                    }
                }
            }
        }
        let mut ids = IdMap::seeded(changes);
        for insert in &changes.inserts {
            let mut row = insert.record.clone();
            row.id = RecordId::new(*next);
            *next += 1;
            if let Some(ParentLink::Batch(position)) = insert.parent {
                row.parent_id = ids.at(position);
            }
            ids.assign(insert.position, submitted_ids[insert.position], row.id);
            rows.push(row);
        }
        for update in &changes.updates {
            if let Some(row) = rows.iter_mut().find(|r| r.id == update.record.id) {
                *row = update.record.clone();
            }
        }
        ids
    }

    #[test]
    fn end_to_end_tag_change_and_insert() {
        let catalog = lab_catalog();
        let owner = RecordId::new(1);
        let mut rows = persisted(vec![double_field(7, 0.0, 5.0)], 1);
        let submitted = vec![double_field(-1, 0.0, 10.0), text_field(7)];

        let changes = Reconciler::new(&catalog)
            .plan(&submitted, &rows, owner)
            .unwrap();
        let submitted_ids: Vec<RecordId> = submitted.iter().map(|r| r.id).collect();
        let mut next = 100;
        let ids = apply(&mut rows, &changes, &submitted_ids, &mut next);

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.id != RecordId::new(7)));

        let double = rows.iter().find(|r| Some(r.id) == ids.at(0)).unwrap();
        assert_eq!(double.tag, "DoubleField");
        assert_eq!(double.attr_f64("min"), Some(0.0));
        assert_eq!(double.attr_f64("max"), Some(10.0));

        let text = rows.iter().find(|r| Some(r.id) == ids.at(1)).unwrap();
        assert_eq!(text.tag, "TextField");
        assert_ne!(text.id, RecordId::new(7));
    }

    #[test]
    fn binder_after_apply_links_new_partners() {
        let catalog = lab_catalog();
        let mut rows = Vec::new();
        let submitted = vec![
            double_field(-1, 0.0, 1.0).with_partner(-2),
            double_field(-2, 0.0, 1.0).with_partner(-1),
        ];
        let changes = Reconciler::new(&catalog)
            .plan(&submitted, &rows, RecordId::new(1))
            .unwrap();
        let submitted_ids: Vec<RecordId> = submitted.iter().map(|r| r.id).collect();
        let mut next = 10;
        let ids = apply(&mut rows, &changes, &submitted_ids, &mut next);

        let links = PartnerLinkBinder::new()
            .bind(&submitted, &ids, |_| None)
            .unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].partner, ids.at(1));
        assert_eq!(links[1].partner, ids.at(0));
    }

    fn field_strategy() -> impl Strategy<Value = ChildRecord> {
        (1i64..40, prop::bool::ANY, 0i32..5).prop_map(|(id, double, order)| {
            let row = if double {
                double_field(id, 0.0, f64::from(order))
            } else {
                text_field(id)
            };
            row.with_order(order)
        })
    }

    proptest! {
        #[test]
        fn reconciling_persisted_snapshot_is_noop(rows in prop::collection::vec(field_strategy(), 0..12)) {
            let mut seen = std::collections::HashSet::new();
            let rows: Vec<ChildRecord> = rows.into_iter().filter(|r| seen.insert(r.id)).collect();
            let stored = persisted(rows, 1);
            let catalog = lab_catalog();

            let changes = Reconciler::new(&catalog)
                .plan(&stored, &stored, RecordId::new(1))
                .unwrap();
            prop_assert!(changes.is_noop());
            prop_assert_eq!(changes.unchanged.len(), stored.len());
        }

        #[test]
        fn absent_rows_are_exactly_the_deletes(keep in prop::collection::vec(prop::bool::ANY, 1..10)) {
            let stored = persisted(
                (0..keep.len()).map(|i| text_field(i as i64 + 1)).collect(),
                1,
            );
            let submitted: Vec<ChildRecord> = stored
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(r, _)| r.clone())
                .collect();
            let catalog = lab_catalog();

            let changes = Reconciler::new(&catalog)
                .plan(&submitted, &stored, RecordId::new(1))
                .unwrap();
            let expected: Vec<RecordId> = stored
                .iter()
                .zip(&keep)
                .filter(|(_, k)| !**k)
                .map(|(r, _)| r.id)
                .collect();
            prop_assert_eq!(changes.deleted_ids(DeleteMode::Hard).collect::<Vec<_>>(), expected);
            prop_assert!(changes.inserts.is_empty() && changes.updates.is_empty());
        }

        #[test]
        fn chain_deletion_removes_every_row(depth in 1usize..8) {
            let stored = persisted(
                (1..=depth as i64)
                    .map(|id| {
                        let node = menu_group(id, "n");
                        if id > 1 { node.with_parent(id - 1) } else { node }
                    })
                    .collect(),
                1,
            );
            let catalog = lab_catalog();
            let changes = HierarchyReconciler::new(Reconciler::new(&catalog))
                .plan(&[], &stored, RecordId::new(1))
                .unwrap();
            prop_assert_eq!(changes.deletes.len(), depth);
            // deepest first
            prop_assert_eq!(changes.deletes[0].id, RecordId::new(depth as i64));
        }
    }
}
