//! Hierarchy reconciler
//!
//! Applies the flat [`Reconciler`] level by level over a self-referential
//! forest: each sibling group is reconciled against the persisted children of
//! the same parent, then the walk descends into every kept, new or replaced
//! node.
//!
//! Removing a node removes its whole subtree. Existing nodes may not change
//! parents: a node submitted under a different parent, or under an ancestor
//! that is being removed or replaced, is rejected with `OrphanedNode`.

use crate::changeset::{ChangeSet, Delete, DeleteMode, DeleteReason, ParentLink};
use crate::error::ReconcileError;
use crate::reconciler::{check_duplicate_ids, Reconciler};
use labcfg_record::{ChildRecord, RecordId};
use std::collections::{HashMap, HashSet};

/// Where a sibling group hangs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// Top level of the forest
    Root,
    /// Under a node that keeps its identity
    Existing(RecordId),
    /// Under a node inserted at this submission position
    New(usize),
}

impl Anchor {
    fn link(self) -> Option<ParentLink> {
        match self {
            Self::Root => None,
            Self::Existing(id) => Some(ParentLink::Existing(id)),
            Self::New(position) => Some(ParentLink::Batch(position)),
        }
    }
}

/// Persisted rows indexed as a forest
#[derive(Debug)]
struct PersistedForest<'a> {
    by_id: HashMap<RecordId, &'a ChildRecord>,
    parents: HashMap<RecordId, Option<RecordId>>,
    children: HashMap<Option<RecordId>, Vec<&'a ChildRecord>>,
}

impl<'a> PersistedForest<'a> {
    fn build(rows: &'a [ChildRecord]) -> Self {
        let by_id: HashMap<RecordId, &ChildRecord> = rows.iter().map(|r| (r.id, r)).collect();
        let parents = Self::effective_parents(&by_id, rows);
        let mut children: HashMap<Option<RecordId>, Vec<&ChildRecord>> = HashMap::new();
        for row in rows {
            let parent = parents.get(&row.id).copied().flatten();
            children.entry(parent).or_default().push(row);
        }
        Self {
            by_id,
            parents,
            children,
        }
    }

    /// Parent of every row once bad pointers are cut
    ///
    /// Dangling or self parent pointers put the row at the top level, and so
    /// does membership in a parent cycle.
    fn effective_parents(
        by_id: &HashMap<RecordId, &ChildRecord>,
        rows: &[ChildRecord],
    ) -> HashMap<RecordId, Option<RecordId>> {
        let raw = |id: RecordId| -> Option<RecordId> {
            by_id.get(&id).and_then(|row| {
                row.parent_id
                    .filter(|parent| *parent != id && by_id.contains_key(parent))
            })
        };

        let mut settled: HashMap<RecordId, Option<RecordId>> = HashMap::new();
        for row in rows {
            let mut chain: Vec<RecordId> = Vec::new();
            let mut on_chain: HashSet<RecordId> = HashSet::new();
            let mut cursor = Some(row.id);
            while let Some(id) = cursor {
                if settled.contains_key(&id) {
                    break;
                }
                if !on_chain.insert(id) {
                    let start = chain.iter().position(|member| *member == id).unwrap_or(0);
                    for member in chain.drain(start..) {
                        tracing::warn!(id = %member, "persisted parent cycle, node lifted to top level");
                        settled.insert(member, None);
                    }
                    break;
                }
                chain.push(id);
                cursor = raw(id);
            }
            for id in chain {
                settled.insert(id, raw(id));
            }
        }
        settled
    }

    fn contains(&self, id: RecordId) -> bool {
        self.by_id.contains_key(&id)
    }

    fn parent_of(&self, id: RecordId) -> Option<RecordId> {
        self.parents.get(&id).copied().flatten()
    }

    fn children_of(&self, parent: Option<RecordId>) -> Vec<&'a ChildRecord> {
        self.children.get(&parent).cloned().unwrap_or_default()
    }

    /// Every descendant of `id`, deepest first
    fn descendants(&self, id: RecordId) -> Vec<&'a ChildRecord> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        // (node, its children, next child to visit)
        let mut stack: Vec<(Option<&'a ChildRecord>, Vec<&'a ChildRecord>, usize)> =
            vec![(None, self.children_of(Some(id)), 0)];

        while let Some((node, kids, next)) = stack.last_mut() {
            if let Some(child) = kids.get(*next).copied() {
                *next += 1;
                if seen.insert(child.id) {
                    stack.push((Some(child), self.children_of(Some(child.id)), 0));
                }
            } else {
                let finished = *node;
                stack.pop();
                out.extend(finished);
            }
        }
        out
    }
}

/// State carried through one walk
struct Walk<'a> {
    submitted: &'a [ChildRecord],
    forest: PersistedForest<'a>,
    children: HashMap<usize, Vec<usize>>,
    positions: HashMap<RecordId, usize>,
    visited: HashSet<usize>,
    owner: RecordId,
    changes: ChangeSet,
}

/// Forest-aware reconciler
#[derive(Debug, Clone, Copy)]
pub struct HierarchyReconciler<'c> {
    reconciler: Reconciler<'c>,
}

impl<'c> HierarchyReconciler<'c> {
    /// Wrap a flat reconciler
    #[inline]
    #[must_use]
    pub fn new(reconciler: Reconciler<'c>) -> Self {
        Self { reconciler }
    }

    /// Compute the change set for a whole forest
    ///
    /// Inserts are ordered parents first. A child of a new node carries
    /// [`ParentLink::Batch`] with its parent's submission position.
    ///
    /// # Errors
    /// - `DuplicateSubmittedId`, `StaleReference`, `UnknownVariant` as for flat slots
    /// - `OrphanedNode` if a node's parent is missing, moved, removed or retired
    pub fn plan(
        &self,
        submitted: &[ChildRecord],
        persisted: &[ChildRecord],
        owner: RecordId,
    ) -> Result<ChangeSet, ReconcileError> {
        check_duplicate_ids(submitted)?;

        let forest = PersistedForest::build(persisted);
        if let Some(stale) = submitted
            .iter()
            .find(|r| !r.id.is_new() && !forest.contains(r.id))
        {
            return Err(ReconcileError::StaleReference { id: stale.id });
        }

        let positions: HashMap<RecordId, usize> = submitted
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.id.is_anonymous())
            .map(|(position, r)| (r.id, position))
            .collect();

        let mut roots = Vec::new();
        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        for (position, record) in submitted.iter().enumerate() {
            match record.parent_id {
                None => roots.push(position),
                Some(parent) => match positions.get(&parent) {
                    Some(&parent_position) if parent_position != position => {
                        children.entry(parent_position).or_default().push(position);
                    }
                    Some(_) => {
                        return Err(ReconcileError::orphaned(
                            record.id,
                            "a node cannot be its own parent",
                        ))
                    }
                    None => {
                        return Err(ReconcileError::orphaned(
                            record.id,
                            format!("parent {parent} is not part of the submission"),
                        ))
                    }
                },
            }
        }

        let mut walk = Walk {
            submitted,
            forest,
            children,
            positions,
            visited: HashSet::new(),
            owner,
            changes: ChangeSet::default(),
        };
        // sibling groups still to reconcile, taken depth first
        let mut pending = vec![(roots, Anchor::Root)];
        while let Some((group, anchor)) = pending.pop() {
            let below = self.reconcile_group(&mut walk, &group, anchor)?;
            pending.extend(below.into_iter().rev());
        }

        if let Some(unreached) = (0..submitted.len()).find(|p| !walk.visited.contains(p)) {
            return Err(ReconcileError::orphaned(
                submitted[unreached].id,
                "parent chain never reaches a top-level node",
            ));
        }

        let summary = walk.changes.summary();
        tracing::debug!(
            owner = %owner,
            inserts = summary.inserts,
            updates = summary.updates,
            deletes = summary.deletes,
            unchanged = summary.unchanged,
            "hierarchy reconciliation planned"
        );
        Ok(walk.changes)
    }

    /// Reconcile one sibling group and return the groups hanging below it
    fn reconcile_group(
        &self,
        walk: &mut Walk<'_>,
        group: &[usize],
        anchor: Anchor,
    ) -> Result<Vec<(Vec<usize>, Anchor)>, ReconcileError> {
        let submitted = walk.submitted;

        for &position in group {
            walk.visited.insert(position);
            let record = &submitted[position];
            if record.id.is_new() {
                continue;
            }
            let stored_parent = walk.forest.parent_of(record.id);
            match anchor {
                Anchor::Root if stored_parent.is_none() => {}
                Anchor::Existing(parent) if stored_parent == Some(parent) => {}
                Anchor::New(_) => {
                    return Err(ReconcileError::orphaned(
                        record.id,
                        "its parent is being replaced by a new row",
                    ))
                }
                Anchor::Root | Anchor::Existing(_) => {
                    return Err(ReconcileError::orphaned(
                        record.id,
                        "moved to a different parent; submit a delete and an insert instead",
                    ))
                }
            }
        }

        let stored_siblings = match anchor {
            Anchor::Root => walk.forest.children_of(None),
            Anchor::Existing(parent) => walk.forest.children_of(Some(parent)),
            Anchor::New(_) => Vec::new(),
        };
        let items: Vec<(usize, &ChildRecord)> =
            group.iter().map(|&p| (p, &submitted[p])).collect();

        let level = self.reconciler.reconcile_level(
            &items,
            &stored_siblings,
            walk.owner,
            anchor.link(),
            &mut walk.changes,
        )?;

        for &(_, retired) in &level.replaced {
            self.retire(walk, retired, DeleteReason::TagChanged, true)?;
        }
        for row in &level.absent {
            self.retire(walk, row.id, DeleteReason::Absent, false)?;
        }

        // kept nodes are visited even without submitted children so their
        // stored children are removed
        let kept = level
            .kept
            .iter()
            .map(|&(position, id)| (position, Anchor::Existing(id)));
        let fresh = level
            .inserted
            .iter()
            .copied()
            .chain(level.replaced.iter().map(|(position, _)| *position))
            .map(|position| (position, Anchor::New(position)));
        let below = kept
            .chain(fresh)
            .map(|(position, anchor)| {
                let kids = walk.children.get(&position).cloned().unwrap_or_default();
                (kids, anchor)
            })
            .collect();

        Ok(below)
    }

    /// Remove `id` and its persisted subtree, descendants first
    ///
    /// Retired identities (tag change) are always hard-deleted; absent nodes
    /// follow the slot's removal policy.
    fn retire(
        &self,
        walk: &mut Walk<'_>,
        id: RecordId,
        reason: DeleteReason,
        hard: bool,
    ) -> Result<(), ReconcileError> {
        let descendants = walk.forest.descendants(id);
        if let Some(kept) = descendants
            .iter()
            .find(|d| walk.positions.contains_key(&d.id))
        {
            return Err(ReconcileError::orphaned(
                kept.id,
                format!("ancestor {id} is being removed"),
            ));
        }

        let Some(&node) = walk.forest.by_id.get(&id) else {
            return Ok(());
        };
        let rows = descendants
            .into_iter()
            .map(|row| (row, DeleteReason::Cascade))
            .chain(std::iter::once((node, reason)));

        for (row, why) in rows {
            let delete = if hard {
                Some(Delete {
                    id: row.id,
                    mode: DeleteMode::Hard,
                    reason: why,
                })
            } else {
                self.reconciler.removal_for(row, why)
            };
            if let Some(delete) = delete {
                walk.changes.deletes.push(delete);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{InsertReason, RecordState};
    use crate::policy::RemovalPolicy;
    use labcfg_record::types::lab_catalog;
    use labcfg_record::VariantCatalog;
    use labcfg_test_utils::{menu_group, menu_link, persisted};
    use pretty_assertions::assert_eq;

    const OWNER: RecordId = RecordId::new(3);

    fn reconciler(catalog: &VariantCatalog) -> HierarchyReconciler<'_> {
        HierarchyReconciler::new(Reconciler::new(catalog))
    }

    fn stored_tree() -> Vec<ChildRecord> {
        persisted(
            vec![
                menu_group(1, "Setup"),
                menu_group(2, "Procedures").with_parent(1),
                menu_link(3, "Panels", "/panels").with_parent(2),
                menu_group(4, "Reports"),
            ],
            3,
        )
    }

    fn deleted_ids(changes: &ChangeSet) -> Vec<i64> {
        changes.deletes.iter().map(|d| d.id.get()).collect()
    }

    #[test]
    fn resubmitted_tree_is_noop() {
        let catalog = lab_catalog();
        let stored = stored_tree();
        let changes = reconciler(&catalog).plan(&stored, &stored, OWNER).unwrap();
        assert!(changes.is_noop());
        assert_eq!(changes.unchanged.len(), 4);
    }

    #[test]
    fn removing_a_node_removes_its_subtree() {
        let catalog = lab_catalog();
        let stored = stored_tree();
        let submitted = vec![stored[3].clone()];

        let changes = reconciler(&catalog).plan(&submitted, &stored, OWNER).unwrap();

        assert_eq!(deleted_ids(&changes), vec![3, 2, 1]);
        assert_eq!(changes.deletes[2].reason, DeleteReason::Absent);
        assert_eq!(changes.deletes[0].reason, DeleteReason::Cascade);
    }

    #[test]
    fn descendant_of_removed_node_is_orphaned() {
        let catalog = lab_catalog();
        let stored = stored_tree();
        // node 2 dropped, its child 3 still submitted under it
        let submitted = vec![stored[0].clone(), stored[2].clone(), stored[3].clone()];

        let err = reconciler(&catalog).plan(&submitted, &stored, OWNER).unwrap_err();
        assert_eq!(err.kind(), "OrphanedNode");
    }

    #[test]
    fn descendant_kept_at_top_level_is_orphaned() {
        let catalog = lab_catalog();
        let stored = stored_tree();
        let mut moved = stored[2].clone();
        moved.parent_id = None;
        let submitted = vec![stored[3].clone(), moved];

        let err = reconciler(&catalog).plan(&submitted, &stored, OWNER).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::OrphanedNode { id, .. } if id == RecordId::new(3)
        ));
    }

    #[test]
    fn moving_between_parents_is_rejected() {
        let catalog = lab_catalog();
        let stored = stored_tree();
        let mut submitted = stored.clone();
        submitted[2].parent_id = Some(RecordId::new(4));

        let err = reconciler(&catalog).plan(&submitted, &stored, OWNER).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::OrphanedNode { id, .. } if id == RecordId::new(3)
        ));
    }

    #[test]
    fn new_subtree_inserts_parents_first() {
        let catalog = lab_catalog();
        let submitted = vec![
            menu_link(-3, "Leaf", "/leaf").with_parent(-2),
            menu_group(-1, "Top"),
            menu_group(-2, "Middle").with_parent(-1),
        ];

        let changes = reconciler(&catalog).plan(&submitted, &[], OWNER).unwrap();

        let order: Vec<(usize, Option<ParentLink>)> = changes
            .inserts
            .iter()
            .map(|i| (i.position, i.parent))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, None),
                (2, Some(ParentLink::Batch(1))),
                (0, Some(ParentLink::Batch(2))),
            ]
        );
    }

    #[test]
    fn new_child_under_existing_node() {
        let catalog = lab_catalog();
        let stored = stored_tree();
        let mut submitted = stored.clone();
        submitted.push(menu_link(-1, "Clients", "/clients").with_parent(4));

        let changes = reconciler(&catalog).plan(&submitted, &stored, OWNER).unwrap();

        assert_eq!(changes.inserts.len(), 1);
        let insert = &changes.inserts[0];
        assert_eq!(insert.parent, Some(ParentLink::Existing(RecordId::new(4))));
        assert_eq!(insert.record.parent_id, Some(RecordId::new(4)));
        assert_eq!(insert.record.owner_id, OWNER);
    }

    #[test]
    fn tag_change_retires_the_subtree() {
        let catalog = lab_catalog();
        let stored = stored_tree();
        let submitted = vec![
            menu_link(1, "Setup", "/setup"),
            stored[3].clone(),
        ];

        let changes = reconciler(&catalog).plan(&submitted, &stored, OWNER).unwrap();

        assert_eq!(deleted_ids(&changes), vec![3, 2, 1]);
        assert_eq!(
            changes.deletes[2],
            Delete {
                id: RecordId::new(1),
                mode: DeleteMode::Hard,
                reason: DeleteReason::TagChanged,
            }
        );
        assert_eq!(
            changes.inserts[0].reason,
            InsertReason::TagChanged {
                retired: RecordId::new(1)
            }
        );
        assert_eq!(changes.state_of(1), Some(RecordState::Unchanged));
    }

    #[test]
    fn existing_child_of_retired_node_is_orphaned() {
        let catalog = lab_catalog();
        let stored = stored_tree();
        let submitted = vec![
            menu_link(1, "Setup", "/setup"),
            stored[1].clone(),
            stored[2].clone(),
            stored[3].clone(),
        ];

        let err = reconciler(&catalog).plan(&submitted, &stored, OWNER).unwrap_err();
        assert_eq!(err.kind(), "OrphanedNode");
    }

    #[test]
    fn parent_missing_from_submission() {
        let catalog = lab_catalog();
        let err = reconciler(&catalog)
            .plan(&[menu_group(-1, "x").with_parent(-9)], &[], OWNER)
            .unwrap_err();
        assert_eq!(err.kind(), "OrphanedNode");
    }

    #[test]
    fn cycles_never_reach_the_top() {
        let catalog = lab_catalog();
        let submitted = vec![
            menu_group(-1, "a").with_parent(-2),
            menu_group(-2, "b").with_parent(-1),
        ];
        let err = reconciler(&catalog).plan(&submitted, &[], OWNER).unwrap_err();
        assert_eq!(err.kind(), "OrphanedNode");
    }

    #[test]
    fn stale_node_id() {
        let catalog = lab_catalog();
        let err = reconciler(&catalog)
            .plan(&[menu_group(77, "x")], &stored_tree(), OWNER)
            .unwrap_err();
        assert_eq!(
            err,
            ReconcileError::StaleReference {
                id: RecordId::new(77)
            }
        );
    }

    fn chain(depth: i64) -> Vec<ChildRecord> {
        let rows = (1..=depth)
            .map(|id| {
                let node = menu_group(id, "level");
                if id == 1 {
                    node
                } else {
                    node.with_parent(id - 1)
                }
            })
            .collect();
        persisted(rows, 3)
    }

    #[test]
    fn deep_chains_are_walked_without_recursion() {
        let catalog = lab_catalog();
        let stored = chain(50_000);

        let changes = reconciler(&catalog).plan(&stored, &stored, OWNER).unwrap();
        assert!(changes.is_noop());

        let changes = reconciler(&catalog).plan(&[], &stored, OWNER).unwrap();
        assert_eq!(changes.deletes.len(), 50_000);
        assert_eq!(changes.deletes[0].id, RecordId::new(50_000));
        assert_eq!(changes.deletes[49_999].id, RecordId::new(1));
    }

    #[test]
    fn persisted_parent_cycle_can_be_removed() {
        let catalog = lab_catalog();
        let stored = persisted(
            vec![
                menu_group(1, "a").with_parent(2),
                menu_group(2, "b").with_parent(1),
                menu_link(5, "hangs off the cycle", "/x").with_parent(2),
                menu_group(4, "Reports"),
            ],
            3,
        );
        let submitted = vec![stored[3].clone()];

        let changes = reconciler(&catalog).plan(&submitted, &stored, OWNER).unwrap();

        let mut removed = deleted_ids(&changes);
        removed.sort_unstable();
        assert_eq!(removed, vec![1, 2, 5]);
        assert_eq!(changes.state_of(0), Some(RecordState::Unchanged));
    }

    #[test]
    fn cycle_member_resubmitted_at_top_level_is_kept() {
        let catalog = lab_catalog();
        let stored = persisted(
            vec![
                menu_group(1, "a").with_parent(2),
                menu_group(2, "b").with_parent(1),
            ],
            3,
        );
        let mut first = stored[0].clone();
        first.parent_id = None;

        let changes = reconciler(&catalog).plan(&[first], &stored, OWNER).unwrap();

        assert_eq!(changes.updates.len(), 1);
        assert_eq!(changes.updates[0].record.id, RecordId::new(1));
        assert_eq!(changes.updates[0].record.parent_id, None);
        assert_eq!(deleted_ids(&changes), vec![2]);
    }

    #[test]
    fn deactivate_policy_cascades_softly() {
        let catalog = lab_catalog();
        let mut stored = stored_tree();
        stored[2].active = false;
        let submitted = vec![stored[3].clone()];

        let changes = HierarchyReconciler::new(
            Reconciler::new(&catalog).with_removal(RemovalPolicy::Deactivate),
        )
        .plan(&submitted, &stored, OWNER)
        .unwrap();

        // node 3 was already inactive
        assert_eq!(deleted_ids(&changes), vec![2, 1]);
        assert!(changes
            .deletes
            .iter()
            .all(|d| d.mode == DeleteMode::Deactivate));
    }
}
