//! Submitted id → final id mapping
//!
//! Filled while a change set is applied: existing rows map to themselves,
//! inserted rows map to the id storage generated for them.

use crate::changeset::ChangeSet;
use labcfg_record::RecordId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Final ids by submission position and by non-zero submitted id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMap {
    by_position: BTreeMap<usize, RecordId>,
    by_submitted: BTreeMap<RecordId, RecordId>,
}

impl IdMap {
    /// Empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map seeded with every row that keeps its identity
    #[must_use]
    pub fn seeded(changes: &ChangeSet) -> Self {
        let mut map = Self::new();
        for update in &changes.updates {
            map.assign(update.position, update.record.id, update.record.id);
        }
        for unchanged in &changes.unchanged {
            map.assign(unchanged.position, unchanged.id, unchanged.id);
        }
        map
    }

    /// Record the final id of the row submitted at `position`
    ///
    /// Anonymous `0` ids are tracked by position only.
    pub fn assign(&mut self, position: usize, submitted: RecordId, actual: RecordId) {
        self.by_position.insert(position, actual);
        if !submitted.is_anonymous() {
            self.by_submitted.insert(submitted, actual);
        }
    }

    /// Final id of the record at `position`
    #[inline]
    #[must_use]
    pub fn at(&self, position: usize) -> Option<RecordId> {
        self.by_position.get(&position).copied()
    }

    /// Final id for a submitted (possibly placeholder) id
    #[inline]
    #[must_use]
    pub fn resolve(&self, submitted: RecordId) -> Option<RecordId> {
        if submitted.is_anonymous() {
            return None;
        }
        self.by_submitted.get(&submitted).copied()
    }

    /// Number of positions mapped
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_position.len()
    }

    /// True if nothing is mapped
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_position.is_empty()
    }
}
