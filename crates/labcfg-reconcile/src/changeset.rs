//! Change sets
//!
//! The explicit output of a reconciliation pass. Nothing here touches storage;
//! the caller applies deletes first, then inserts and updates.

use labcfg_record::{ChildRecord, RecordId};
use serde::Serialize;

/// Where a new hierarchy node hangs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParentLink {
    /// Under a row that already has an id
    Existing(RecordId),
    /// Under the row inserted for this submission position
    Batch(usize),
}

/// Why a row is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum InsertReason {
    /// Submitted as new
    New,
    /// Replaces a row whose tag changed
    TagChanged {
        /// Id the old row held
        retired: RecordId,
    },
}

/// Row to insert
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insert {
    /// Submission position
    pub position: usize,
    /// Id as submitted (placeholder or retired id)
    pub submitted_id: RecordId,
    /// Materialized row; id is assigned by storage
    pub record: ChildRecord,
    /// Hierarchy parent, if any
    pub parent: Option<ParentLink>,
    /// Why
    pub reason: InsertReason,
}

/// Existing row whose content changes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    /// Submission position
    pub position: usize,
    /// Persisted row with submitted attributes copied on
    pub record: ChildRecord,
}

/// Existing row resubmitted without changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unchanged {
    /// Submission position
    pub position: usize,
    /// Persisted id
    pub id: RecordId,
}

/// How a row is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteMode {
    /// Row is removed
    Hard,
    /// Row is kept with `active = false`
    Deactivate,
}

/// Why a row is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteReason {
    /// Missing from the submission
    Absent,
    /// Submitted with a different tag
    TagChanged,
    /// Descendant of a removed or retired node
    Cascade,
}

/// Row to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delete {
    /// Persisted id
    pub id: RecordId,
    /// Hard or soft
    pub mode: DeleteMode,
    /// Why
    pub reason: DeleteReason,
}

/// Terminal state of one record for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordState {
    /// New row created
    Inserted,
    /// Existing identity kept, content written
    Updated,
    /// Existing identity kept, nothing written
    Unchanged,
    /// Old identity deleted, new identity inserted
    Replaced,
    /// Persisted row removed
    Deleted,
    /// Persisted row soft-deactivated
    Deactivated,
}

/// Operation counts, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    pub unchanged: usize,
}

/// Inserts, updates and deletes for one slot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Rows to insert, parents before children
    pub inserts: Vec<Insert>,
    /// Rows to update
    pub updates: Vec<Update>,
    /// Rows to remove, descendants before ancestors
    pub deletes: Vec<Delete>,
    /// Rows resubmitted as-is
    pub unchanged: Vec<Unchanged>,
}

impl ChangeSet {
    /// True if applying this set writes nothing
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Operation counts
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            inserts: self.inserts.len(),
            updates: self.updates.len(),
            deletes: self.deletes.len(),
            unchanged: self.unchanged.len(),
        }
    }

    /// Outcome for the submitted record at `position`
    #[must_use]
    pub fn state_of(&self, position: usize) -> Option<RecordState> {
        if let Some(insert) = self.inserts.iter().find(|i| i.position == position) {
            return Some(match insert.reason {
                InsertReason::New => RecordState::Inserted,
                InsertReason::TagChanged { .. } => RecordState::Replaced,
            });
        }
        if self.updates.iter().any(|u| u.position == position) {
            return Some(RecordState::Updated);
        }
        if self.unchanged.iter().any(|u| u.position == position) {
            return Some(RecordState::Unchanged);
        }
        None
    }

    /// Outcome for a persisted row that is being removed
    #[must_use]
    pub fn removal_of(&self, id: RecordId) -> Option<RecordState> {
        self.deletes.iter().find(|d| d.id == id).map(|d| match d.mode {
            DeleteMode::Hard => RecordState::Deleted,
            DeleteMode::Deactivate => RecordState::Deactivated,
        })
    }

    /// Ids removed with `mode`
    pub fn deleted_ids(&self, mode: DeleteMode) -> impl Iterator<Item = RecordId> + '_ {
        self.deletes
            .iter()
            .filter(move |d| d.mode == mode)
            .map(|d| d.id)
    }
}
