//! Per-slot reconciliation policy

use serde::{Deserialize, Serialize};

/// What happens to persisted rows missing from a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Remove the row
    #[default]
    HardDelete,
    /// Keep the row, clear its `active` flag
    Deactivate,
}

/// Shape and removal behavior of one child collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotPolicy {
    /// Absent-row handling
    pub removal: RemovalPolicy,
    /// Records form a forest through `parentId`
    pub hierarchical: bool,
}

impl SlotPolicy {
    /// Flat collection with hard deletes
    #[inline]
    #[must_use]
    pub fn flat() -> Self {
        Self::default()
    }

    /// Forest with hard deletes
    #[inline]
    #[must_use]
    pub fn forest() -> Self {
        Self {
            hierarchical: true,
            ..Self::default()
        }
    }

    /// With removal policy
    #[inline]
    #[must_use]
    pub fn with_removal(mut self, removal: RemovalPolicy) -> Self {
        self.removal = removal;
        self
    }
}
