//! Reconciliation errors

use labcfg_record::{RecordId, VariantTag};

/// Fatal reconciliation failures
///
/// Every variant aborts the request; nothing from a failed plan is applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Submitted id > 0 names no row of this slot
    #[error("record {id} does not exist in this collection")]
    StaleReference {
        /// Submitted id
        id: RecordId,
    },

    /// Two submitted records share one non-zero id
    #[error("id {id} was submitted more than once")]
    DuplicateSubmittedId {
        /// Repeated id
        id: RecordId,
    },

    /// Submitted tag is not in the catalog
    #[error("unknown variant: '{0}'")]
    UnknownVariant(VariantTag),

    /// Hierarchy node whose parent chain does not hold
    #[error("node {id} is orphaned: {reason}")]
    OrphanedNode {
        /// Submitted id of the node
        id: RecordId,
        /// What broke
        reason: String,
    },

    /// Partner reference to a record outside the batch
    #[error("record {record} references partner {partner}, which is not part of the submission")]
    DanglingPartner {
        /// Submitted id of the referencing record
        record: RecordId,
        /// Referenced id
        partner: RecordId,
    },
}

impl ReconcileError {
    /// Taxonomy name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StaleReference { .. } => "StaleReference",
            Self::DuplicateSubmittedId { .. } => "DuplicateSubmittedId",
            Self::UnknownVariant(_) => "UnknownVariant",
            Self::OrphanedNode { .. } => "OrphanedNode",
            Self::DanglingPartner { .. } => "DanglingPartner",
        }
    }

    pub(crate) fn orphaned(id: RecordId, reason: impl Into<String>) -> Self {
        Self::OrphanedNode {
            id,
            reason: reason.into(),
        }
    }
}
