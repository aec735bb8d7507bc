//! Snapshot digests
//!
//! Provides [`SnapshotDigest`], a 32-byte Blake3 digest over a normalized
//! snapshot. Two snapshots with the same rows (in any order) share a digest.

use crate::record::{ChildRecord, RecordId};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// Blake3 digest of a normalized snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SnapshotDigest([u8; 32]);

/// Fields that take part in the digest
#[derive(Serialize)]
struct DigestView<'a> {
    id: RecordId,
    tag: &'a str,
    parent: Option<RecordId>,
    partner: Option<RecordId>,
    order: Option<i32>,
    row: Option<i32>,
    code: Option<&'a str>,
    active: bool,
    payload: &'a crate::record::Payload,
    resolved: &'a std::collections::BTreeMap<String, RecordId>,
}

impl SnapshotDigest {
    /// Digest a snapshot
    ///
    /// Rows are ordered by id first, so submission order does not matter.
    /// The owner key is excluded because it is implied by the slot.
    #[must_use]
    pub fn of(records: &[ChildRecord]) -> Self {
        let mut sorted: Vec<&ChildRecord> = records.iter().collect();
        sorted.sort_by_key(|r| r.id);

        let mut hasher = blake3::Hasher::new();
        for record in sorted {
            let view = DigestView {
                id: record.id,
                tag: record.tag.as_str(),
                parent: record.parent_id,
                partner: record.partner_id,
                order: record.order,
                row: record.row,
                code: record.trimmed_code(),
                active: record.active,
                payload: &record.payload,
                resolved: &record.resolved,
            };
            // BTreeMap-backed views serialize deterministically
            let bytes = serde_json::to_vec(&view).unwrap_or_default();
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for SnapshotDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for SnapshotDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
