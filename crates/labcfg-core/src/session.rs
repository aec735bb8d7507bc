//! Persistence session
//!
//! The only collaborator the pipeline consumes. A session offers one
//! transaction at a time: writes are only legal between `begin` and
//! `commit`/`rollback`, and nothing written is visible to other sessions
//! until `commit`.

use crate::error::SessionError;
use async_trait::async_trait;
use labcfg_record::{ChildRecord, RecordId};
use labcfg_xref::Scope;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// One child collection of one root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    /// Tenant owning the root
    pub tenant: i64,
    /// Kind of root (e.g. `procedure`)
    pub root_kind: String,
    /// Root id
    pub root_id: RecordId,
    /// Collection name (e.g. `fields`)
    pub slot: String,
}

impl SlotKey {
    /// Create a slot key
    #[must_use]
    pub fn new(
        tenant: i64,
        root_kind: impl Into<String>,
        root_id: impl Into<RecordId>,
        slot: impl Into<String>,
    ) -> Self {
        Self {
            tenant,
            root_kind: root_kind.into(),
            root_id: root_id.into(),
            slot: slot.into(),
        }
    }

    /// True if `other` is the same collection under another root of the tenant
    #[must_use]
    pub fn is_peer_of(&self, other: &Self) -> bool {
        self.tenant == other.tenant
            && self.root_kind == other.root_kind
            && self.slot == other.slot
            && self.root_id != other.root_id
    }
}

impl Display for SlotKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.tenant, self.root_kind, self.root_id, self.slot
        )
    }
}

/// Transactional access to persisted child collections
#[async_trait]
pub trait PersistenceSession: Send + Sync {
    /// Start a transaction
    async fn begin(&mut self) -> Result<(), SessionError>;

    /// Make every staged write visible atomically
    async fn commit(&mut self) -> Result<(), SessionError>;

    /// Discard every staged write
    async fn rollback(&mut self) -> Result<(), SessionError>;

    /// True if the slot's root is persisted
    async fn root_exists(&self, slot: &SlotKey) -> Result<bool, SessionError>;

    /// Current rows of a slot, in display order
    async fn load_slot(&self, slot: &SlotKey) -> Result<Vec<ChildRecord>, SessionError>;

    /// Rows of the same collection under the tenant's other roots
    async fn load_peers(&self, slot: &SlotKey) -> Result<Vec<ChildRecord>, SessionError>;

    /// One row by id
    async fn find_by_id(
        &self,
        slot: &SlotKey,
        id: RecordId,
    ) -> Result<Option<ChildRecord>, SessionError>;

    /// Every id registered under a natural key
    async fn find_by_natural_key(
        &self,
        scope: &Scope,
        key: &str,
    ) -> Result<Vec<RecordId>, SessionError>;

    /// Insert a row; returns the generated id
    async fn insert(
        &mut self,
        slot: &SlotKey,
        record: ChildRecord,
    ) -> Result<RecordId, SessionError>;

    /// Overwrite a row in place
    async fn update(&mut self, slot: &SlotKey, record: ChildRecord) -> Result<(), SessionError>;

    /// Remove a row
    async fn delete(&mut self, slot: &SlotKey, id: RecordId) -> Result<(), SessionError>;

    /// Clear a row's `active` flag
    async fn deactivate(&mut self, slot: &SlotKey, id: RecordId) -> Result<(), SessionError>;

    /// Write a row's partner link
    async fn set_partner(
        &mut self,
        slot: &SlotKey,
        id: RecordId,
        partner: Option<RecordId>,
    ) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_share_collection_not_root() {
        let a = SlotKey::new(1, "procedure", 10, "fields");
        let b = SlotKey::new(1, "procedure", 11, "fields");
        let other_tenant = SlotKey::new(2, "procedure", 11, "fields");
        let other_slot = SlotKey::new(1, "procedure", 11, "ranges");

        assert!(a.is_peer_of(&b));
        assert!(!a.is_peer_of(&a));
        assert!(!a.is_peer_of(&other_tenant));
        assert!(!a.is_peer_of(&other_slot));
        assert_eq!(a.to_string(), "1/procedure/10/fields");
    }
}
