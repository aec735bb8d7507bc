//! In-memory persistence
//!
//! [`InMemoryStore`] holds committed slots behind one mutex and hands out
//! [`InMemorySession`]s. A session stages a private copy of every slot it
//! touches; `commit` swaps the staged copies in under the lock, `rollback`
//! drops them. Generated ids come from a shared counter and are never reused,
//! even when the transaction that drew them rolls back.

use crate::error::SessionError;
use crate::session::{PersistenceSession, SlotKey};
use async_trait::async_trait;
use labcfg_record::{ChildRecord, RecordId};
use labcfg_xref::{NaturalKeyIndex, Scope};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;

type Slots = BTreeMap<SlotKey, Vec<ChildRecord>>;

#[derive(Debug, Default)]
struct StoreState {
    roots: BTreeSet<(i64, String, RecordId)>,
    slots: Slots,
}

/// Shared in-memory backend
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    next_id: Arc<AtomicI64>,
    keys: Arc<NaturalKeyIndex>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            next_id: Arc::new(AtomicI64::new(1)),
            keys: Arc::default(),
        }
    }
}

impl InMemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a root so its slots may be written
    pub fn add_root(&self, tenant: i64, root_kind: impl Into<String>, root_id: impl Into<RecordId>) {
        let root_id = root_id.into();
        self.bump_past(root_id);
        self.state
            .lock()
            .roots
            .insert((tenant, root_kind.into(), root_id));
    }

    /// Replace a slot's committed rows, creating its root if needed
    ///
    /// Rows with an id ≤ 0 get a generated id; every row is owned by the
    /// slot's root. Returns the ids in input order.
    pub fn seed_slot(&self, slot: &SlotKey, rows: Vec<ChildRecord>) -> Vec<RecordId> {
        self.add_root(slot.tenant, slot.root_kind.clone(), slot.root_id);
        let rows: Vec<ChildRecord> = rows
            .into_iter()
            .map(|mut row| {
                if row.id.is_new() {
                    row.id = self.generate_id();
                } else {
                    self.bump_past(row.id);
                }
                row.owner_id = slot.root_id;
                row
            })
            .collect();
        let ids = rows.iter().map(|r| r.id).collect();
        self.state.lock().slots.insert(slot.clone(), rows);
        ids
    }

    /// Register a natural key for lookups
    pub fn register_key(&self, scope: &Scope, key: &str, id: impl Into<RecordId>) {
        self.keys.insert(scope, key, id.into());
    }

    /// Natural-key index
    #[inline]
    #[must_use]
    pub fn keys(&self) -> &NaturalKeyIndex {
        &self.keys
    }

    /// Committed rows of a slot, in display order
    #[must_use]
    pub fn snapshot(&self, slot: &SlotKey) -> Vec<ChildRecord> {
        let mut rows = self
            .state
            .lock()
            .slots
            .get(slot)
            .cloned()
            .unwrap_or_default();
        rows.sort_by(display_order);
        rows
    }

    /// Open a session
    #[must_use]
    pub fn session(&self) -> InMemorySession {
        InMemorySession {
            store: self.clone(),
            staged: None,
        }
    }

    fn generate_id(&self) -> RecordId {
        RecordId::new(self.next_id.fetch_add(1, AtomicOrdering::SeqCst))
    }

    fn bump_past(&self, id: RecordId) {
        self.next_id
            .fetch_max(id.get().saturating_add(1), AtomicOrdering::SeqCst);
    }
}

/// One transaction at a time against an [`InMemoryStore`]
#[derive(Debug)]
pub struct InMemorySession {
    store: InMemoryStore,
    staged: Option<Slots>,
}

impl InMemorySession {
    /// True between `begin` and `commit`/`rollback`
    #[inline]
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    /// Rows visible to this session: staged copy first, then committed
    fn visible(&self, slot: &SlotKey) -> Vec<ChildRecord> {
        if let Some(rows) = self.staged.as_ref().and_then(|staged| staged.get(slot)) {
            return rows.clone();
        }
        self.store
            .state
            .lock()
            .slots
            .get(slot)
            .cloned()
            .unwrap_or_default()
    }

    /// Staged copy of a slot, cloned from committed state on first touch
    fn staged_rows(&mut self, slot: &SlotKey) -> Result<&mut Vec<ChildRecord>, SessionError> {
        let committed = if self
            .staged
            .as_ref()
            .ok_or(SessionError::NoTransaction)?
            .contains_key(slot)
        {
            None
        } else {
            Some(
                self.store
                    .state
                    .lock()
                    .slots
                    .get(slot)
                    .cloned()
                    .unwrap_or_default(),
            )
        };

        let staged = self.staged.as_mut().ok_or(SessionError::NoTransaction)?;
        Ok(staged
            .entry(slot.clone())
            .or_insert_with(|| committed.unwrap_or_default()))
    }

    fn row_mut<'r>(
        rows: &'r mut [ChildRecord],
        slot: &SlotKey,
        id: RecordId,
    ) -> Result<&'r mut ChildRecord, SessionError> {
        rows.iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SessionError::RowNotFound {
                slot: slot.to_string(),
                id,
            })
    }
}

#[async_trait]
impl PersistenceSession for InMemorySession {
    async fn begin(&mut self) -> Result<(), SessionError> {
        if self.staged.is_some() {
            return Err(SessionError::TransactionActive);
        }
        self.staged = Some(Slots::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        let staged = self.staged.take().ok_or(SessionError::NoTransaction)?;
        let touched = staged.len();
        let mut state = self.store.state.lock();
        for (slot, rows) in staged {
            state.slots.insert(slot, rows);
        }
        drop(state);
        tracing::debug!(slots = touched, "transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        let staged = self.staged.take().ok_or(SessionError::NoTransaction)?;
        tracing::debug!(slots = staged.len(), "transaction rolled back");
        Ok(())
    }

    async fn root_exists(&self, slot: &SlotKey) -> Result<bool, SessionError> {
        Ok(self.store.state.lock().roots.contains(&(
            slot.tenant,
            slot.root_kind.clone(),
            slot.root_id,
        )))
    }

    async fn load_slot(&self, slot: &SlotKey) -> Result<Vec<ChildRecord>, SessionError> {
        let mut rows = self.visible(slot);
        rows.sort_by(display_order);
        Ok(rows)
    }

    async fn load_peers(&self, slot: &SlotKey) -> Result<Vec<ChildRecord>, SessionError> {
        let peer_keys: Vec<SlotKey> = {
            let state = self.store.state.lock();
            let mut keys: BTreeSet<SlotKey> = state
                .slots
                .keys()
                .filter(|key| key.is_peer_of(slot))
                .cloned()
                .collect();
            if let Some(staged) = &self.staged {
                keys.extend(staged.keys().filter(|key| key.is_peer_of(slot)).cloned());
            }
            keys.into_iter().collect()
        };

        Ok(peer_keys.iter().flat_map(|key| self.visible(key)).collect())
    }

    async fn find_by_id(
        &self,
        slot: &SlotKey,
        id: RecordId,
    ) -> Result<Option<ChildRecord>, SessionError> {
        Ok(self.visible(slot).into_iter().find(|r| r.id == id))
    }

    async fn find_by_natural_key(
        &self,
        scope: &Scope,
        key: &str,
    ) -> Result<Vec<RecordId>, SessionError> {
        Ok(self.store.keys.lookup(scope, key))
    }

    async fn insert(
        &mut self,
        slot: &SlotKey,
        mut record: ChildRecord,
    ) -> Result<RecordId, SessionError> {
        if self.staged.is_none() {
            return Err(SessionError::NoTransaction);
        }
        let id = self.store.generate_id();
        record.id = id;
        record.owner_id = slot.root_id;
        self.staged_rows(slot)?.push(record);
        Ok(id)
    }

    async fn update(&mut self, slot: &SlotKey, record: ChildRecord) -> Result<(), SessionError> {
        let rows = self.staged_rows(slot)?;
        let row = Self::row_mut(rows, slot, record.id)?;
        *row = record;
        row.owner_id = slot.root_id;
        Ok(())
    }

    async fn delete(&mut self, slot: &SlotKey, id: RecordId) -> Result<(), SessionError> {
        let rows = self.staged_rows(slot)?;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(SessionError::RowNotFound {
                slot: slot.to_string(),
                id,
            });
        }
        // a partner link never outlives its target
        for row in rows.iter_mut().filter(|r| r.partner_id == Some(id)) {
            row.partner_id = None;
        }
        Ok(())
    }

    async fn deactivate(&mut self, slot: &SlotKey, id: RecordId) -> Result<(), SessionError> {
        let rows = self.staged_rows(slot)?;
        Self::row_mut(rows, slot, id)?.active = false;
        Ok(())
    }

    async fn set_partner(
        &mut self,
        slot: &SlotKey,
        id: RecordId,
        partner: Option<RecordId>,
    ) -> Result<(), SessionError> {
        let rows = self.staged_rows(slot)?;
        Self::row_mut(rows, slot, id)?.partner_id = partner;
        Ok(())
    }
}

/// `order`, then `row`, then id; rows without an order sort last
fn display_order(a: &ChildRecord, b: &ChildRecord) -> Ordering {
    fn key(value: Option<i32>) -> (bool, i32) {
        (value.is_none(), value.unwrap_or_default())
    }
    key(a.order)
        .cmp(&key(b.order))
        .then_with(|| key(a.row).cmp(&key(b.row)))
        .then_with(|| a.id.cmp(&b.id))
}
