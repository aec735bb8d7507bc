//! Reconciliation pipeline
//!
//! One request reconciles one slot of one root inside one transaction:
//! the gate, the resolver, the planner, the writes and the partner links
//! either all take effect or none do.

use crate::config::{EngineConfig, SlotConfig, UniqueScope};
use crate::envelope::{Envelope, SlotSnapshot};
use crate::error::EngineError;
use crate::session::{PersistenceSession, SlotKey};
use labcfg_reconcile::{
    plan_slot, ChangeSet, DeleteMode, IdMap, ParentLink, PartnerLinkBinder, PlanSummary,
    ReconcileError,
};
use labcfg_record::{ChildRecord, RecordId, VariantCatalog, WireCodec};
use labcfg_xref::{
    CandidateMap, CrossReferenceResolver, GateContext, KeyRefs, Scope, ValidationGate,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A complete replacement snapshot for one slot
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    /// Target collection
    pub slot: SlotKey,
    /// Submitted rows, in submission order
    pub records: Vec<ChildRecord>,
}

impl SubmitRequest {
    /// Create request
    #[inline]
    #[must_use]
    pub fn new(slot: SlotKey, records: Vec<ChildRecord>) -> Self {
        Self { slot, records }
    }
}

/// What a successful submit returns
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    /// Refreshed slot after commit
    pub snapshot: SlotSnapshot,
    /// Operation counts
    pub summary: PlanSummary,
    /// Final id of each submitted row, by submission position
    pub ids: Vec<RecordId>,
}

/// Planned but not yet applied request
#[derive(Debug)]
struct Prepared {
    records: Vec<ChildRecord>,
    changes: ChangeSet,
}

/// Runs submissions and fetches against a persistence session
#[derive(Debug, Clone)]
pub struct ReconcileService {
    config: Arc<EngineConfig>,
    codec: WireCodec,
}

impl ReconcileService {
    /// Create service; the codec uses the configured discriminator
    #[must_use]
    pub fn new(config: EngineConfig, catalog: Arc<VariantCatalog>) -> Self {
        let codec = WireCodec::new(catalog).with_discriminator(config.discriminator.clone());
        Self {
            config: Arc::new(config),
            codec,
        }
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Variant catalog
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &VariantCatalog {
        self.codec.catalog()
    }

    /// Wire codec
    #[inline]
    #[must_use]
    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    /// Submit a snapshot and wrap the outcome in an envelope
    pub async fn submit<S>(&self, session: &mut S, request: SubmitRequest) -> Envelope<SubmitOutcome>
    where
        S: PersistenceSession + ?Sized,
    {
        let slot = request.slot.clone();
        match self.try_submit(session, request).await {
            Ok(outcome) => {
                let message = format!(
                    "saved {slot}: {} inserted, {} updated, {} removed",
                    outcome.summary.inserts, outcome.summary.updates, outcome.summary.deletes
                );
                Envelope::ok(outcome, message)
            }
            Err(err) => Envelope::from_error(&err),
        }
    }

    /// Decode a wire snapshot and submit it
    pub async fn submit_json<S>(
        &self,
        session: &mut S,
        slot: SlotKey,
        payload: &Value,
    ) -> Envelope<SubmitOutcome>
    where
        S: PersistenceSession + ?Sized,
    {
        match self.codec.decode_snapshot(payload) {
            Ok(records) => self.submit(session, SubmitRequest::new(slot, records)).await,
            Err(err) => {
                tracing::warn!(%slot, "rejected undecodable payload: {}", err);
                Envelope::from_error(&EngineError::from(err))
            }
        }
    }

    /// Reconcile one slot atomically
    ///
    /// # Workflow
    /// 1. Check the slot is configured, open the transaction
    /// 2. Load persisted rows (and tenant peers for tenant-wide codes)
    /// 3. Run the validation gate
    /// 4. Resolve natural keys
    /// 5. Plan the change set
    /// 6. Apply deletes, then inserts, then updates
    /// 7. Bind partner links against final ids
    /// 8. Commit and reload
    ///
    /// # Errors
    /// Any [`EngineError`]; the transaction is rolled back first
    pub async fn try_submit<S>(
        &self,
        session: &mut S,
        request: SubmitRequest,
    ) -> Result<SubmitOutcome, EngineError>
    where
        S: PersistenceSession + ?Sized,
    {
        let SubmitRequest { slot, records } = request;
        tracing::info!(%slot, records = records.len(), "reconciling slot");

        // 1. Prerequisites
        let slot_config = self.slot_config(&slot)?;
        session.begin().await?;

        let written = self.run(session, &slot, slot_config, records).await;
        let (summary, ids) = match written {
            Ok(done) => done,
            Err(err) => {
                if let Err(rollback) = session.rollback().await {
                    tracing::error!(%slot, "rollback failed: {}", rollback);
                }
                tracing::warn!(%slot, kind = err.kind(), "submission rejected: {}", err);
                return Err(err);
            }
        };

        // 8. Commit and reload
        session.commit().await?;
        let snapshot = self.load_snapshot(&*session, &slot).await?;

        tracing::info!(
            %slot,
            inserts = summary.inserts,
            updates = summary.updates,
            deletes = summary.deletes,
            unchanged = summary.unchanged,
            digest = %snapshot.digest.short(),
            "slot reconciled"
        );
        Ok(SubmitOutcome {
            snapshot,
            summary,
            ids,
        })
    }

    /// Plan a submission without writing anything
    ///
    /// Runs the gate and the resolver exactly as a submit would.
    ///
    /// # Errors
    /// Any [`EngineError`] a submit would raise before its first write
    pub async fn plan<S>(
        &self,
        session: &S,
        request: &SubmitRequest,
    ) -> Result<ChangeSet, EngineError>
    where
        S: PersistenceSession + ?Sized,
    {
        let slot_config = self.slot_config(&request.slot)?;
        let prepared = self
            .prepare(session, &request.slot, slot_config, request.records.clone())
            .await?;
        Ok(prepared.changes)
    }

    /// Current snapshot of a slot
    pub async fn fetch<S>(&self, session: &S, slot: &SlotKey) -> Envelope<SlotSnapshot>
    where
        S: PersistenceSession + ?Sized,
    {
        let fetched = self.load_snapshot(session, slot).await;

        match fetched {
            Ok(snapshot) => {
                let message = format!("{} row(s)", snapshot.len());
                Envelope::ok(snapshot, message)
            }
            Err(err) => Envelope::from_error(&err),
        }
    }

    /// One encoded row of a slot
    pub async fn fetch_record<S>(&self, session: &S, slot: &SlotKey, id: RecordId) -> Envelope<Value>
    where
        S: PersistenceSession + ?Sized,
    {
        let fetched = self.load_record(session, slot, id).await;

        match fetched {
            Ok(Some(encoded)) => Envelope::ok(encoded, format!("row {id}")),
            Ok(None) => Envelope::failure(format!("row {id} not found in {slot}"), Vec::new()),
            Err(err) => Envelope::from_error(&err),
        }
    }

    async fn load_snapshot<S>(&self, session: &S, slot: &SlotKey) -> Result<SlotSnapshot, EngineError>
    where
        S: PersistenceSession + ?Sized,
    {
        let rows = session.load_slot(slot).await?;
        Ok(SlotSnapshot::encode(&self.codec, &rows)?)
    }

    async fn load_record<S>(
        &self,
        session: &S,
        slot: &SlotKey,
        id: RecordId,
    ) -> Result<Option<Value>, EngineError>
    where
        S: PersistenceSession + ?Sized,
    {
        match session.find_by_id(slot, id).await? {
            Some(row) => Ok(Some(self.codec.encode(&row)?)),
            None => Ok(None),
        }
    }

    fn slot_config(&self, slot: &SlotKey) -> Result<&SlotConfig, EngineError> {
        let config = self.config.slot(&slot.slot).ok_or_else(|| {
            EngineError::MissingPrerequisite(format!("slot '{}' is not configured", slot.slot))
        })?;
        if config.root_kind != slot.root_kind {
            return Err(EngineError::MissingPrerequisite(format!(
                "slot '{}' belongs to '{}' roots, not '{}'",
                slot.slot, config.root_kind, slot.root_kind
            )));
        }
        Ok(config)
    }

    /// Steps 2 to 5: everything before the first write
    async fn prepare<S>(
        &self,
        session: &S,
        slot: &SlotKey,
        slot_config: &SlotConfig,
        mut records: Vec<ChildRecord>,
    ) -> Result<Prepared, EngineError>
    where
        S: PersistenceSession + ?Sized,
    {
        // 2. Load
        let root = session
            .root_exists(slot)
            .await?
            .then_some(slot.root_id);
        let persisted = session.load_slot(slot).await?;
        let peers = match slot_config.unique {
            UniqueScope::Tenant => session.load_peers(slot).await?,
            UniqueScope::None | UniqueScope::Slot => Vec::new(),
        };

        // 3. Gate
        let rules = slot_config.rules();
        let path = slot_config.path.as_deref().unwrap_or(&slot.slot);
        let ctx = GateContext::new(path, root).with_peers(&peers);
        let errors = ValidationGate::new(self.catalog(), &rules).check(&records, &ctx)?;
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }

        // 4. Natural keys
        let refs = KeyRefs::collect(&records, self.catalog());
        if !refs.is_empty() {
            let mut candidates = CandidateMap::new();
            let wanted: Vec<(Scope, String)> = refs
                .kinds()
                .flat_map(|kind| {
                    let scope = Scope::new(slot.tenant, kind);
                    refs.keys(kind)
                        .into_iter()
                        .flatten()
                        .map(move |key| (scope.clone(), key.clone()))
                })
                .collect();
            for (scope, key) in &wanted {
                let ids = session.find_by_natural_key(scope, key).await?;
                candidates.insert(scope, key, ids);
            }
            let resolution =
                CrossReferenceResolver::new().resolve_all(&refs, slot.tenant, &candidates)?;
            resolution.apply(&mut records, self.catalog());
        }

        // 5. Plan
        let changes = plan_slot(
            self.catalog(),
            slot_config.policy(),
            &records,
            &persisted,
            slot.root_id,
        )?;
        tracing::debug!(
            %slot,
            inserts = changes.inserts.len(),
            updates = changes.updates.len(),
            deletes = changes.deletes.len(),
            "change set planned"
        );
        Ok(Prepared { records, changes })
    }

    /// Steps 2 to 7, inside the open transaction
    async fn run<S>(
        &self,
        session: &mut S,
        slot: &SlotKey,
        slot_config: &SlotConfig,
        records: Vec<ChildRecord>,
    ) -> Result<(PlanSummary, Vec<RecordId>), EngineError>
    where
        S: PersistenceSession + ?Sized,
    {
        let Prepared { records, changes } =
            self.prepare(&*session, slot, slot_config, records).await?;

        // 6. Writes
        let ids = apply_changes(session, slot, &changes).await?;

        // 7. Partner links
        let current: HashMap<RecordId, RecordId> = session
            .load_slot(slot)
            .await?
            .into_iter()
            .filter_map(|row| row.partner_id.map(|partner| (row.id, partner)))
            .collect();
        let links = PartnerLinkBinder::new().bind(&records, &ids, |id| current.get(&id).copied())?;
        for link in &links {
            session.set_partner(slot, link.id, link.partner).await?;
        }

        let final_ids = records
            .iter()
            .enumerate()
            .map(|(position, record)| ids.at(position).unwrap_or(record.id))
            .collect();
        Ok((changes.summary(), final_ids))
    }
}

/// Deletes first so a replacement row never collides with the row it retires
async fn apply_changes<S>(
    session: &mut S,
    slot: &SlotKey,
    changes: &ChangeSet,
) -> Result<IdMap, EngineError>
where
    S: PersistenceSession + ?Sized,
{
    for delete in &changes.deletes {
        match delete.mode {
            DeleteMode::Hard => session.delete(slot, delete.id).await?,
            DeleteMode::Deactivate => session.deactivate(slot, delete.id).await?,
        }
    }

    let mut ids = IdMap::seeded(changes);
    // parents precede their children in the insert list
    for insert in &changes.inserts {
        let mut record = insert.record.clone();
        if let Some(ParentLink::Batch(position)) = insert.parent {
            let parent = ids.at(position).ok_or_else(|| ReconcileError::OrphanedNode {
                id: insert.submitted_id,
                reason: format!("parent at position {position} has no id yet"),
            })?;
            record.parent_id = Some(parent);
        }
        let id = session.insert(slot, record).await?;
        ids.assign(insert.position, insert.submitted_id, id);
    }

    for update in &changes.updates {
        session.update(slot, update.record.clone()).await?;
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use labcfg_test_utils::{catalog, double_field, text_field};
    use pretty_assertions::assert_eq;

    fn fields() -> SlotKey {
        SlotKey::new(1, "procedure", 10, "fields")
    }

    fn service() -> ReconcileService {
        ReconcileService::new(EngineConfig::lab_defaults(), catalog())
    }

    #[tokio::test]
    async fn unconfigured_slot_is_missing_prerequisite() {
        let store = InMemoryStore::new();
        let mut session = store.session();
        let slot = SlotKey::new(1, "procedure", 10, "nowhere");

        let err = service()
            .try_submit(&mut session, SubmitRequest::new(slot, vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MissingPrerequisite");
    }

    #[tokio::test]
    async fn wrong_root_kind_is_missing_prerequisite() {
        let store = InMemoryStore::new();
        let mut session = store.session();
        let slot = SlotKey::new(1, "client", 10, "fields");

        let err = service()
            .try_submit(&mut session, SubmitRequest::new(slot, vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MissingPrerequisite");
    }

    #[tokio::test]
    async fn unpersisted_root_rolls_back() {
        let store = InMemoryStore::new();
        let mut session = store.session();

        let err = service()
            .try_submit(&mut session, SubmitRequest::new(fields(), vec![text_field(-1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MissingPrerequisite");
        // session is reusable after the rollback
        session.begin().await.unwrap();
    }

    #[tokio::test]
    async fn plan_does_not_write() {
        let store = InMemoryStore::new();
        store.seed_slot(&fields(), vec![double_field(7, 0.0, 5.0)]);
        let before = store.snapshot(&fields());
        let session = store.session();

        let request = SubmitRequest::new(fields(), vec![text_field(7)]);
        let changes = service().plan(&session, &request).await.unwrap();

        assert_eq!(changes.deletes.len(), 1);
        assert_eq!(changes.inserts.len(), 1);
        assert_eq!(store.snapshot(&fields()), before);
    }

    #[tokio::test]
    async fn ids_are_reported_by_position() {
        let store = InMemoryStore::new();
        store.seed_slot(&fields(), vec![text_field(7)]);
        let mut session = store.session();

        let outcome = service()
            .try_submit(
                &mut session,
                SubmitRequest::new(fields(), vec![text_field(7), text_field(-1)]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.ids.len(), 2);
        assert_eq!(outcome.ids[0], RecordId::new(7));
        assert!(outcome.ids[1].get() > 7);
        assert_eq!(outcome.snapshot.len(), 2);
    }

    #[tokio::test]
    async fn fetch_record_encodes_or_reports_missing() {
        let store = InMemoryStore::new();
        store.seed_slot(&fields(), vec![text_field(7)]);
        let session = store.session();
        let service = service();

        let found = service.fetch_record(&session, &fields(), RecordId::new(7)).await;
        assert!(found.success);
        assert_eq!(
            found.data.as_ref().and_then(|v| v["$type"].as_str()),
            Some("TextField")
        );

        let missing = service.fetch_record(&session, &fields(), RecordId::new(8)).await;
        assert!(!missing.success);
        assert!(missing.data.is_none());
    }
}
