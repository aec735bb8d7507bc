//! Partner-link binder
//!
//! Runs after every row of the batch has its final id. A record names its
//! partner by echoing the submitted (possibly placeholder) id of a sibling;
//! the binder translates that through the [`IdMap`] into the sibling's real id.

use crate::error::ReconcileError;
use crate::idmap::IdMap;
use labcfg_record::{ChildRecord, RecordId};
use serde::Serialize;

/// One partner write: set `id`'s partner to `partner`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerLink {
    /// Final id of the record
    pub id: RecordId,
    /// Final id of its partner (`None` clears the link)
    pub partner: Option<RecordId>,
}

/// Translates submitted partner references into final ids
#[derive(Debug, Clone, Copy, Default)]
pub struct PartnerLinkBinder;

impl PartnerLinkBinder {
    /// Create binder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Partner writes needed for `submitted`
    ///
    /// `current` reports the partner a row holds right now (by final id);
    /// rows whose partner would not change produce no write.
    ///
    /// # Errors
    /// `DanglingPartner` if a reference names a record outside the batch,
    /// an anonymous `0` id, or a row removed by this pass
    pub fn bind<F>(
        &self,
        submitted: &[ChildRecord],
        ids: &IdMap,
        current: F,
    ) -> Result<Vec<PartnerLink>, ReconcileError>
    where
        F: Fn(RecordId) -> Option<RecordId>,
    {
        let mut links = Vec::new();

        for (position, record) in submitted.iter().enumerate() {
            let Some(id) = ids.at(position) else {
                continue;
            };

            let desired = match record.partner_id {
                None => None,
                Some(partner) => Some(ids.resolve(partner).ok_or(
                    ReconcileError::DanglingPartner {
                        record: record.id,
                        partner,
                    },
                )?),
            };

            if current(id) != desired {
                links.push(PartnerLink {
                    id,
                    partner: desired,
                });
            }
        }

        tracing::debug!(links = links.len(), "partner links bound");
        Ok(links)
    }
}
