//! Validation gate
//!
//! Runs before any mutation. Every record goes through the shared slot rules
//! (code, ordering, partner and parent checks) and then through its own
//! variant's schema and rules. Failures are aggregated per record rather than
//! failing fast; only a missing prerequisite or an unknown shape aborts.

use labcfg_record::{ChildRecord, RecordId, ValidationErrors, VariantCatalog, VariantTag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Default upper bound for `code` length
pub const DEFAULT_MAX_CODE_LEN: usize = 32;

/// Fatal gate failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Context the rules depend on is absent
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// Record tag is not in the catalog
    #[error("unknown variant: '{0}'")]
    UnknownVariant(VariantTag),
}

/// Rules shared by every record in one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotRules {
    /// Every record must carry a code
    pub require_code: bool,
    /// Maximum code length in characters
    pub max_code_len: usize,
    /// Codes must be unique (case-insensitive)
    pub unique_codes: bool,
    /// Records may carry `parentId`
    pub hierarchical: bool,
    /// Deepest allowed level, roots being level 1
    pub max_depth: Option<usize>,
}

impl Default for SlotRules {
    fn default() -> Self {
        Self {
            require_code: false,
            max_code_len: DEFAULT_MAX_CODE_LEN,
            unique_codes: true,
            hierarchical: false,
            max_depth: None,
        }
    }
}

impl SlotRules {
    /// Require a code on every record
    #[inline]
    #[must_use]
    pub fn with_required_code(mut self, required: bool) -> Self {
        self.require_code = required;
        self
    }

    /// Set the maximum code length
    #[inline]
    #[must_use]
    pub fn with_max_code_len(mut self, len: usize) -> Self {
        self.max_code_len = len;
        self
    }

    /// Enable or disable code uniqueness
    #[inline]
    #[must_use]
    pub fn with_unique_codes(mut self, unique: bool) -> Self {
        self.unique_codes = unique;
        self
    }

    /// Mark the slot as a forest
    #[inline]
    #[must_use]
    pub fn hierarchical(mut self, max_depth: Option<usize>) -> Self {
        self.hierarchical = true;
        self.max_depth = max_depth;
        self
    }
}

/// What the gate knows about the request
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    /// Path prefix for property names (e.g. `fields`)
    pub slot_path: &'a str,
    /// Persisted root owning the slot
    pub root: Option<RecordId>,
    /// Persisted rows outside this submission that share the code namespace
    pub peers: &'a [ChildRecord],
}

impl<'a> GateContext<'a> {
    /// Context with no uniqueness peers
    #[inline]
    #[must_use]
    pub fn new(slot_path: &'a str, root: Option<RecordId>) -> Self {
        Self {
            slot_path,
            root,
            peers: &[],
        }
    }

    /// With uniqueness peers
    #[inline]
    #[must_use]
    pub fn with_peers(mut self, peers: &'a [ChildRecord]) -> Self {
        self.peers = peers;
        self
    }
}

/// Pre-mutation validator for one slot
#[derive(Debug, Clone, Copy)]
pub struct ValidationGate<'c> {
    catalog: &'c VariantCatalog,
    rules: &'c SlotRules,
}

impl<'c> ValidationGate<'c> {
    /// Gate over `catalog` applying `rules`
    #[inline]
    #[must_use]
    pub fn new(catalog: &'c VariantCatalog, rules: &'c SlotRules) -> Self {
        Self { catalog, rules }
    }

    /// Validate a submitted snapshot
    ///
    /// # Returns
    /// Every per-field failure (empty when the batch is valid)
    ///
    /// # Errors
    /// - `MissingPrerequisite` if the context has no persisted root
    /// - `UnknownVariant` if any record's tag is not registered
    pub fn check(
        &self,
        records: &[ChildRecord],
        ctx: &GateContext<'_>,
    ) -> Result<ValidationErrors, GateError> {
        match ctx.root {
            Some(root) if !root.is_new() => {}
            Some(root) => {
                return Err(GateError::MissingPrerequisite(format!(
                    "root {root} has not been persisted"
                )))
            }
            None => {
                return Err(GateError::MissingPrerequisite(
                    "no root context for slot".to_string(),
                ))
            }
        }

        if let Some(unknown) = records.iter().find(|r| !self.catalog.contains(r.tag.as_str())) {
            return Err(GateError::UnknownVariant(unknown.tag.clone()));
        }

        let by_id: HashMap<RecordId, &ChildRecord> = records
            .iter()
            .filter(|r| !r.id.is_anonymous())
            .map(|r| (r.id, r))
            .collect();

        let mut errors = ValidationErrors::new();
        for (index, record) in records.iter().enumerate() {
            let path = format!("{}[{index}]", ctx.slot_path);
            self.check_base(record, &path, &by_id, &mut errors);
            if let Some(entry) = self.catalog.lookup(record.tag.as_str()) {
                entry.validate(record, &path, &mut errors);
            }
        }

        if self.rules.unique_codes {
            self.check_unique_codes(records, ctx, &mut errors);
        }

        if !errors.is_empty() {
            tracing::debug!(
                slot = ctx.slot_path,
                failures = errors.len(),
                "validation gate rejected submission"
            );
        }
        Ok(errors)
    }

    fn check_base(
        &self,
        record: &ChildRecord,
        path: &str,
        by_id: &HashMap<RecordId, &ChildRecord>,
        errors: &mut ValidationErrors,
    ) {
        match record.trimmed_code() {
            None if self.rules.require_code => errors.push_field(path, "code", "code is required"),
            None => {}
            Some(code) => {
                if code.chars().count() > self.rules.max_code_len {
                    errors.push_field(
                        path,
                        "code",
                        format!(
                            "code must be at most {} characters",
                            self.rules.max_code_len
                        ),
                    );
                }
                if !code
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    errors.push_field(
                        path,
                        "code",
                        "code may only contain letters, digits, '_' and '-'",
                    );
                }
            }
        }

        if record.order.is_some_and(|o| o < 0) {
            errors.push_field(path, "order", "order must not be negative");
        }
        if record.row.is_some_and(|r| r < 0) {
            errors.push_field(path, "row", "row must not be negative");
        }

        if let Some(partner) = record.partner_id {
            self.check_partner(record, partner, path, by_id, errors);
        }

        match record.parent_id {
            Some(_) if !self.rules.hierarchical => errors.push_field(
                path,
                "parentId",
                "parentId is only allowed in hierarchical collections",
            ),
            Some(parent) if parent == record.id && !record.id.is_anonymous() => {
                errors.push_field(path, "parentId", "a node cannot be its own parent");
            }
            Some(_) => self.check_depth(record, path, by_id, errors),
            None => {}
        }
    }

    fn check_partner(
        &self,
        record: &ChildRecord,
        partner: RecordId,
        path: &str,
        by_id: &HashMap<RecordId, &ChildRecord>,
        errors: &mut ValidationErrors,
    ) {
        if partner == record.id && !record.id.is_anonymous() {
            errors.push_field(path, "partnerId", "a record cannot partner itself");
            return;
        }
        let Some(entry) = self.catalog.lookup(record.tag.as_str()) else {
            return;
        };
        if !entry.supports_partners() {
            errors.push_field(
                path,
                "partnerId",
                format!("{} records do not take partners", record.tag),
            );
            return;
        }
        // Unknown partners are the binder's concern (DanglingPartner)
        if let Some(other) = by_id.get(&partner) {
            if !entry.accepts_partner(&other.tag) {
                errors.push_field(
                    path,
                    "partnerId",
                    format!("{} cannot partner with {}", record.tag, other.tag),
                );
            }
        }
    }

    fn check_depth(
        &self,
        record: &ChildRecord,
        path: &str,
        by_id: &HashMap<RecordId, &ChildRecord>,
        errors: &mut ValidationErrors,
    ) {
        let mut depth = 1usize;
        let mut seen = HashSet::new();
        let mut cursor = record.parent_id;

        while let Some(parent) = cursor {
            depth += 1;
            if !seen.insert(parent) {
                errors.push_field(path, "parentId", "parent chain forms a cycle");
                return;
            }
            // Parents outside the batch are reported by the hierarchy reconciler
            cursor = by_id.get(&parent).and_then(|p| p.parent_id);
        }

        if let Some(max) = self.rules.max_depth {
            if depth > max {
                errors.push_field(
                    path,
                    "parentId",
                    format!("nesting depth {depth} exceeds the maximum of {max}"),
                );
            }
        }
    }

    fn check_unique_codes(
        &self,
        records: &[ChildRecord],
        ctx: &GateContext<'_>,
        errors: &mut ValidationErrors,
    ) {
        let submitted_ids: HashSet<RecordId> = records
            .iter()
            .filter(|r| !r.id.is_new())
            .map(|r| r.id)
            .collect();

        let mut peer_codes: HashSet<String> = HashSet::new();
        for peer in ctx.peers {
            if submitted_ids.contains(&peer.id) {
                continue;
            }
            if let Some(code) = peer.trimmed_code() {
                peer_codes.insert(code.to_lowercase());
            }
        }

        let mut first_use: BTreeMap<String, usize> = BTreeMap::new();
        for (index, record) in records.iter().enumerate() {
            let Some(code) = record.trimmed_code() else {
                continue;
            };
            let path = format!("{}[{index}]", ctx.slot_path);
            let folded = code.to_lowercase();

            if let Some(first) = first_use.get(&folded) {
                errors.push_field(
                    &path,
                    "code",
                    format!(
                        "code '{code}' is already used by {}[{first}]",
                        ctx.slot_path
                    ),
                );
            } else {
                first_use.insert(folded.clone(), index);
            }

            if peer_codes.contains(&folded) {
                errors.push_field(&path, "code", format!("code '{code}' is already in use"));
            }
        }
    }
}
