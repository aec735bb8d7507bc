//! Cross-reference resolution
//!
//! Resolves natural-key references (short codes) to numeric identities within
//! a tenant scope. Resolution is strict: a key with zero matches or with more
//! than one match fails the whole request, and the error names every such key.

use crate::index::NaturalKeyIndex;
use crate::scope::{normalize_key, Scope};
use labcfg_record::{ChildRecord, RecordId, VariantCatalog};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

/// Anything that can list candidate ids for a key
pub trait NaturalKeySource {
    /// Ids registered under `key` in `scope` (may be empty or ambiguous)
    fn candidates(&self, scope: &Scope, key: &str) -> Vec<RecordId>;
}

impl NaturalKeySource for NaturalKeyIndex {
    fn candidates(&self, scope: &Scope, key: &str) -> Vec<RecordId> {
        self.lookup(scope, key)
    }
}

/// Candidates fetched ahead of time (e.g. by an async persistence session)
#[derive(Debug, Clone, Default)]
pub struct CandidateMap {
    candidates: BTreeMap<Scope, BTreeMap<String, Vec<RecordId>>>,
}

impl CandidateMap {
    /// Empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the candidates found for one key
    pub fn insert(&mut self, scope: &Scope, key: &str, ids: Vec<RecordId>) {
        self.candidates
            .entry(scope.clone())
            .or_default()
            .insert(normalize_key(key).to_string(), ids);
    }
}

impl NaturalKeySource for CandidateMap {
    fn candidates(&self, scope: &Scope, key: &str) -> Vec<RecordId> {
        self.candidates
            .get(scope)
            .and_then(|keys| keys.get(normalize_key(key)))
            .cloned()
            .unwrap_or_default()
    }
}

/// One key that did not resolve to exactly one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    /// Scope searched
    pub scope: Scope,
    /// Key as referenced
    pub key: String,
    /// Number of distinct matches (0 or > 1)
    pub matches: usize,
}

impl Display for KeyFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.matches == 0 {
            write!(f, "'{}' not found in {}", self.key, self.scope)
        } else {
            write!(
                f,
                "'{}' is ambiguous in {} ({} matches)",
                self.key, self.scope, self.matches
            )
        }
    }
}

/// Errors from cross-reference resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XrefError {
    /// One or more keys had zero or several matches
    #[error("unresolved references: {}", format_failures(.failures))]
    UnresolvedReference {
        /// Every failing key
        failures: Vec<KeyFailure>,
    },
}

impl XrefError {
    /// Keys that failed
    #[must_use]
    pub fn failed_keys(&self) -> Vec<&str> {
        match self {
            Self::UnresolvedReference { failures } => {
                failures.iter().map(|f| f.key.as_str()).collect()
            }
        }
    }
}

fn format_failures(failures: &[KeyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Natural keys referenced by a batch, grouped by scope kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRefs {
    by_kind: BTreeMap<String, BTreeSet<String>>,
}

impl KeyRefs {
    /// Collect every `KeyRef` attribute value in `records`
    ///
    /// Records with unknown tags are skipped; the validation gate reports them.
    #[must_use]
    pub fn collect(records: &[ChildRecord], catalog: &VariantCatalog) -> Self {
        let mut refs = Self::default();
        for record in records {
            let Some(entry) = catalog.lookup(record.tag.as_str()) else {
                continue;
            };
            for (attr, kind) in entry.schema().key_refs() {
                if let Some(key) = record.attr_str(attr).map(normalize_key) {
                    if !key.is_empty() {
                        refs.add(kind, key);
                    }
                }
            }
        }
        refs
    }

    /// Add one key
    pub fn add(&mut self, kind: &str, key: &str) {
        self.by_kind
            .entry(kind.to_string())
            .or_default()
            .insert(normalize_key(key).to_string());
    }

    /// Scope kinds referenced
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.by_kind.keys().map(String::as_str)
    }

    /// Keys referenced within `kind`
    #[must_use]
    pub fn keys(&self, kind: &str) -> Option<&BTreeSet<String>> {
        self.by_kind.get(kind)
    }

    /// True if nothing is referenced
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Total number of distinct (kind, key) pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.values().map(BTreeSet::len).sum()
    }
}

/// Resolved ids, grouped by scope kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    by_kind: BTreeMap<String, BTreeMap<String, RecordId>>,
}

impl Resolution {
    /// Resolved id for `key` in `kind`
    #[must_use]
    pub fn get(&self, kind: &str, key: &str) -> Option<RecordId> {
        self.by_kind
            .get(kind)
            .and_then(|keys| keys.get(normalize_key(key)))
            .copied()
    }

    /// Write resolved ids into each record's `resolved` map
    ///
    /// Attributes without a value have their stale resolution removed.
    pub fn apply(&self, records: &mut [ChildRecord], catalog: &VariantCatalog) {
        for record in records {
            let Some(entry) = catalog.lookup(record.tag.as_str()) else {
                continue;
            };
            let refs: Vec<(String, String)> = entry
                .schema()
                .key_refs()
                .map(|(attr, kind)| (attr.to_string(), kind.to_string()))
                .collect();
            for (attr, kind) in refs {
                let resolved = record
                    .attr_str(&attr)
                    .and_then(|key| self.get(&kind, key));
                match resolved {
                    Some(id) => {
                        record.resolved.insert(attr, id);
                    }
                    None => {
                        record.resolved.remove(&attr);
                    }
                }
            }
        }
    }
}

/// Strict natural-key resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossReferenceResolver;

impl CrossReferenceResolver {
    /// Create resolver
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolve `keys` within one scope
    ///
    /// # Errors
    /// `UnresolvedReference` naming every key with zero or several matches
    pub fn resolve<S>(
        &self,
        keys: &BTreeSet<String>,
        scope: &Scope,
        source: &S,
    ) -> Result<BTreeMap<String, RecordId>, XrefError>
    where
        S: NaturalKeySource + ?Sized,
    {
        let mut resolved = BTreeMap::new();
        let mut failures = Vec::new();
        self.resolve_into(keys, scope, source, &mut resolved, &mut failures);

        if failures.is_empty() {
            Ok(resolved)
        } else {
            Err(XrefError::UnresolvedReference { failures })
        }
    }

    /// Resolve every kind referenced by a batch for one tenant
    ///
    /// Failures across all kinds are reported together.
    ///
    /// # Errors
    /// `UnresolvedReference` naming every failing key
    pub fn resolve_all<S>(
        &self,
        refs: &KeyRefs,
        tenant: i64,
        source: &S,
    ) -> Result<Resolution, XrefError>
    where
        S: NaturalKeySource + ?Sized,
    {
        let mut resolution = Resolution::default();
        let mut failures = Vec::new();

        for (kind, keys) in &refs.by_kind {
            let scope = Scope::new(tenant, kind.clone());
            let mut resolved = BTreeMap::new();
            self.resolve_into(keys, &scope, source, &mut resolved, &mut failures);
            resolution.by_kind.insert(kind.clone(), resolved);
        }

        if failures.is_empty() {
            tracing::debug!(keys = refs.len(), "natural keys resolved");
            Ok(resolution)
        } else {
            tracing::warn!(failed = failures.len(), "natural key resolution failed");
            Err(XrefError::UnresolvedReference { failures })
        }
    }

    fn resolve_into<S>(
        &self,
        keys: &BTreeSet<String>,
        scope: &Scope,
        source: &S,
        resolved: &mut BTreeMap<String, RecordId>,
        failures: &mut Vec<KeyFailure>,
    ) where
        S: NaturalKeySource + ?Sized,
    {
        for key in keys {
            let key = normalize_key(key);
            let mut ids = source.candidates(scope, key);
            ids.sort();
            ids.dedup();
            if let [id] = ids.as_slice() {
                resolved.insert(key.to_string(), *id);
            } else {
                failures.push(KeyFailure {
                    scope: scope.clone(),
                    key: key.to_string(),
                    matches: ids.len(),
                });
            }
        }
    }
}
