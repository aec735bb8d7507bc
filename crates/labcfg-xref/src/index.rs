//! Natural-key index with radix tree
//!
//! Provides [`NaturalKeyIndex`]: per-scope radix tries mapping a natural key
//! to every row id registered under it. Multiple ids under one key are kept
//! (not overwritten) so the resolver can report ambiguity instead of hiding it.

use crate::scope::{normalize_key, Scope};
use dashmap::DashMap;
use labcfg_record::RecordId;
use radix_trie::{Trie, TrieCommon};

/// Concurrent natural-key index
///
/// One radix trie per [`Scope`], held in a `DashMap` so lookups in different
/// scopes never contend.
#[derive(Debug, Default)]
pub struct NaturalKeyIndex {
    scopes: DashMap<Scope, Trie<String, Vec<RecordId>>>,
}

impl NaturalKeyIndex {
    /// Create empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` under `key`
    ///
    /// Blank keys are ignored. Registering the same id twice is a no-op.
    pub fn insert(&self, scope: &Scope, key: &str, id: RecordId) {
        let key = normalize_key(key);
        if key.is_empty() {
            return;
        }
        let mut trie = self.scopes.entry(scope.clone()).or_default();
        let key = key.to_string();
        match trie.get_mut(&key) {
            Some(ids) => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            None => {
                trie.insert(key, vec![id]);
            }
        }
    }

    /// Unregister `id` from `key`; returns true if it was present
    pub fn remove(&self, scope: &Scope, key: &str, id: RecordId) -> bool {
        let key = normalize_key(key).to_string();
        let Some(mut trie) = self.scopes.get_mut(scope) else {
            return false;
        };
        let Some(ids) = trie.get_mut(&key) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|existing| *existing != id);
        let removed = ids.len() != before;
        if ids.is_empty() {
            trie.remove(&key);
        }
        removed
    }

    /// Every id registered under `key`
    #[must_use]
    pub fn lookup(&self, scope: &Scope, key: &str) -> Vec<RecordId> {
        let key = normalize_key(key).to_string();
        self.scopes
            .get(scope)
            .and_then(|trie| trie.get(&key).cloned())
            .unwrap_or_default()
    }

    /// Keys starting with `prefix`, sorted (lookup screens)
    #[must_use]
    pub fn keys_with_prefix(&self, scope: &Scope, prefix: &str) -> Vec<String> {
        let Some(trie) = self.scopes.get(scope) else {
            return Vec::new();
        };
        let prefix = normalize_key(prefix).to_string();

        let mut keys: Vec<String> = if prefix.is_empty() {
            trie.keys().cloned().collect()
        } else {
            trie.get_raw_descendant(&prefix)
                .map(|sub| {
                    sub.keys()
                        .filter(|k| k.starts_with(prefix.as_str()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        keys.sort();
        keys
    }

    /// Number of distinct keys in `scope`
    #[must_use]
    pub fn key_count(&self, scope: &Scope) -> usize {
        self.scopes.get(scope).map_or(0, |trie| trie.len())
    }

    /// Drop every key in `scope`
    pub fn clear_scope(&self, scope: &Scope) {
        self.scopes.remove(scope);
    }
}
