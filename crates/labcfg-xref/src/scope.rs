//! Natural-key scopes

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Namespace in which a natural key must be unique: one tenant, one peer kind
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Tenant id
    pub tenant: i64,
    /// Peer kind (e.g. `procedure`)
    pub kind: String,
}

impl Scope {
    /// Create a scope
    #[inline]
    #[must_use]
    pub fn new(tenant: i64, kind: impl Into<String>) -> Self {
        Self {
            tenant,
            kind: kind.into(),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.kind)
    }
}

/// Canonical form of a natural key: surrounding whitespace removed
#[inline]
#[must_use]
pub fn normalize_key(key: &str) -> &str {
    key.trim()
}
