//! Error types for the reconciliation pipeline
//!
//! [`EngineError`] wraps every failure a request can hit. All of them except
//! [`EngineError::Validation`] are fatal; validation failures carry the full
//! field-path list back to the caller.

use labcfg_reconcile::ReconcileError;
use labcfg_record::{CodecError, RecordId, ValidationErrors, VariantTag};
use labcfg_xref::{GateError, XrefError};
use std::path::PathBuf;

/// Persistence session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Write attempted outside a transaction
    #[error("no transaction is active")]
    NoTransaction,

    /// `begin` called twice
    #[error("a transaction is already active")]
    TransactionActive,

    /// Row id not present in the slot
    #[error("row {id} not found in {slot}")]
    RowNotFound {
        /// Slot display name
        slot: String,
        /// Missing id
        id: RecordId,
    },

    /// Backend failure
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Per-field failures (non-fatal kind, still aborts the write)
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(ValidationErrors),

    /// Gate prerequisite absent (no root, slot not configured)
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// Tag not in the catalog
    #[error("unknown variant: '{0}'")]
    UnknownVariant(VariantTag),

    /// Natural-key resolution failed
    #[error(transparent)]
    Xref(#[from] XrefError),

    /// Reconciliation failed
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Payload could not be decoded
    #[error("invalid payload: {0}")]
    Codec(#[from] CodecError),

    /// Persistence failed
    #[error("persistence failed: {0}")]
    Session(#[from] SessionError),

    /// Configuration failed
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<GateError> for EngineError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::MissingPrerequisite(what) => Self::MissingPrerequisite(what),
            GateError::UnknownVariant(tag) => Self::UnknownVariant(tag),
        }
    }
}

impl EngineError {
    /// Taxonomy name reported to callers
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationFailure",
            Self::MissingPrerequisite(_) => "MissingPrerequisite",
            Self::UnknownVariant(_) => "UnknownVariant",
            Self::Xref(_) => "UnresolvedReference",
            Self::Reconcile(err) => err.kind(),
            Self::Codec(err) => match err.root_cause() {
                CodecError::UnknownVariant(_) => "UnknownVariant",
                _ => "InvalidPayload",
            },
            Self::Session(_) => "PersistenceFailure",
            Self::Config(_) => "ConfigurationError",
        }
    }

    /// True for aggregated per-field failures
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Field errors, if any
    #[must_use]
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
