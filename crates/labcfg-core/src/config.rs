//! Engine configuration
//!
//! Loaded from TOML. Every child collection the engine may write is declared
//! as a slot; removal behavior is never inferred, so a slot that soft-deletes
//! must say so explicitly.
//!
//! ```toml
//! discriminator = "$type"
//!
//! [slots.licenses]
//! root_kind = "client"
//! removal = "deactivate"
//! ```

use crate::error::ConfigError;
use labcfg_reconcile::{RemovalPolicy, SlotPolicy};
use labcfg_record::DEFAULT_DISCRIMINATOR;
use labcfg_xref::{SlotRules, DEFAULT_MAX_CODE_LEN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How far code uniqueness reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueScope {
    /// Codes may repeat
    None,
    /// Unique within one root's collection
    #[default]
    Slot,
    /// Unique across the tenant's collections of the same name
    Tenant,
}

/// Settings for one child collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    /// Kind of root owning the collection
    pub root_kind: String,
    /// Property-path prefix for validation messages (defaults to the slot name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Absent-row handling
    pub removal: RemovalPolicy,
    /// Records form a forest through `parentId`
    pub hierarchical: bool,
    /// Deepest allowed level (hierarchical slots only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    /// Every record needs a code
    pub require_code: bool,
    /// Maximum code length
    pub max_code_len: usize,
    /// Code uniqueness reach
    pub unique: UniqueScope,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            root_kind: String::new(),
            path: None,
            removal: RemovalPolicy::HardDelete,
            hierarchical: false,
            max_depth: None,
            require_code: false,
            max_code_len: DEFAULT_MAX_CODE_LEN,
            unique: UniqueScope::Slot,
        }
    }
}

impl SlotConfig {
    /// Flat, hard-deleting slot under `root_kind`
    #[must_use]
    pub fn new(root_kind: impl Into<String>) -> Self {
        Self {
            root_kind: root_kind.into(),
            ..Self::default()
        }
    }

    /// With removal policy
    #[inline]
    #[must_use]
    pub fn with_removal(mut self, removal: RemovalPolicy) -> Self {
        self.removal = removal;
        self
    }

    /// Make the slot a forest
    #[inline]
    #[must_use]
    pub fn hierarchical(mut self, max_depth: Option<usize>) -> Self {
        self.hierarchical = true;
        self.max_depth = max_depth;
        self
    }

    /// Require codes
    #[inline]
    #[must_use]
    pub fn with_required_code(mut self, required: bool) -> Self {
        self.require_code = required;
        self
    }

    /// With uniqueness reach
    #[inline]
    #[must_use]
    pub fn with_unique(mut self, unique: UniqueScope) -> Self {
        self.unique = unique;
        self
    }

    /// With property-path prefix
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Reconciler policy
    #[must_use]
    pub fn policy(&self) -> SlotPolicy {
        SlotPolicy {
            removal: self.removal,
            hierarchical: self.hierarchical,
        }
    }

    /// Gate rules
    #[must_use]
    pub fn rules(&self) -> SlotRules {
        SlotRules {
            require_code: self.require_code,
            max_code_len: self.max_code_len,
            unique_codes: self.unique != UniqueScope::None,
            hierarchical: self.hierarchical,
            max_depth: self.max_depth,
        }
    }
}

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wire discriminator field
    pub discriminator: String,
    /// Configured slots by name
    pub slots: BTreeMap<String, SlotConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
            slots: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Empty configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots the back office ships with
    #[must_use]
    pub fn lab_defaults() -> Self {
        Self::new()
            .with_slot("fields", SlotConfig::new("procedure"))
            .with_slot(
                "panel_procedures",
                SlotConfig::new("panel").with_unique(UniqueScope::None),
            )
            .with_slot("menu", SlotConfig::new("menu").hierarchical(Some(4)))
            .with_slot(
                "licenses",
                SlotConfig::new("client")
                    .with_removal(RemovalPolicy::Deactivate)
                    .with_unique(UniqueScope::None),
            )
            .with_slot(
                "parser_columns",
                SlotConfig::new("parser").with_path("columns"),
            )
    }

    /// With discriminator field
    #[inline]
    #[must_use]
    pub fn with_discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminator = field.into();
        self
    }

    /// With one slot
    #[inline]
    #[must_use]
    pub fn with_slot(mut self, name: impl Into<String>, slot: SlotConfig) -> Self {
        self.slots.insert(name.into(), slot);
        self
    }

    /// Slot by name
    #[inline]
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&SlotConfig> {
        self.slots.get(name)
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// `Parse` for malformed TOML, `Invalid` for inconsistent settings
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `Io` if the file cannot be read, otherwise as [`Self::from_toml_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check settings that serde cannot
    ///
    /// # Errors
    /// `Invalid` naming the first inconsistent setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discriminator.trim().is_empty() {
            return Err(ConfigError::Invalid("discriminator must not be empty".into()));
        }
        for (name, slot) in &self.slots {
            if slot.root_kind.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "slot '{name}' needs a root_kind"
                )));
            }
            if slot.max_code_len == 0 {
                return Err(ConfigError::Invalid(format!(
                    "slot '{name}': max_code_len must be positive"
                )));
            }
            if slot.max_depth.is_some() && !slot.hierarchical {
                return Err(ConfigError::Invalid(format!(
                    "slot '{name}': max_depth requires hierarchical = true"
                )));
            }
        }
        Ok(())
    }
}
