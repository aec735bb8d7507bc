//! Field-level validation failures
//!
//! [`FieldError`] is the wire shape of one failure
//! (`{ propertyName, errorMessage }`); [`ValidationErrors`] collects them
//! without failing fast.

use serde::{Deserialize, Serialize};

/// One failed rule, addressed by field path (e.g. `fields[2].max`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Field path
    pub property_name: String,
    /// Human-readable message
    pub error_message: String,
}

impl FieldError {
    /// Create a field error
    #[inline]
    #[must_use]
    pub fn new(property_name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            error_message: error_message.into(),
        }
    }
}

/// Aggregated validation failures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Create an empty collection
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure at `path`
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    /// Record a failure on attribute `field` under record path `path`
    pub fn push_field(&mut self, path: &str, field: &str, message: impl Into<String>) {
        self.push(join_path(path, field), message);
    }

    /// Absorb another collection
    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// True when nothing failed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of failures
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterate failures
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// Failures for one exact property path
    #[must_use]
    pub fn for_property(&self, path: &str) -> Vec<&FieldError> {
        self.errors
            .iter()
            .filter(|e| e.property_name == path)
            .collect()
    }

    /// Consume into a plain list
    #[inline]
    #[must_use]
    pub fn into_vec(self) -> Vec<FieldError> {
        self.errors
    }
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Join a record path and a field name (`fields[0]` + `max` = `fields[0].max`)
#[must_use]
pub fn join_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}
