//! Variant catalog
//!
//! Registry mapping each discriminator tag to its attribute schema,
//! validator and constructor. Adding a new record shape means registering
//! one [`VariantEntry`]; nothing downstream needs to change.

use crate::record::{ChildRecord, VariantTag};
use crate::schema::AttributeSchema;
use crate::violation::ValidationErrors;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;

/// Base field names on the wire; variant attributes may not reuse them
pub const RESERVED_ATTRIBUTES: &[&str] = &[
    "id", "ownerId", "parentId", "partnerId", "order", "row", "code", "active",
];

/// Per-variant business rules
///
/// Implement this for rules beyond the schema's kind/required checks.
pub trait VariantValidator: Send + Sync + Debug {
    /// Append failures for `record`, addressed under `path`
    fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors);
}

/// Validator for variants with no rules beyond their schema
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRules;

impl VariantValidator for NoRules {
    fn validate(&self, _record: &ChildRecord, _path: &str, _errors: &mut ValidationErrors) {}
}

/// Builds a concrete row from submitted attributes
pub trait RecordConstructor: Send + Sync + Debug {
    /// Materialize `submitted` as a row of this variant
    fn construct(&self, schema: &AttributeSchema, submitted: &ChildRecord) -> ChildRecord;
}

/// Default constructor: keep schema attributes, apply defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaConstructor;

impl RecordConstructor for SchemaConstructor {
    fn construct(&self, schema: &AttributeSchema, submitted: &ChildRecord) -> ChildRecord {
        let mut record = submitted.clone();
        record.payload = schema.project(&submitted.payload);
        schema.apply_defaults(&mut record.payload);
        record
    }
}

/// Errors from catalog lookups and registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// No entry for tag
    #[error("unknown variant: '{0}'")]
    UnknownVariant(VariantTag),

    /// Tag registered twice
    #[error("variant already registered: '{0}'")]
    DuplicateTag(VariantTag),

    /// Attribute collides with a base field
    #[error("variant '{tag}' declares reserved attribute '{attribute}'")]
    ReservedAttribute {
        /// Offending variant
        tag: VariantTag,
        /// Offending attribute
        attribute: String,
    },
}

/// One catalog entry: schema + validator + constructor
#[derive(Debug, Clone)]
pub struct VariantEntry {
    tag: VariantTag,
    schema: AttributeSchema,
    validator: Arc<dyn VariantValidator>,
    constructor: Arc<dyn RecordConstructor>,
    partner_tags: BTreeSet<VariantTag>,
}

impl VariantEntry {
    /// Entry with schema-only validation and the default constructor
    #[must_use]
    pub fn new(tag: impl Into<VariantTag>, schema: AttributeSchema) -> Self {
        Self {
            tag: tag.into(),
            schema,
            validator: Arc::new(NoRules),
            constructor: Arc::new(SchemaConstructor),
            partner_tags: BTreeSet::new(),
        }
    }

    /// Replace the validator
    #[must_use]
    pub fn with_validator(mut self, validator: impl VariantValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Replace the constructor
    #[must_use]
    pub fn with_constructor(mut self, constructor: impl RecordConstructor + 'static) -> Self {
        self.constructor = Arc::new(constructor);
        self
    }

    /// Declare which shapes may be linked as partners
    #[must_use]
    pub fn with_partner_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<VariantTag>,
    {
        self.partner_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Discriminator
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &VariantTag {
        &self.tag
    }

    /// Attribute schema
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// True if a row of this shape may partner with `tag`
    #[inline]
    #[must_use]
    pub fn accepts_partner(&self, tag: &VariantTag) -> bool {
        self.partner_tags.contains(tag)
    }

    /// True if this shape takes partners at all
    #[inline]
    #[must_use]
    pub fn supports_partners(&self) -> bool {
        !self.partner_tags.is_empty()
    }

    /// Build a row of this variant from submitted attributes
    #[must_use]
    pub fn materialize(&self, submitted: &ChildRecord) -> ChildRecord {
        let mut record = self.constructor.construct(&self.schema, submitted);
        record.tag = self.tag.clone();
        record
    }

    /// Schema checks followed by variant rules
    pub fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
        self.schema.check(&record.payload, path, errors);
        self.validator.validate(record, path, errors);
    }
}

/// Registry of record shapes
#[derive(Debug, Clone, Default)]
pub struct VariantCatalog {
    entries: BTreeMap<VariantTag, VariantEntry>,
}

impl VariantCatalog {
    /// Empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry
    ///
    /// # Errors
    /// - `DuplicateTag` if the tag is already registered
    /// - `ReservedAttribute` if the schema reuses a base field name
    pub fn register(&mut self, entry: VariantEntry) -> Result<(), CatalogError> {
        if self.entries.contains_key(entry.tag()) {
            return Err(CatalogError::DuplicateTag(entry.tag().clone()));
        }
        if let Some(attr) = entry
            .schema()
            .iter()
            .find(|a| RESERVED_ATTRIBUTES.contains(&a.name.as_str()))
        {
            return Err(CatalogError::ReservedAttribute {
                tag: entry.tag().clone(),
                attribute: attr.name.clone(),
            });
        }
        self.entries.insert(entry.tag().clone(), entry);
        Ok(())
    }

    /// Entry for `tag`
    ///
    /// # Errors
    /// Returns `UnknownVariant` if the tag is not registered
    pub fn get(&self, tag: &VariantTag) -> Result<&VariantEntry, CatalogError> {
        self.entries
            .get(tag)
            .ok_or_else(|| CatalogError::UnknownVariant(tag.clone()))
    }

    /// Entry for a raw tag string
    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<&VariantEntry> {
        self.entries.get(tag)
    }

    /// True if `tag` is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Registered tags in sorted order
    pub fn tags(&self) -> impl Iterator<Item = &VariantTag> {
        self.entries.keys()
    }

    /// Iterate entries
    pub fn entries(&self) -> impl Iterator<Item = &VariantEntry> {
        self.entries.values()
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materialize `submitted` using the entry for its own tag
    ///
    /// # Errors
    /// Returns `UnknownVariant` if the tag is not registered
    pub fn materialize(&self, submitted: &ChildRecord) -> Result<ChildRecord, CatalogError> {
        Ok(self.get(&submitted.tag)?.materialize(submitted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttrKind, AttributeSpec};
    use serde_json::json;

    #[derive(Debug)]
    struct PositiveMax;

    impl VariantValidator for PositiveMax {
        fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
            if record.attr_f64("max").is_some_and(|m| m <= 0.0) {
                errors.push_field(path, "max", "must be positive");
            }
        }
    }

    fn entry() -> VariantEntry {
        VariantEntry::new(
            "Gauge",
            AttributeSchema::new()
                .attr(AttributeSpec::new("max", AttrKind::Number).with_default(100)),
        )
        .with_validator(PositiveMax)
        .with_partner_tags(["Gauge"])
    }

    #[test]
    fn register_and_get() {
        let mut catalog = VariantCatalog::new();
        catalog.register(entry()).unwrap();

        assert!(catalog.contains("Gauge"));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get(&VariantTag::new("Gauge")).is_ok());
    }

    #[test]
    fn duplicate_tag_rejected() {
        let mut catalog = VariantCatalog::new();
        catalog.register(entry()).unwrap();
        assert!(matches!(
            catalog.register(entry()),
            Err(CatalogError::DuplicateTag(_))
        ));
    }

    #[test]
    fn reserved_attribute_rejected() {
        let mut catalog = VariantCatalog::new();
        let bad = VariantEntry::new(
            "Bad",
            AttributeSchema::new().attr(AttributeSpec::new("code", AttrKind::Text)),
        );
        assert!(matches!(
            catalog.register(bad),
            Err(CatalogError::ReservedAttribute { .. })
        ));
    }

    #[test]
    fn unknown_variant() {
        let catalog = VariantCatalog::new();
        let record = ChildRecord::new(0, "Nope");
        assert_eq!(
            catalog.materialize(&record),
            Err(CatalogError::UnknownVariant(VariantTag::new("Nope")))
        );
    }

    #[test]
    fn materialize_strips_and_defaults() {
        let mut catalog = VariantCatalog::new();
        catalog.register(entry()).unwrap();

        let submitted = ChildRecord::new(-1, "Gauge").with_attr("maxLength", 5);
        let built = catalog.materialize(&submitted).unwrap();

        assert_eq!(built.payload.len(), 1);
        assert_eq!(built.payload["max"], json!(100));
    }

    #[test]
    fn validate_runs_schema_and_rules() {
        let entry = entry();
        let record = ChildRecord::new(1, "Gauge").with_attr("max", -1);
        let mut errors = ValidationErrors::new();
        entry.validate(&record, "gauges[0]", &mut errors);
        assert_eq!(errors.for_property("gauges[0].max").len(), 1);
    }

    #[test]
    fn partner_compatibility() {
        let entry = entry();
        assert!(entry.supports_partners());
        assert!(entry.accepts_partner(&VariantTag::new("Gauge")));
        assert!(!entry.accepts_partner(&VariantTag::new("TextField")));
    }
}
