//! Child record data model
//!
//! Provides [`ChildRecord`], the flattened tagged-union row shared by every
//! editable child collection, together with its identity ([`RecordId`]) and
//! discriminator ([`VariantTag`]) newtypes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Variant attribute values keyed by attribute name
pub type Payload = BTreeMap<String, Value>;

/// Numeric row identity
///
/// Values `<= 0` mean "not yet persisted". Zero is the anonymous placeholder;
/// negative values are placeholders other rows in the same batch may reference.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Anonymous placeholder for a new row
    pub const NEW: Self = Self(0);

    /// Wrap a raw id
    #[inline]
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// True for ids that do not name a persisted row
    #[inline]
    #[must_use]
    pub const fn is_new(self) -> bool {
        self.0 <= 0
    }

    /// True for negative placeholders (new but referenceable)
    #[inline]
    #[must_use]
    pub const fn is_placeholder(self) -> bool {
        self.0 < 0
    }

    /// True for the anonymous placeholder `0`
    #[inline]
    #[must_use]
    pub const fn is_anonymous(self) -> bool {
        self.0 == 0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Discriminator naming the concrete shape of a record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantTag(String);

impl VariantTag {
    /// Create a tag
    #[inline]
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VariantTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariantTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for VariantTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl Borrow<str> for VariantTag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for VariantTag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for VariantTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// One row of a child collection
///
/// Base fields are shared by every variant; variant-specific attributes live
/// in `payload` and are governed by the catalog entry for `tag`.
///
/// # Invariants
/// - `tag` is immutable for a persisted identity
/// - `resolved` only holds ids produced by natural-key resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord {
    /// Row identity (`<= 0` = new)
    pub id: RecordId,

    /// Variant discriminator
    pub tag: VariantTag,

    /// Foreign key of the owning root or row
    pub owner_id: RecordId,

    /// Self-referential hierarchy pointer
    pub parent_id: Option<RecordId>,

    /// Partner sibling, in submitted id space
    pub partner_id: Option<RecordId>,

    /// Display order
    pub order: Option<i32>,

    /// Display row (grid layouts)
    pub row: Option<i32>,

    /// Natural key of this row
    pub code: Option<String>,

    /// Soft-deactivation flag
    pub active: bool,

    /// Variant attributes
    pub payload: Payload,

    /// Natural-key references resolved to ids, keyed by attribute name
    pub resolved: BTreeMap<String, RecordId>,
}

impl ChildRecord {
    /// Create an active record with an empty payload
    #[must_use]
    pub fn new(id: impl Into<RecordId>, tag: impl Into<VariantTag>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            owner_id: RecordId::NEW,
            parent_id: None,
            partner_id: None,
            order: None,
            row: None,
            code: None,
            active: true,
            payload: Payload::new(),
            resolved: BTreeMap::new(),
        }
    }

    /// With owner
    #[inline]
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<RecordId>) -> Self {
        self.owner_id = owner.into();
        self
    }

    /// With hierarchy parent
    #[inline]
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<RecordId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    /// With partner reference
    #[inline]
    #[must_use]
    pub fn with_partner(mut self, partner: impl Into<RecordId>) -> Self {
        self.partner_id = Some(partner.into());
        self
    }

    /// With display order
    #[inline]
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// With display row
    #[inline]
    #[must_use]
    pub fn with_row(mut self, row: i32) -> Self {
        self.row = Some(row);
        self
    }

    /// With natural key
    #[inline]
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// With a variant attribute
    #[inline]
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(name.into(), value.into());
        self
    }

    /// Mark inactive
    #[inline]
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Raw attribute, treating JSON `null` as absent
    #[inline]
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.payload.get(name).filter(|v| !v.is_null())
    }

    /// Numeric attribute
    #[inline]
    #[must_use]
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attr(name).and_then(Value::as_f64)
    }

    /// Integer attribute
    #[inline]
    #[must_use]
    pub fn attr_i64(&self, name: &str) -> Option<i64> {
        self.attr(name).and_then(Value::as_i64)
    }

    /// Text attribute
    #[inline]
    #[must_use]
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(Value::as_str)
    }

    /// Boolean attribute
    #[inline]
    #[must_use]
    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        self.attr(name).and_then(Value::as_bool)
    }

    /// Natural key with surrounding whitespace removed; empty keys count as absent
    #[must_use]
    pub fn trimmed_code(&self) -> Option<&str> {
        self.code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// Compare everything a write would change
    ///
    /// Identity, owner and partner are excluded: identity and owner are fixed
    /// by the slot, and partner links are written by the binder after ids exist.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.parent_id == other.parent_id
            && self.order == other.order
            && self.row == other.row
            && self.trimmed_code() == other.trimmed_code()
            && self.active == other.active
            && self.payload == other.payload
            && self.resolved == other.resolved
    }

    /// Copy every submitted attribute onto this identity
    ///
    /// Identity and partner link are kept; everything else is taken from
    /// `submitted`.
    pub fn overwrite_from(&mut self, submitted: &Self) {
        self.parent_id = submitted.parent_id;
        self.order = submitted.order;
        self.row = submitted.row;
        self.code = submitted.code.clone();
        self.active = submitted.active;
        self.payload = submitted.payload.clone();
        self.resolved = submitted.resolved.clone();
    }
}
