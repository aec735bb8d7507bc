//! Attribute schemas for record variants
//!
//! An [`AttributeSchema`] lists the attributes one variant owns. It drives
//! three things: which payload keys the codec reads and writes, which
//! defaults the constructor applies, and the kind/required checks run by
//! the validation gate.

use crate::record::Payload;
use crate::violation::ValidationErrors;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute value kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AttrKind {
    /// Any JSON number
    Number,
    /// Whole JSON number
    Integer,
    /// JSON string
    Text,
    /// JSON boolean
    Bool,
    /// Array of JSON strings
    TextList,
    /// Natural-key reference, resolved within `scope_kind`
    #[serde(rename_all = "camelCase")]
    KeyRef {
        /// Peer kind the key names (e.g. `procedure`)
        scope_kind: String,
    },
}

impl AttrKind {
    /// Check a non-null value against this kind
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Text | Self::KeyRef { .. } => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::TextList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    /// Human-readable kind name
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Number => "a number",
            Self::Integer => "a whole number",
            Self::Text => "text",
            Self::Bool => "true or false",
            Self::TextList => "a list of text values",
            Self::KeyRef { .. } => "a reference code",
        }
    }
}

/// One attribute of a variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSpec {
    /// Wire name
    pub name: String,
    /// Value kind
    pub kind: AttrKind,
    /// Must be present and non-null
    pub required: bool,
    /// Value applied when a new row omits the attribute
    pub default: Option<Value>,
}

impl AttributeSpec {
    /// Optional attribute without default
    #[must_use]
    pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    /// Mark required
    #[inline]
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Default value for new rows
    #[inline]
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Ordered attribute list for one variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSchema {
    attrs: Vec<AttributeSpec>,
}

impl AttributeSchema {
    /// Empty schema (variants with no attributes of their own)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute
    ///
    /// A later spec with the same name replaces the earlier one.
    #[must_use]
    pub fn attr(mut self, spec: AttributeSpec) -> Self {
        self.attrs.retain(|a| a.name != spec.name);
        self.attrs.push(spec);
        self
    }

    /// Look up an attribute
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeSpec> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// True if the schema owns `name`
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate attributes in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attrs.iter()
    }

    /// Number of attributes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// True for attribute-less variants
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Natural-key reference attributes as `(attribute, scope kind)`
    pub fn key_refs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().filter_map(|a| match &a.kind {
            AttrKind::KeyRef { scope_kind } => Some((a.name.as_str(), scope_kind.as_str())),
            _ => None,
        })
    }

    /// Keep only attributes this schema owns; nulls are dropped
    #[must_use]
    pub fn project(&self, payload: &Payload) -> Payload {
        self.attrs
            .iter()
            .filter_map(|spec| {
                payload
                    .get(&spec.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (spec.name.clone(), v.clone()))
            })
            .collect()
    }

    /// Fill defaults for absent attributes
    pub fn apply_defaults(&self, payload: &mut Payload) {
        for spec in &self.attrs {
            if let Some(default) = &spec.default {
                let absent = payload.get(&spec.name).map_or(true, Value::is_null);
                if absent {
                    payload.insert(spec.name.clone(), default.clone());
                }
            }
        }
    }

    /// Required and kind checks
    pub fn check(&self, payload: &Payload, path: &str, errors: &mut ValidationErrors) {
        for spec in &self.attrs {
            match payload.get(&spec.name).filter(|v| !v.is_null()) {
                None if spec.required => {
                    errors.push_field(path, &spec.name, format!("'{}' is required", spec.name));
                }
                None => {}
                Some(value) => {
                    if !spec.kind.accepts(value) {
                        errors.push_field(
                            path,
                            &spec.name,
                            format!("'{}' must be {}", spec.name, spec.kind.describe()),
                        );
                    } else if spec.required && is_blank(value) {
                        errors.push_field(path, &spec.name, format!("'{}' is required", spec.name));
                    }
                }
            }
        }
    }
}

fn is_blank(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> AttributeSchema {
        AttributeSchema::new()
            .attr(AttributeSpec::new("min", AttrKind::Number))
            .attr(AttributeSpec::new("decimals", AttrKind::Integer).with_default(2))
            .attr(AttributeSpec::new("label", AttrKind::Text).required())
            .attr(AttributeSpec::new(
                "procedureCode",
                AttrKind::KeyRef {
                    scope_kind: "procedure".to_string(),
                },
            ))
    }

    #[test]
    fn kind_acceptance() {
        assert!(AttrKind::Number.accepts(&json!(1.5)));
        assert!(AttrKind::Integer.accepts(&json!(3)));
        assert!(!AttrKind::Integer.accepts(&json!(3.5)));
        assert!(AttrKind::TextList.accepts(&json!(["a", "b"])));
        assert!(!AttrKind::TextList.accepts(&json!(["a", 1])));
        assert!(!AttrKind::Bool.accepts(&json!("true")));
    }

    #[test]
    fn project_drops_foreign_and_null_attributes() {
        let mut payload = Payload::new();
        payload.insert("min".into(), json!(0));
        payload.insert("maxLength".into(), json!(10));
        payload.insert("label".into(), Value::Null);

        let projected = schema().project(&payload);
        assert_eq!(projected.len(), 1);
        assert!(projected.contains_key("min"));
    }

    #[test]
    fn defaults_fill_only_absent() {
        let mut payload = Payload::new();
        schema().apply_defaults(&mut payload);
        assert_eq!(payload["decimals"], json!(2));

        let mut explicit = Payload::new();
        explicit.insert("decimals".into(), json!(4));
        schema().apply_defaults(&mut explicit);
        assert_eq!(explicit["decimals"], json!(4));
    }

    #[test]
    fn check_reports_required_and_kind() {
        let mut payload = Payload::new();
        payload.insert("min".into(), json!("zero"));

        let mut errors = ValidationErrors::new();
        schema().check(&payload, "fields[0]", &mut errors);

        assert_eq!(errors.for_property("fields[0].min").len(), 1);
        assert_eq!(errors.for_property("fields[0].label").len(), 1);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn blank_required_text_fails() {
        let mut payload = Payload::new();
        payload.insert("label".into(), json!("   "));

        let mut errors = ValidationErrors::new();
        schema().check(&payload, "", &mut errors);
        assert_eq!(errors.for_property("label").len(), 1);
    }

    #[test]
    fn key_refs_listed() {
        let schema = schema();
        let refs: Vec<_> = schema.key_refs().collect();
        assert_eq!(refs, vec![("procedureCode", "procedure")]);
    }

    #[test]
    fn later_attr_replaces_earlier() {
        let schema = AttributeSchema::new()
            .attr(AttributeSpec::new("x", AttrKind::Number))
            .attr(AttributeSpec::new("x", AttrKind::Text));
        assert_eq!(schema.len(), 1);
        assert_eq!(schema.get("x").unwrap().kind, AttrKind::Text);
    }
}
