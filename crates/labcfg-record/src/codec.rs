//! Wire codec for tagged-union records
//!
//! [`WireCodec`] turns a [`ChildRecord`] into a self-describing JSON object
//! (discriminator + base fields + the variant's own attributes) and back.
//!
//! Encoding never leaks attributes another variant owns. Decoding rejects an
//! unknown discriminator but ignores unknown non-discriminator fields, so
//! newer clients can talk to older servers.

use crate::catalog::VariantCatalog;
use crate::record::{ChildRecord, RecordId, VariantTag};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Default discriminator field name
pub const DEFAULT_DISCRIMINATOR: &str = "$type";

/// Errors while encoding or decoding records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Record payload is not a JSON object
    #[error("record must be a JSON object")]
    NotAnObject,

    /// Snapshot payload is not a JSON array
    #[error("snapshot must be a JSON array")]
    NotAnArray,

    /// Discriminator field absent or not a string
    #[error("missing discriminator field '{0}'")]
    MissingDiscriminator(String),

    /// Discriminator names no registered variant
    #[error("unknown variant: '{0}'")]
    UnknownVariant(VariantTag),

    /// Base field has the wrong JSON type
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Expected shape
        expected: &'static str,
    },

    /// Failure inside a snapshot element
    #[error("item {index}: {source}")]
    AtIndex {
        /// Array position
        index: usize,
        /// Underlying failure
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// Innermost error, skipping positional wrappers
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::AtIndex { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Encoder/decoder bound to one catalog
#[derive(Debug, Clone)]
pub struct WireCodec {
    catalog: Arc<VariantCatalog>,
    discriminator: String,
}

impl WireCodec {
    /// Codec using the default discriminator
    #[inline]
    #[must_use]
    pub fn new(catalog: Arc<VariantCatalog>) -> Self {
        Self {
            catalog,
            discriminator: DEFAULT_DISCRIMINATOR.to_string(),
        }
    }

    /// Use a different discriminator field name
    #[inline]
    #[must_use]
    pub fn with_discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminator = field.into();
        self
    }

    /// Discriminator field name
    #[inline]
    #[must_use]
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Catalog this codec reads schemas from
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &Arc<VariantCatalog> {
        &self.catalog
    }

    /// Encode one record
    ///
    /// # Errors
    /// Returns `UnknownVariant` if the record's tag is not registered
    pub fn encode(&self, record: &ChildRecord) -> Result<Value, CodecError> {
        let entry = self
            .catalog
            .lookup(record.tag.as_str())
            .ok_or_else(|| CodecError::UnknownVariant(record.tag.clone()))?;

        let mut obj = Map::new();
        obj.insert(
            self.discriminator.clone(),
            Value::String(record.tag.to_string()),
        );
        obj.insert("id".into(), Value::from(record.id.get()));
        obj.insert("ownerId".into(), Value::from(record.owner_id.get()));
        if let Some(parent) = record.parent_id {
            obj.insert("parentId".into(), Value::from(parent.get()));
        }
        if let Some(partner) = record.partner_id {
            obj.insert("partnerId".into(), Value::from(partner.get()));
        }
        if let Some(order) = record.order {
            obj.insert("order".into(), Value::from(order));
        }
        if let Some(row) = record.row {
            obj.insert("row".into(), Value::from(row));
        }
        if let Some(code) = &record.code {
            obj.insert("code".into(), Value::String(code.clone()));
        }
        obj.insert("active".into(), Value::Bool(record.active));

        for spec in entry.schema().iter() {
            if let Some(value) = record.attr(&spec.name) {
                obj.insert(spec.name.clone(), value.clone());
            }
        }

        Ok(Value::Object(obj))
    }

    /// Decode one record
    ///
    /// # Errors
    /// - `NotAnObject` for non-object payloads
    /// - `MissingDiscriminator` if the tag field is absent
    /// - `UnknownVariant` if the tag is not registered
    /// - `InvalidField` if a base field has the wrong JSON type
    pub fn decode(&self, payload: &Value) -> Result<ChildRecord, CodecError> {
        let obj = payload.as_object().ok_or(CodecError::NotAnObject)?;

        let tag = obj
            .get(&self.discriminator)
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::MissingDiscriminator(self.discriminator.clone()))?;
        let entry = self
            .catalog
            .lookup(tag)
            .ok_or_else(|| CodecError::UnknownVariant(VariantTag::new(tag)))?;

        let mut record = ChildRecord::new(
            read_id(obj, "id")?.unwrap_or(RecordId::NEW),
            entry.tag().clone(),
        );
        record.owner_id = read_id(obj, "ownerId")?.unwrap_or(RecordId::NEW);
        record.parent_id = read_id(obj, "parentId")?;
        record.partner_id = read_id(obj, "partnerId")?;
        record.order = read_i32(obj, "order")?;
        record.row = read_i32(obj, "row")?;
        record.code = match obj.get("code") {
            None | Some(Value::Null) => None,
            Some(Value::String(code)) => Some(code.clone()),
            Some(_) => {
                return Err(CodecError::InvalidField {
                    field: "code",
                    expected: "a string",
                })
            }
        };
        record.active = match obj.get("active") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(active)) => *active,
            Some(_) => {
                return Err(CodecError::InvalidField {
                    field: "active",
                    expected: "a boolean",
                })
            }
        };

        for spec in entry.schema().iter() {
            if let Some(value) = obj.get(&spec.name).filter(|v| !v.is_null()) {
                record.payload.insert(spec.name.clone(), value.clone());
            }
        }

        Ok(record)
    }

    /// Encode a snapshot as a JSON array, preserving order
    ///
    /// # Errors
    /// Fails on the first record that cannot be encoded
    pub fn encode_snapshot(&self, records: &[ChildRecord]) -> Result<Value, CodecError> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.encode(record).map_err(|e| CodecError::AtIndex {
                    index,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    /// Decode a JSON array snapshot
    ///
    /// # Errors
    /// `NotAnArray`, or the first element failure wrapped in `AtIndex`
    pub fn decode_snapshot(&self, payload: &Value) -> Result<Vec<ChildRecord>, CodecError> {
        let items = payload.as_array().ok_or(CodecError::NotAnArray)?;
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.decode(item).map_err(|e| CodecError::AtIndex {
                    index,
                    source: Box::new(e),
                })
            })
            .collect()
    }
}

fn read_id(obj: &Map<String, Value>, field: &'static str) -> Result<Option<RecordId>, CodecError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(|raw| Some(RecordId::new(raw)))
            .ok_or(CodecError::InvalidField {
                field,
                expected: "an integer",
            }),
    }
}

fn read_i32(obj: &Map<String, Value>, field: &'static str) -> Result<Option<i32>, CodecError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|raw| i32::try_from(raw).ok())
            .map(Some)
            .ok_or(CodecError::InvalidField {
                field,
                expected: "a 32-bit integer",
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::lab_catalog;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn codec() -> WireCodec {
        WireCodec::new(Arc::new(lab_catalog()))
    }

    #[test]
    fn encode_emits_only_own_attributes() {
        let record = ChildRecord::new(7, "TextField")
            .with_owner(3)
            .with_order(1)
            .with_attr("maxLength", 80)
            // belongs to DoubleField
            .with_attr("min", 0);

        let encoded = codec().encode(&record).unwrap();

        assert_eq!(encoded["$type"], "TextField");
        assert_eq!(encoded["id"], 7);
        assert_eq!(encoded["ownerId"], 3);
        assert_eq!(encoded["order"], 1);
        assert_eq!(encoded["maxLength"], 80);
        assert!(encoded.get("min").is_none());
        assert!(encoded.get("parentId").is_none());
    }

    #[test]
    fn decode_unknown_variant() {
        let err = codec()
            .decode(&json!({"$type": "HologramField", "id": 1}))
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownVariant(VariantTag::new("HologramField"))
        );
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let record = codec()
            .decode(&json!({
                "$type": "DoubleField",
                "id": -1,
                "min": 0,
                "max": 10,
                "futureFlag": true,
                "maxLength": 3
            }))
            .unwrap();

        assert_eq!(record.id, RecordId::new(-1));
        assert_eq!(record.attr_f64("max"), Some(10.0));
        assert!(record.attr("futureFlag").is_none());
        assert!(record.attr("maxLength").is_none());
        assert!(record.active);
    }

    #[test]
    fn decode_missing_discriminator() {
        let err = codec().decode(&json!({"id": 1})).unwrap_err();
        assert_eq!(err, CodecError::MissingDiscriminator("$type".into()));
    }

    #[test]
    fn decode_rejects_bad_base_field() {
        let err = codec()
            .decode(&json!({"$type": "TextField", "id": "seven"}))
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { field: "id", .. }));
    }

    #[test]
    fn custom_discriminator() {
        let codec = codec().with_discriminator("kind");
        let record = codec
            .decode(&json!({"kind": "BooleanField", "id": 2}))
            .unwrap();
        assert_eq!(record.tag, "BooleanField");
        assert_eq!(codec.encode(&record).unwrap()["kind"], "BooleanField");
    }

    #[test]
    fn snapshot_errors_carry_index() {
        let err = codec()
            .decode_snapshot(&json!([
                {"$type": "TextField", "id": 1},
                {"$type": "Nope", "id": 2}
            ]))
            .unwrap_err();

        assert!(matches!(err, CodecError::AtIndex { index: 1, .. }));
        assert!(matches!(err.root_cause(), CodecError::UnknownVariant(_)));
    }

    #[test]
    fn snapshot_preserves_order() {
        let rows = vec![
            ChildRecord::new(2, "TextField").with_order(0),
            ChildRecord::new(1, "DateField").with_order(1),
        ];
        let encoded = codec().encode_snapshot(&rows).unwrap();
        let decoded = codec().decode_snapshot(&encoded).unwrap();
        assert_eq!(decoded, rows);
    }
}
