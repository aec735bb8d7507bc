//! Response envelope
//!
//! Every request answers `{ success, message, data, validationErrors }`.

use crate::error::EngineError;
use labcfg_record::{ChildRecord, CodecError, FieldError, SnapshotDigest, WireCodec};
use serde::Serialize;
use serde_json::Value;

/// Uniform response wrapper
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// True if the request took effect
    pub success: bool,
    /// Outcome summary or failure reason
    pub message: String,
    /// Payload on success
    pub data: Option<T>,
    /// Every field failure, for validation rejections
    pub validation_errors: Vec<FieldError>,
}

impl<T> Envelope<T> {
    /// Success with payload
    #[must_use]
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            validation_errors: Vec::new(),
        }
    }

    /// Failure without payload
    #[must_use]
    pub fn failure(message: impl Into<String>, validation_errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            validation_errors,
        }
    }

    /// Failure envelope for an engine error
    ///
    /// The message starts with the error kind so callers can branch on it.
    #[must_use]
    pub fn from_error(err: &EngineError) -> Self {
        let errors = err
            .validation_errors()
            .map(|errors| errors.iter().cloned().collect())
            .unwrap_or_default();
        Self::failure(format!("{}: {err}", err.kind()), errors)
    }

    /// Map the payload
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            message: self.message,
            data: self.data.map(f),
            validation_errors: self.validation_errors,
        }
    }
}

/// Encoded rows of one slot plus their digest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSnapshot {
    /// Wire-encoded rows in display order
    pub records: Vec<Value>,
    /// Digest over the decoded rows
    pub digest: SnapshotDigest,
}

impl SlotSnapshot {
    /// Encode persisted rows
    ///
    /// # Errors
    /// `CodecError` if a row carries a tag the codec's catalog does not know
    pub fn encode(codec: &WireCodec, rows: &[ChildRecord]) -> Result<Self, CodecError> {
        let records = rows
            .iter()
            .map(|row| codec.encode(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            records,
            digest: SnapshotDigest::of(rows),
        })
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the slot is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labcfg_record::ValidationErrors;
    use labcfg_test_utils::{codec, text_field};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn validation_failure_carries_every_field() {
        let mut errors = ValidationErrors::new();
        errors.push("fields[0].max", "must be at least min");
        errors.push("fields[1].label", "required");
        let envelope: Envelope<()> = Envelope::from_error(&EngineError::Validation(errors));

        assert!(!envelope.success);
        assert!(envelope.message.starts_with("ValidationFailure"));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap()["validationErrors"],
            json!([
                { "propertyName": "fields[0].max", "errorMessage": "must be at least min" },
                { "propertyName": "fields[1].label", "errorMessage": "required" }
            ])
        );
    }

    #[test]
    fn success_wire_shape() {
        let rows = vec![text_field(3)];
        let snapshot = SlotSnapshot::encode(&codec(), &rows).unwrap();
        let envelope = Envelope::ok(snapshot, "saved");

        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["success"], json!(true));
        assert_eq!(wire["message"], json!("saved"));
        assert_eq!(wire["data"]["records"][0]["$type"], json!("TextField"));
        assert_eq!(wire["validationErrors"], json!([]));
        assert_eq!(
            wire["data"]["digest"],
            json!(SnapshotDigest::of(&rows).to_string())
        );
    }
}
