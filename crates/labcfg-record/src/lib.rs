//! LabCfg Record Model
//!
//! Tagged-union child records shared by every editable configuration root.
//!
//! # Core Concepts
//!
//! - [`ChildRecord`]: one row of a child collection (base fields + payload)
//! - [`RecordId`]: numeric identity, `<= 0` means "new"
//! - [`VariantTag`]: discriminator naming a record's shape
//! - [`VariantCatalog`]: tag → (schema, validator, constructor)
//! - [`WireCodec`]: record ⇄ self-describing JSON
//! - [`SnapshotDigest`]: Blake3 digest of a normalized snapshot
//!
//! # Example
//!
//! ```rust,ignore
//! use labcfg_record::{types::lab_catalog, WireCodec};
//! use std::sync::Arc;
//!
//! let codec = WireCodec::new(Arc::new(lab_catalog()));
//! let record = codec.decode(&serde_json::json!({
//!     "$type": "DoubleField", "id": -1, "label": "Glucose", "min": 0, "max": 10
//! }))?;
//! assert!(record.id.is_new());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod catalog;
mod codec;
mod digest;
mod record;
mod schema;
mod violation;

/// Built-in laboratory variants
pub mod types;

// Re-exports
pub use catalog::{
    CatalogError, NoRules, RecordConstructor, SchemaConstructor, VariantCatalog, VariantEntry,
    VariantValidator, RESERVED_ATTRIBUTES,
};
pub use codec::{CodecError, WireCodec, DEFAULT_DISCRIMINATOR};
pub use digest::SnapshotDigest;
pub use record::{ChildRecord, Payload, RecordId, VariantTag};
pub use schema::{AttrKind, AttributeSchema, AttributeSpec};
pub use violation::{join_path, FieldError, ValidationErrors};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn codec() -> WireCodec {
        WireCodec::new(Arc::new(types::lab_catalog()))
    }

    #[test]
    fn decode_then_materialize_applies_defaults() {
        let catalog = types::lab_catalog();
        let record = codec()
            .decode(&json!({"$type": "DoubleField", "id": -1, "label": "Glucose"}))
            .unwrap();

        let built = catalog.materialize(&record).unwrap();
        assert_eq!(built.attr_i64("decimals"), Some(2));
        assert_eq!(built.attr_bool("required"), Some(false));
    }

    #[test]
    fn validation_of_decoded_record() {
        let catalog = types::lab_catalog();
        let record = codec()
            .decode(&json!({"$type": "DoubleField", "id": 4, "min": 9, "max": 1}))
            .unwrap();

        let mut errors = ValidationErrors::new();
        catalog
            .get(&record.tag)
            .unwrap()
            .validate(&record, "fields[0]", &mut errors);

        // label missing + max below min
        assert_eq!(errors.len(), 2);
    }

    proptest! {
        #[test]
        fn encode_never_leaks_foreign_attributes(
            name in "[a-z]{3,12}",
            value in any::<i64>(),
        ) {
            let catalog = types::lab_catalog();
            let entry = catalog.lookup(types::tags::TEXT_FIELD).unwrap();
            prop_assume!(!entry.schema().contains(&name));
            prop_assume!(!RESERVED_ATTRIBUTES.contains(&name.as_str()));

            let record = ChildRecord::new(1, types::tags::TEXT_FIELD).with_attr(name.clone(), value);
            let encoded = codec().encode(&record).unwrap();
            prop_assert!(encoded.get(&name).is_none());
        }

        #[test]
        fn digest_stable_under_permutation(ids in prop::collection::hash_set(1i64..500, 0..20)) {
            let rows: Vec<ChildRecord> = ids
                .iter()
                .map(|id| ChildRecord::new(*id, types::tags::DATE_FIELD).with_attr("label", "d"))
                .collect();
            let mut reversed = rows.clone();
            reversed.reverse();
            prop_assert_eq!(SnapshotDigest::of(&rows), SnapshotDigest::of(&reversed));
        }
    }
}
