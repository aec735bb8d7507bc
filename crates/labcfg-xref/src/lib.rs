//! LabCfg Cross-References and Validation Gate
//!
//! Natural-key resolution and pre-mutation validation for child collections.
//!
//! # Core Concepts
//!
//! - [`Scope`]: tenant + peer kind in which a natural key must be unique
//! - [`NaturalKeyIndex`]: per-scope radix tries of key → ids
//! - [`CrossReferenceResolver`]: strict key → id resolution (exactly one match)
//! - [`ValidationGate`]: shared slot rules + per-variant rules, aggregated
//!
//! # Example
//!
//! ```rust,ignore
//! use labcfg_xref::{CrossReferenceResolver, NaturalKeyIndex, Scope};
//!
//! let index = NaturalKeyIndex::new();
//! let scope = Scope::new(1, "procedure");
//! index.insert(&scope, "GLU", RecordId::new(10));
//!
//! let keys = ["GLU".to_string()].into_iter().collect();
//! let ids = CrossReferenceResolver::new().resolve(&keys, &scope, &index)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod gate;
mod index;
mod resolver;
mod scope;

pub use gate::{GateContext, GateError, SlotRules, ValidationGate, DEFAULT_MAX_CODE_LEN};
pub use index::NaturalKeyIndex;
pub use resolver::{
    CandidateMap, CrossReferenceResolver, KeyFailure, KeyRefs, NaturalKeySource, Resolution,
    XrefError,
};
pub use scope::{normalize_key, Scope};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use labcfg_record::types::{lab_catalog, tags, PROCEDURE_SCOPE};
    use labcfg_record::{ChildRecord, RecordId};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn gate_then_resolve_panel_members() {
        let catalog = lab_catalog();
        let rules = SlotRules::default();
        let mut members = vec![
            ChildRecord::new(-1, tags::PANEL_PROCEDURE).with_attr("procedureCode", "GLU"),
            ChildRecord::new(-2, tags::PANEL_PROCEDURE).with_attr("procedureCode", "NA"),
        ];

        let errors = ValidationGate::new(&catalog, &rules)
            .check(&members, &GateContext::new("procedures", Some(RecordId::new(3))))
            .unwrap();
        assert!(errors.is_empty(), "{errors:?}");

        let index = NaturalKeyIndex::new();
        let scope = Scope::new(7, PROCEDURE_SCOPE);
        index.insert(&scope, "GLU", RecordId::new(70));

        let refs = KeyRefs::collect(&members, &catalog);
        let err = CrossReferenceResolver::new()
            .resolve_all(&refs, 7, &index)
            .unwrap_err();
        assert_eq!(err.failed_keys(), vec!["NA"]);

        index.insert(&scope, "NA", RecordId::new(71));
        let resolution = CrossReferenceResolver::new()
            .resolve_all(&refs, 7, &index)
            .unwrap();
        resolution.apply(&mut members, &catalog);
        assert_eq!(members[1].resolved["procedureCode"], RecordId::new(71));
    }

    proptest! {
        #[test]
        fn resolves_iff_exactly_one_match(count in 0usize..4) {
            let index = NaturalKeyIndex::new();
            let scope = Scope::new(1, PROCEDURE_SCOPE);
            for id in 0..count {
                index.insert(&scope, "ABC", RecordId::new(id as i64 + 1));
            }
            let keys: BTreeSet<String> = ["ABC".to_string()].into_iter().collect();

            let result = CrossReferenceResolver::new().resolve(&keys, &scope, &index);
            prop_assert_eq!(result.is_ok(), count == 1);
        }

        #[test]
        fn distinct_codes_never_collide(codes in prop::collection::btree_set("[A-Z]{2,8}", 1..12)) {
            let catalog = lab_catalog();
            let rules = SlotRules::default();
            let records: Vec<ChildRecord> = codes
                .iter()
                .enumerate()
                .map(|(i, code)| {
                    ChildRecord::new(-(i as i64) - 1, tags::DATE_FIELD)
                        .with_attr("label", "d")
                        .with_code(code.clone())
                })
                .collect();

            let errors = ValidationGate::new(&catalog, &rules)
                .check(&records, &GateContext::new("fields", Some(RecordId::new(1))))
                .unwrap();
            prop_assert!(errors.is_empty());
        }
    }
}
