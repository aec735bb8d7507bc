//! Client state license rows

use super::tags;
use crate::catalog::{VariantEntry, VariantValidator};
use crate::record::ChildRecord;
use crate::schema::{AttrKind, AttributeSchema, AttributeSpec};
use crate::violation::ValidationErrors;
use chrono::NaiveDate;

/// Two-letter state, ISO expiry date
#[derive(Debug, Clone, Copy, Default)]
pub struct StateLicenseRules;

impl VariantValidator for StateLicenseRules {
    fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
        if let Some(state) = record.attr_str("state") {
            if state.len() != 2 || !state.chars().all(|c| c.is_ascii_uppercase()) {
                errors.push_field(path, "state", "state must be a two-letter uppercase code");
            }
        }
        if let Some(expires) = record.attr_str("expiresOn") {
            if NaiveDate::parse_from_str(expires, "%Y-%m-%d").is_err() {
                errors.push_field(path, "expiresOn", "expiresOn must be a date (YYYY-MM-DD)");
            }
        }
    }
}

pub(super) fn entry() -> VariantEntry {
    VariantEntry::new(
        tags::STATE_LICENSE,
        AttributeSchema::new()
            .attr(AttributeSpec::new("state", AttrKind::Text).required())
            .attr(AttributeSpec::new("licenseNumber", AttrKind::Text).required())
            .attr(AttributeSpec::new("expiresOn", AttrKind::Text)),
    )
    .with_validator(StateLicenseRules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(record: &ChildRecord) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        StateLicenseRules.validate(record, "licenses[1]", &mut errors);
        errors
    }

    #[test]
    fn valid_license() {
        let record = ChildRecord::new(1, tags::STATE_LICENSE)
            .with_attr("state", "NY")
            .with_attr("licenseNumber", "PFI-1234")
            .with_attr("expiresOn", "2027-03-31");
        assert!(check(&record).is_empty());
    }

    #[test]
    fn bad_state_and_date() {
        let record = ChildRecord::new(1, tags::STATE_LICENSE)
            .with_attr("state", "New York")
            .with_attr("expiresOn", "03/31/2027");
        let errors = check(&record);
        assert_eq!(errors.for_property("licenses[1].state").len(), 1);
        assert_eq!(errors.for_property("licenses[1].expiresOn").len(), 1);
    }
}
