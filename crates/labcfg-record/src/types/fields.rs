//! Procedure result field variants

use super::tags;
use crate::catalog::{VariantEntry, VariantValidator};
use crate::record::ChildRecord;
use crate::schema::{AttrKind, AttributeSchema, AttributeSpec};
use crate::violation::ValidationErrors;
use std::collections::HashSet;

/// Upper bound for text field length
pub const MAX_TEXT_LENGTH: i64 = 4000;

/// Upper bound for displayed decimals
pub const MAX_DECIMALS: i64 = 10;

/// `min <= max`, optional decimals bound
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericRangeRules {
    /// Check the `decimals` attribute
    pub check_decimals: bool,
}

impl VariantValidator for NumericRangeRules {
    fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
        if let (Some(min), Some(max)) = (record.attr_f64("min"), record.attr_f64("max")) {
            if min > max {
                errors.push_field(path, "max", format!("max ({max}) must not be below min ({min})"));
            }
        }
        if self.check_decimals {
            if let Some(decimals) = record.attr_i64("decimals") {
                if !(0..=MAX_DECIMALS).contains(&decimals) {
                    errors.push_field(
                        path,
                        "decimals",
                        format!("decimals must be between 0 and {MAX_DECIMALS}"),
                    );
                }
            }
        }
    }
}

/// Length bound for free text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRules;

impl VariantValidator for TextRules {
    fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
        if let Some(len) = record.attr_i64("maxLength") {
            if !(1..=MAX_TEXT_LENGTH).contains(&len) {
                errors.push_field(
                    path,
                    "maxLength",
                    format!("maxLength must be between 1 and {MAX_TEXT_LENGTH}"),
                );
            }
        }
    }
}

/// Options present, distinct, and containing the default
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectRules;

impl VariantValidator for SelectRules {
    fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
        let Some(options) = record.attr("options").and_then(|v| v.as_array()) else {
            return;
        };
        let options: Vec<&str> = options.iter().filter_map(|o| o.as_str()).collect();

        if options.is_empty() {
            errors.push_field(path, "options", "at least one option is required");
        }

        let mut seen = HashSet::new();
        for option in &options {
            if option.trim().is_empty() {
                errors.push_field(path, "options", "options must not be blank");
            } else if !seen.insert(option.trim().to_lowercase()) {
                errors.push_field(path, "options", format!("duplicate option '{option}'"));
            }
        }

        if let Some(default) = record.attr_str("defaultOption") {
            if !options.contains(&default) {
                errors.push_field(
                    path,
                    "defaultOption",
                    format!("default '{default}' is not one of the options"),
                );
            }
        }
    }
}

/// Formula must be non-blank with balanced parentheses
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatedRules;

impl VariantValidator for CalculatedRules {
    fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
        let Some(formula) = record.attr_str("formula") else {
            return;
        };
        let mut depth = 0i32;
        for c in formula.chars() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        if depth != 0 {
            errors.push_field(path, "formula", "unbalanced parentheses in formula");
        }
    }
}

fn numeric_schema(kind: AttrKind) -> AttributeSchema {
    AttributeSchema::new()
        .attr(AttributeSpec::new("label", AttrKind::Text).required())
        .attr(AttributeSpec::new("min", kind.clone()))
        .attr(AttributeSpec::new("max", kind))
        .attr(AttributeSpec::new("units", AttrKind::Text))
        .attr(AttributeSpec::new("required", AttrKind::Bool).with_default(false))
}

pub(super) fn entries() -> Vec<VariantEntry> {
    let numeric_partners = [tags::DOUBLE_FIELD, tags::INTEGER_FIELD];

    vec![
        VariantEntry::new(
            tags::DOUBLE_FIELD,
            numeric_schema(AttrKind::Number)
                .attr(AttributeSpec::new("decimals", AttrKind::Integer).with_default(2)),
        )
        .with_validator(NumericRangeRules {
            check_decimals: true,
        })
        .with_partner_tags(numeric_partners),
        VariantEntry::new(tags::INTEGER_FIELD, numeric_schema(AttrKind::Integer))
            .with_validator(NumericRangeRules::default())
            .with_partner_tags(numeric_partners),
        VariantEntry::new(
            tags::TEXT_FIELD,
            AttributeSchema::new()
                .attr(AttributeSpec::new("label", AttrKind::Text).required())
                .attr(AttributeSpec::new("maxLength", AttrKind::Integer).with_default(255))
                .attr(AttributeSpec::new("multiline", AttrKind::Bool).with_default(false))
                .attr(AttributeSpec::new("required", AttrKind::Bool).with_default(false)),
        )
        .with_validator(TextRules),
        VariantEntry::new(
            tags::DATE_FIELD,
            AttributeSchema::new()
                .attr(AttributeSpec::new("label", AttrKind::Text).required())
                .attr(AttributeSpec::new("includeTime", AttrKind::Bool).with_default(false))
                .attr(AttributeSpec::new("required", AttrKind::Bool).with_default(false)),
        ),
        VariantEntry::new(
            tags::SELECT_FIELD,
            AttributeSchema::new()
                .attr(AttributeSpec::new("label", AttrKind::Text).required())
                .attr(AttributeSpec::new("options", AttrKind::TextList).required())
                .attr(AttributeSpec::new("defaultOption", AttrKind::Text))
                .attr(AttributeSpec::new("required", AttrKind::Bool).with_default(false)),
        )
        .with_validator(SelectRules),
        VariantEntry::new(
            tags::BOOLEAN_FIELD,
            AttributeSchema::new()
                .attr(AttributeSpec::new("label", AttrKind::Text).required())
                .attr(AttributeSpec::new("defaultValue", AttrKind::Bool).with_default(false)),
        ),
        VariantEntry::new(
            tags::CALCULATED_FIELD,
            AttributeSchema::new()
                .attr(AttributeSpec::new("label", AttrKind::Text).required())
                .attr(AttributeSpec::new("formula", AttrKind::Text).required())
                .attr(AttributeSpec::new("decimals", AttrKind::Integer).with_default(2)),
        )
        .with_validator(CalculatedRules),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(validator: &dyn VariantValidator, record: &ChildRecord) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        validator.validate(record, "fields[0]", &mut errors);
        errors
    }

    #[test]
    fn numeric_min_above_max() {
        let record = ChildRecord::new(1, tags::DOUBLE_FIELD)
            .with_attr("min", 10)
            .with_attr("max", 5);
        let errors = check(&NumericRangeRules::default(), &record);
        assert_eq!(errors.for_property("fields[0].max").len(), 1);
    }

    #[test]
    fn numeric_equal_bounds_ok() {
        let record = ChildRecord::new(1, tags::DOUBLE_FIELD)
            .with_attr("min", 5)
            .with_attr("max", 5);
        assert!(check(&NumericRangeRules::default(), &record).is_empty());
    }

    #[test]
    fn decimals_bounded() {
        let record = ChildRecord::new(1, tags::DOUBLE_FIELD).with_attr("decimals", 12);
        let rules = NumericRangeRules {
            check_decimals: true,
        };
        assert_eq!(check(&rules, &record).len(), 1);
    }

    #[test]
    fn text_length_bounds() {
        let zero = ChildRecord::new(1, tags::TEXT_FIELD).with_attr("maxLength", 0);
        let ok = ChildRecord::new(1, tags::TEXT_FIELD).with_attr("maxLength", 80);
        assert_eq!(check(&TextRules, &zero).len(), 1);
        assert!(check(&TextRules, &ok).is_empty());
    }

    #[test]
    fn select_duplicates_and_default() {
        let record = ChildRecord::new(1, tags::SELECT_FIELD)
            .with_attr("options", json!(["Pos", "neg", "POS"]))
            .with_attr("defaultOption", "Unknown");
        let errors = check(&SelectRules, &record);
        assert_eq!(errors.for_property("fields[0].options").len(), 1);
        assert_eq!(errors.for_property("fields[0].defaultOption").len(), 1);
    }

    #[test]
    fn select_empty_options() {
        let record = ChildRecord::new(1, tags::SELECT_FIELD).with_attr("options", json!([]));
        assert_eq!(check(&SelectRules, &record).len(), 1);
    }

    #[test]
    fn formula_parentheses() {
        let bad = ChildRecord::new(1, tags::CALCULATED_FIELD).with_attr("formula", "(a + b");
        let closed_early = ChildRecord::new(1, tags::CALCULATED_FIELD).with_attr("formula", ")a(");
        let good = ChildRecord::new(1, tags::CALCULATED_FIELD).with_attr("formula", "(a + b) / 2");
        assert_eq!(check(&CalculatedRules, &bad).len(), 1);
        assert_eq!(check(&CalculatedRules, &closed_early).len(), 1);
        assert!(check(&CalculatedRules, &good).is_empty());
    }
}
