//! Instrument parser definition columns

use super::{tags, PROCEDURE_SCOPE};
use crate::catalog::{VariantEntry, VariantValidator};
use crate::record::ChildRecord;
use crate::schema::{AttrKind, AttributeSchema, AttributeSpec};
use crate::violation::ValidationErrors;

/// Column positions are zero-based
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserColumnRules;

impl VariantValidator for ParserColumnRules {
    fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
        if record.attr_i64("position").is_some_and(|p| p < 0) {
            errors.push_field(path, "position", "position must not be negative");
        }
    }
}

pub(super) fn entry() -> VariantEntry {
    VariantEntry::new(
        tags::PARSER_COLUMN,
        AttributeSchema::new()
            .attr(AttributeSpec::new("header", AttrKind::Text).required())
            .attr(AttributeSpec::new("position", AttrKind::Integer).required())
            .attr(AttributeSpec::new(
                "procedureCode",
                AttrKind::KeyRef {
                    scope_kind: PROCEDURE_SCOPE.to_string(),
                },
            )),
    )
    .with_validator(ParserColumnRules)
}
