//! Panel membership rows

use super::{tags, PROCEDURE_SCOPE};
use crate::catalog::VariantEntry;
use crate::schema::{AttrKind, AttributeSchema, AttributeSpec};

pub(super) fn entry() -> VariantEntry {
    VariantEntry::new(
        tags::PANEL_PROCEDURE,
        AttributeSchema::new()
            .attr(
                AttributeSpec::new(
                    "procedureCode",
                    AttrKind::KeyRef {
                        scope_kind: PROCEDURE_SCOPE.to_string(),
                    },
                )
                .required(),
            )
            .attr(AttributeSpec::new("optional", AttrKind::Bool).with_default(false)),
    )
}
