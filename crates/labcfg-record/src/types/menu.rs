//! Menu hierarchy nodes

use super::tags;
use crate::catalog::{VariantEntry, VariantValidator};
use crate::record::ChildRecord;
use crate::schema::{AttrKind, AttributeSchema, AttributeSpec};
use crate::violation::ValidationErrors;

/// Link targets are application-relative paths
#[derive(Debug, Clone, Copy, Default)]
pub struct MenuLinkRules;

impl VariantValidator for MenuLinkRules {
    fn validate(&self, record: &ChildRecord, path: &str, errors: &mut ValidationErrors) {
        if let Some(target) = record.attr_str("target") {
            if !target.starts_with('/') || target.contains(char::is_whitespace) {
                errors.push_field(
                    path,
                    "target",
                    "target must be an application path starting with '/'",
                );
            }
        }
    }
}

pub(super) fn entries() -> Vec<VariantEntry> {
    vec![
        VariantEntry::new(
            tags::MENU_GROUP,
            AttributeSchema::new()
                .attr(AttributeSpec::new("label", AttrKind::Text).required())
                .attr(AttributeSpec::new("icon", AttrKind::Text)),
        ),
        VariantEntry::new(
            tags::MENU_LINK,
            AttributeSchema::new()
                .attr(AttributeSpec::new("label", AttrKind::Text).required())
                .attr(AttributeSpec::new("target", AttrKind::Text).required()),
        )
        .with_validator(MenuLinkRules),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_target_must_be_path() {
        let mut errors = ValidationErrors::new();
        let bad = ChildRecord::new(1, tags::MENU_LINK).with_attr("target", "http://x");
        MenuLinkRules.validate(&bad, "menu[0]", &mut errors);
        assert_eq!(errors.for_property("menu[0].target").len(), 1);

        let mut ok = ValidationErrors::new();
        let good = ChildRecord::new(1, tags::MENU_LINK).with_attr("target", "/procedures");
        MenuLinkRules.validate(&good, "menu[0]", &mut ok);
        assert!(ok.is_empty());
    }
}
