//! Built-in laboratory variants
//!
//! The shapes the back office ships with: procedure result fields, panel
//! membership, menu hierarchy nodes, client state licenses and parser
//! definition columns.

mod fields;
mod license;
mod menu;
mod panel;
mod parser;

pub use fields::{CalculatedRules, NumericRangeRules, SelectRules, TextRules};
pub use license::StateLicenseRules;
pub use menu::MenuLinkRules;
pub use parser::ParserColumnRules;

use crate::catalog::{VariantCatalog, VariantEntry};

/// Tag constants for the built-in variants
pub mod tags {
    //! Discriminator values
    pub const DOUBLE_FIELD: &str = "DoubleField";
    pub const INTEGER_FIELD: &str = "IntegerField";
    pub const TEXT_FIELD: &str = "TextField";
    pub const DATE_FIELD: &str = "DateField";
    pub const SELECT_FIELD: &str = "SelectField";
    pub const BOOLEAN_FIELD: &str = "BooleanField";
    pub const CALCULATED_FIELD: &str = "CalculatedField";
    pub const PANEL_PROCEDURE: &str = "PanelProcedure";
    pub const MENU_GROUP: &str = "MenuGroup";
    pub const MENU_LINK: &str = "MenuLink";
    pub const STATE_LICENSE: &str = "StateLicense";
    pub const PARSER_COLUMN: &str = "ParserColumn";
}

/// Scope kind for procedure codes
pub const PROCEDURE_SCOPE: &str = "procedure";

/// Every built-in entry
#[must_use]
pub fn builtin_entries() -> Vec<VariantEntry> {
    let mut entries = fields::entries();
    entries.push(panel::entry());
    entries.extend(menu::entries());
    entries.push(license::entry());
    entries.push(parser::entry());
    entries
}

/// Catalog holding every built-in variant
#[must_use]
pub fn lab_catalog() -> VariantCatalog {
    let mut catalog = VariantCatalog::new();
    for entry in builtin_entries() {
        // built-in tags are distinct and avoid reserved names
        let _ = catalog.register(entry);
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_entries_register_cleanly() {
        let mut catalog = VariantCatalog::new();
        for entry in builtin_entries() {
            catalog.register(entry).unwrap();
        }
        assert_eq!(catalog.len(), 12);
    }

    #[test]
    fn lab_catalog_has_field_shapes() {
        let catalog = lab_catalog();
        for tag in [
            tags::DOUBLE_FIELD,
            tags::TEXT_FIELD,
            tags::SELECT_FIELD,
            tags::MENU_GROUP,
            tags::STATE_LICENSE,
        ] {
            assert!(catalog.contains(tag), "missing {tag}");
        }
    }
}
