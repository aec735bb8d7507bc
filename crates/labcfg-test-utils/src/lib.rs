//! Testing utilities for the LabCfg workspace
//!
//! Record fixtures for the built-in laboratory variants.

#![allow(missing_docs)]

use labcfg_record::types::{lab_catalog, tags};
use labcfg_record::{ChildRecord, RecordId, VariantCatalog, WireCodec};
use serde_json::json;
use std::sync::Arc;

pub fn catalog() -> Arc<VariantCatalog> {
    Arc::new(lab_catalog())
}

pub fn codec() -> WireCodec {
    WireCodec::new(catalog())
}

pub fn double_field(id: i64, min: f64, max: f64) -> ChildRecord {
    ChildRecord::new(id, tags::DOUBLE_FIELD)
        .with_attr("label", format!("Double {id}"))
        .with_attr("min", min)
        .with_attr("max", max)
}

pub fn integer_field(id: i64) -> ChildRecord {
    ChildRecord::new(id, tags::INTEGER_FIELD).with_attr("label", format!("Integer {id}"))
}

pub fn text_field(id: i64) -> ChildRecord {
    ChildRecord::new(id, tags::TEXT_FIELD).with_attr("label", format!("Text {id}"))
}

pub fn select_field(id: i64, options: &[&str]) -> ChildRecord {
    ChildRecord::new(id, tags::SELECT_FIELD)
        .with_attr("label", format!("Select {id}"))
        .with_attr("options", json!(options))
}

pub fn panel_procedure(id: i64, procedure_code: &str) -> ChildRecord {
    ChildRecord::new(id, tags::PANEL_PROCEDURE).with_attr("procedureCode", procedure_code)
}

pub fn menu_group(id: i64, label: &str) -> ChildRecord {
    ChildRecord::new(id, tags::MENU_GROUP).with_attr("label", label)
}

pub fn menu_link(id: i64, label: &str, target: &str) -> ChildRecord {
    ChildRecord::new(id, tags::MENU_LINK)
        .with_attr("label", label)
        .with_attr("target", target)
}

pub fn state_license(id: i64, state: &str, number: &str) -> ChildRecord {
    ChildRecord::new(id, tags::STATE_LICENSE)
        .with_attr("state", state)
        .with_attr("licenseNumber", number)
}

/// Rows as the store holds them: owned by `owner`, defaults applied
pub fn persisted(rows: Vec<ChildRecord>, owner: i64) -> Vec<ChildRecord> {
    let catalog = lab_catalog();
    rows.into_iter()
        .map(|row| {
            let mut row = catalog.materialize(&row).unwrap();
            row.owner_id = RecordId::new(owner);
            row
        })
        .collect()
}

/// Ids of `rows` in order
pub fn ids(rows: &[ChildRecord]) -> Vec<i64> {
    rows.iter().map(|r| r.id.get()).collect()
}
