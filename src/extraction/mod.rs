//! Document extraction
//!
//! The unified extractor combines several extraction tasks into one
//! vision-LLM call per page; the rule-based extractors handle digital
//! formats without any model. Both produce the shared response types here.

pub mod prompts;
pub mod rules;
pub mod unified;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pixel-space bounding box relative to the image origin (top-left)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Pixel-space point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i64,
    pub y: i64,
}

/// A layout block identified on a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBlock {
    #[serde(rename = "type", default)]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub bounding_box: Option<PixelBox>,
    #[serde(default)]
    pub reading_order: Option<u32>,
    #[serde(default)]
    pub page: u32,
}

/// A table extracted from a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTable {
    #[serde(default)]
    pub table_type: String,
    #[serde(default)]
    pub caption: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub bounding_box: Option<PixelBox>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub contains_reference_quantities: bool,
    #[serde(default)]
    pub element_types_to_count: Vec<String>,
    #[serde(default)]
    pub page: u32,
}

impl ExtractedTable {
    /// Whether this table is a schedule or bill of materials
    pub fn is_schedule(&self) -> bool {
        self.contains_reference_quantities
            || matches!(
                self.table_type.as_str(),
                "schedule" | "bill_of_materials" | "bom"
            )
    }

    /// Index of a column by any of the given header names (case-insensitive)
    pub fn column_index(&self, names: &[&str]) -> Option<usize> {
        self.headers.iter().position(|h| {
            let h = h.trim().to_uppercase();
            names.iter().any(|n| h == n.to_uppercase())
        })
    }
}

/// A named entity identified in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub bounding_box: Option<PixelBox>,
    #[serde(default)]
    pub linked_component: Option<String>,
    #[serde(default)]
    pub page: u32,
}

/// One visual element instance with exact coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualElementInstance {
    #[serde(default)]
    pub element_id: String,
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub center_point: Option<PixelPoint>,
    #[serde(default)]
    pub bounding_box: Option<PixelBox>,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub specifications: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub rotation: f64,
}

/// A group of identical elements in spatial proximity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementGroup {
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub element_type: String,
    pub count: u32,
    #[serde(default)]
    pub cluster_center: Option<PixelPoint>,
    #[serde(default)]
    pub spatial_description: String,
    #[serde(default)]
    pub elements: Vec<VisualElementInstance>,
    #[serde(default)]
    pub page: u32,
}

/// Schedule-vs-drawing quantity comparison for one element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleValidation {
    pub required_quantity: u32,
    pub found_in_drawing: u32,
    #[serde(rename = "match")]
    pub matches: bool,
}

/// Visual elements with their schedule validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisualElements {
    #[serde(default)]
    pub element_groups: Vec<ElementGroup>,
    #[serde(default)]
    pub validation: BTreeMap<String, ScheduleValidation>,
}

/// Drawing metadata: title block fields, notes, and document traits
///
/// Kept as a JSON map because title blocks vary wildly; merge keeps the first
/// page's values and fills missing fields from later pages.
pub type DrawingMetadata = serde_json::Map<String, serde_json::Value>;

/// Normalize an element-type label for schedule matching
/// (upper-cased, spaces collapsed to underscores)
pub fn normalize_element_type(label: &str) -> String {
    label
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_element_type() {
        assert_eq!(normalize_element_type("HEX BOLT M8x20"), "HEX_BOLT_M8X20");
        assert_eq!(normalize_element_type("  rivet  6mm "), "RIVET_6MM");
    }

    #[test]
    fn test_table_schedule_detection() {
        let table = ExtractedTable {
            table_type: "schedule".to_string(),
            caption: String::new(),
            headers: vec!["MARK".into(), "TYPE".into(), "QUANTITY".into()],
            rows: vec![],
            position: String::new(),
            bounding_box: None,
            notes: String::new(),
            contains_reference_quantities: false,
            element_types_to_count: vec![],
            page: 1,
        };
        assert!(table.is_schedule());
        assert_eq!(table.column_index(&["QUANTITY", "QTY"]), Some(2));
        assert_eq!(table.column_index(&["GRADE"]), None);
    }
}
