//! Element specification schemas and validation
//!
//! A typed schema keyed by element type declares the allowed specification
//! groups. Validation tolerates missing groups (the drawing may simply not
//! state them), rejects unexpected groups and fields, and scores
//! completeness as the fraction of filled leaf fields.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One node of an element schema
#[derive(Debug, Clone)]
pub enum SchemaNode {
    /// A flat group of leaf fields
    Fields(&'static [&'static str]),
    /// Named sections, each with its own node
    Sections(BTreeMap<&'static str, SchemaNode>),
}

/// Schema for one element type: group name -> node
pub type ElementSchema = BTreeMap<&'static str, SchemaNode>;

const REINF_FIELDS: &[&str] = &["bar_size", "spacing_mm", "fabric_type", "direction"];
const CONCRETE_FIELDS: &[&str] = &["grade", "cover_mm", "cover_description"];
const QUANTITY_FIELDS: &[&str] = &["count", "length", "value", "unit"];
const LOCATION_FIELDS: &[&str] = &["description", "zone", "level"];
const FINISH_FIELDS: &[&str] = &["type"];

fn reinforcement_sections(sections: &[&'static str]) -> SchemaNode {
    let mut map = BTreeMap::new();
    for section in sections {
        map.insert(*section, SchemaNode::Fields(REINF_FIELDS));
    }
    SchemaNode::Sections(map)
}

fn base_schema(dimension_fields: &'static [&'static str], reinf: &[&'static str]) -> ElementSchema {
    let mut schema = BTreeMap::new();
    schema.insert("dimensions", SchemaNode::Fields(dimension_fields));
    schema.insert("reinforcement", reinforcement_sections(reinf));
    schema.insert("concrete", SchemaNode::Fields(CONCRETE_FIELDS));
    schema.insert("quantity", SchemaNode::Fields(QUANTITY_FIELDS));
    schema.insert("location", SchemaNode::Fields(LOCATION_FIELDS));
    schema.insert("finish", SchemaNode::Fields(FINISH_FIELDS));
    schema
}

/// Schemas for the concrete trade, keyed by element type
fn element_schemas() -> &'static BTreeMap<&'static str, ElementSchema> {
    static SCHEMAS: OnceLock<BTreeMap<&'static str, ElementSchema>> = OnceLock::new();
    SCHEMAS.get_or_init(|| {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            "column",
            base_schema(
                &["width_mm", "length_mm", "depth_mm", "height_mm"],
                &["top", "bottom", "side"],
            ),
        );
        schemas.insert(
            "beam",
            base_schema(
                &["width_mm", "length_mm", "depth_mm"],
                &["top", "bottom", "side"],
            ),
        );
        schemas.insert(
            "slab",
            base_schema(
                &["width_mm", "length_mm", "depth_mm", "thickness_mm"],
                &["top", "bottom"],
            ),
        );
        schemas.insert(
            "footing",
            base_schema(
                &["width_mm", "length_mm", "depth_mm"],
                &["top", "bottom", "side"],
            ),
        );
        schemas.insert(
            "wall",
            base_schema(
                &["width_mm", "length_mm", "depth_mm", "height_mm", "thickness_mm"],
                &["top", "bottom", "side"],
            ),
        );
        schemas
    })
}

/// Look up the schema for an element type, tolerant of naming variants
pub fn schema_for(element_type: &str) -> Option<&'static ElementSchema> {
    let normalized = element_type.to_lowercase();
    let key = if normalized.contains("column") || normalized.contains("pier") {
        "column"
    } else if normalized.contains("beam") {
        "beam"
    } else if normalized.contains("slab") {
        "slab"
    } else if normalized.contains("footing") || normalized.contains("pad") {
        "footing"
    } else if normalized.contains("wall") {
        "wall"
    } else {
        return None;
    };
    element_schemas().get(key)
}

/// Verify extracted specifications conform to the element type's schema
///
/// Missing groups are tolerated; unexpected groups or fields are errors.
pub fn validate_specs(element_type: &str, specs: &Value) -> (bool, Vec<String>) {
    let Some(schema) = schema_for(element_type) else {
        return (false, vec![format!("Unknown element type: {}", element_type)]);
    };

    let Some(specs_map) = specs.as_object() else {
        return (
            false,
            vec![format!(
                "specifications should be object, got {}",
                type_name(specs)
            )],
        );
    };

    let mut errors = Vec::new();

    for (group_name, node) in schema {
        if let Some(group_data) = specs_map.get(*group_name) {
            validate_node(group_name, node, group_data, &mut errors);
        }
    }

    for key in specs_map.keys() {
        if !schema.contains_key(key.as_str()) {
            errors.push(format!("Unexpected group in output: {}", key));
        }
    }

    (errors.is_empty(), errors)
}

fn validate_node(path: &str, node: &SchemaNode, data: &Value, errors: &mut Vec<String>) {
    // Explicitly null means the data does not exist, which is fine
    if data.is_null() {
        return;
    }

    let Some(map) = data.as_object() else {
        errors.push(format!("{} should be object, got {}", path, type_name(data)));
        return;
    };

    match node {
        SchemaNode::Fields(fields) => {
            for key in map.keys() {
                if !fields.contains(&key.as_str()) {
                    errors.push(format!("{} has unexpected field: {}", path, key));
                }
            }
        }
        SchemaNode::Sections(sections) => {
            for (section_name, section_node) in sections {
                if let Some(section_data) = map.get(*section_name) {
                    let section_path = format!("{}.{}", path, section_name);
                    validate_node(&section_path, section_node, section_data, errors);
                }
            }
            for key in map.keys() {
                if !sections.contains_key(key.as_str()) {
                    errors.push(format!("{} has unexpected section: {}", path, key));
                }
            }
        }
    }
}

/// Remove fields not in the schema (defensive cleanup)
///
/// Keeps only schema-defined fields; groups absent from the input come back
/// as null. The output is always a field-wise subset of the input.
pub fn sanitize_specs(element_type: &str, specs: &Value) -> Value {
    let Some(schema) = schema_for(element_type) else {
        return Value::Object(serde_json::Map::new());
    };

    let empty = serde_json::Map::new();
    let specs_map = specs.as_object().unwrap_or(&empty);
    let mut sanitized = serde_json::Map::new();

    for (group_name, node) in schema {
        let value = match specs_map.get(*group_name) {
            Some(data) => sanitize_node(node, data),
            None => Value::Null,
        };
        sanitized.insert(group_name.to_string(), value);
    }

    Value::Object(sanitized)
}

fn sanitize_node(node: &SchemaNode, data: &Value) -> Value {
    if data.is_null() {
        return Value::Null;
    }
    let Some(map) = data.as_object() else {
        return Value::Null;
    };

    match node {
        SchemaNode::Fields(fields) => {
            let mut out = serde_json::Map::new();
            for field in *fields {
                if let Some(value) = map.get(*field) {
                    out.insert(field.to_string(), value.clone());
                }
            }
            Value::Object(out)
        }
        SchemaNode::Sections(sections) => {
            let mut out = serde_json::Map::new();
            for (section_name, section_node) in sections {
                let value = match map.get(*section_name) {
                    Some(section_data) => sanitize_node(section_node, section_data),
                    None => Value::Null,
                };
                out.insert(section_name.to_string(), value);
            }
            Value::Object(out)
        }
    }
}

/// Completeness: fraction of schema leaf fields that are filled, in [0, 1]
pub fn completeness_score(element_type: &str, specs: &Value) -> f64 {
    let Some(schema) = schema_for(element_type) else {
        return 0.0;
    };

    let mut total = 0usize;
    let mut filled = 0usize;

    for (group_name, node) in schema {
        let group_data = specs.get(*group_name);
        count_fields(node, group_data, &mut total, &mut filled);
    }

    if total == 0 {
        0.0
    } else {
        filled as f64 / total as f64
    }
}

fn count_fields(node: &SchemaNode, data: Option<&Value>, total: &mut usize, filled: &mut usize) {
    match node {
        SchemaNode::Fields(fields) => {
            for field in *fields {
                *total += 1;
                if let Some(Value::Object(map)) = data {
                    if map.get(*field).map(|v| !v.is_null()).unwrap_or(false) {
                        *filled += 1;
                    }
                }
            }
        }
        SchemaNode::Sections(sections) => {
            for (section_name, section_node) in sections {
                let section_data = data
                    .and_then(|d| d.as_object())
                    .and_then(|m| m.get(*section_name));
                count_fields(section_node, section_data, total, filled);
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
