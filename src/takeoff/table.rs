//! Takeoff table wire format
//!
//! The extraction prompt asks the model for a pipe-delimited table with
//! exactly these 18 columns, `-` for unknown cells, and the literal token
//! `NO ELEMENTS` for a page with nothing to extract. Parsing locates the
//! header row, reads rows until a blank line or continuation sentinel, and
//! normalizes each row into a structured element with a small, explicit
//! grammar for reinforcement and quantities.

use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tracing::debug;

/// The 18-column table contract
pub const TABLE_COLUMNS: [&str; 18] = [
    "ID", "TYPE", "PAGE", "WIDTH", "LENGTH", "DEPTH", "QTY", "TOP_REINF", "BOT_REINF",
    "SIDE_REINF", "GRADE", "COVER", "FINISH", "LOCATION", "ZONE", "LEVEL", "NOTES", "TYPICAL",
];

/// Sentinel a page with no elements must return
pub const NO_ELEMENTS: &str = "NO ELEMENTS";

/// ID substrings that mark junk rows rather than real elements
const JUNK_PATTERNS: [&str; 21] = [
    "example", "sample", "typical", "note", "see", "refer", "drawing", "detail", "section",
    "plan", "elevation", "title", "legend", "key", "schedule", "table", "xxx", "???", "tbd",
    "various", "as shown",
];

/// One row of the takeoff table, cells exactly as in the wire format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeoffRow {
    pub cells: [String; 18],
}

impl TakeoffRow {
    pub fn get(&self, column: &str) -> &str {
        TABLE_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.cells[i].as_str())
            .unwrap_or("")
    }

    /// A cell's value, treating `-` and placeholders as absent
    pub fn value(&self, column: &str) -> Option<&str> {
        let cell = self.get(column).trim();
        if cell.is_empty() || matches!(cell, "-" | "_" | "." | "N/A" | "n/a" | "NA") {
            None
        } else {
            Some(cell)
        }
    }
}

/// Result of parsing one page response
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub no_elements: bool,
    pub rows: Vec<TakeoffRow>,
}

/// Render rows to the pipe-delimited wire format, header included
pub fn render_table(rows: &[TakeoffRow]) -> String {
    let mut out = String::new();
    out.push_str(&TABLE_COLUMNS.join("|"));
    for row in rows {
        out.push('\n');
        out.push_str(&row.cells.join("|"));
    }
    out
}

/// Parse a page response in the table wire format
///
/// `NO ELEMENTS` anywhere in the response means the page is empty. Otherwise
/// the header row is located and data rows are read until a blank line,
/// a separator, or a `CONTINUE:` sentinel (tolerated and ignored).
pub fn parse_table(response: &str) -> ParsedPage {
    if response.to_uppercase().contains(NO_ELEMENTS) {
        debug!("Page has no elements (NO ELEMENTS response)");
        return ParsedPage {
            no_elements: true,
            rows: Vec::new(),
        };
    }

    let lines: Vec<&str> = response.lines().collect();
    let header_index = lines.iter().position(|line| {
        let upper = line.to_uppercase();
        upper.contains("ID|TYPE")
    });

    let Some(header_index) = header_index else {
        debug!("No header line found in table response");
        return ParsedPage::default();
    };

    let mut rows = Vec::new();
    for line in &lines[header_index + 1..] {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("-----") {
            continue;
        }
        if trimmed.to_uppercase().contains("CONTINUE:") {
            continue;
        }

        let values: Vec<&str> = trimmed.split('|').collect();
        if values.len() < TABLE_COLUMNS.len() {
            continue;
        }

        let mut cells: [String; 18] = Default::default();
        for (i, cell) in cells.iter_mut().enumerate() {
            *cell = values[i].trim().to_string();
        }
        rows.push(TakeoffRow { cells });
    }

    ParsedPage {
        no_elements: false,
        rows,
    }
}

/// Validate that a row describes a real element rather than junk
pub fn is_valid_row(row: &TakeoffRow) -> bool {
    let Some(element_id) = row.value("ID") else {
        return false;
    };
    let Some(element_type) = row.value("TYPE") else {
        return false;
    };

    // Plain small integers are legend numbers, not element marks
    if element_id.chars().all(|c| c.is_ascii_digit()) && element_id.len() <= 3 {
        return false;
    }

    // Over-long ids are extracted prose, not marks
    if element_id.len() > 50 {
        return false;
    }

    let id_lower = element_id.to_lowercase();
    if JUNK_PATTERNS.iter().any(|junk| id_lower.contains(junk)) {
        return false;
    }

    if element_type.len() < 3 {
        return false;
    }

    // A real element states at least one of: a dimension, reinforcement,
    // or a concrete grade
    let has_dimension = ["WIDTH", "LENGTH", "DEPTH"]
        .iter()
        .any(|c| row.value(c).is_some());
    let has_reinforcement = ["TOP_REINF", "BOT_REINF", "SIDE_REINF"]
        .iter()
        .any(|c| row.value(c).is_some());
    let has_grade = row.value("GRADE").is_some();

    has_dimension || has_reinforcement || has_grade
}

fn bar_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]+\d+)@(\d+)$").expect("invalid bar pattern"))
}

fn fabric_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(SL\d+|F\d+)$").expect("invalid fabric pattern"))
}

/// Parse a reinforcement callout
///
/// Grammar, named alternatives:
///   bar     = bar_size '@' spacing     (e.g. "N16@200")
///   fabric  = 'SL' digits | 'F' digits (e.g. "SL92")
/// Anything else is kept as a fabric type verbatim.
pub fn parse_reinforcement(callout: &str) -> Value {
    if let Some(captures) = bar_pattern().captures(callout) {
        let spacing = captures[2].parse::<i64>().ok();
        return json!({
            "bar_size": &captures[1],
            "spacing_mm": spacing,
            "direction": "both_ways"
        });
    }

    if fabric_pattern().is_match(callout) {
        return json!({
            "fabric_type": callout,
            "direction": "both_ways"
        });
    }

    json!({
        "fabric_type": callout,
        "direction": "both_ways"
    })
}

/// Parse a quantity cell: a count, linear meters, or a raw value
pub fn parse_quantity(cell: &str) -> Value {
    if cell.chars().all(|c| c.is_ascii_digit()) {
        return json!({
            "count": cell.parse::<i64>().unwrap_or(0),
            "unit": "number"
        });
    }
    if cell.to_lowercase().contains('m') {
        return json!({
            "length": cell,
            "unit": "linear_meters"
        });
    }
    json!({ "value": cell })
}

/// Convert a valid row into specifications and extraction notes
///
/// Dimensions become integer millimeters; non-numeric dimension cells are
/// skipped. Cover is an integer when purely numeric, otherwise a description.
pub fn row_to_specifications(row: &TakeoffRow) -> (Value, Value) {
    let mut dimensions = serde_json::Map::new();
    for (column, field) in [
        ("WIDTH", "width_mm"),
        ("LENGTH", "length_mm"),
        ("DEPTH", "depth_mm"),
    ] {
        if let Some(cell) = row.value(column) {
            if let Ok(n) = cell.parse::<i64>() {
                dimensions.insert(field.to_string(), json!(n));
            }
        }
    }

    let mut reinforcement = serde_json::Map::new();
    for (column, section) in [
        ("TOP_REINF", "top"),
        ("BOT_REINF", "bottom"),
        ("SIDE_REINF", "side"),
    ] {
        if let Some(cell) = row.value(column) {
            reinforcement.insert(section.to_string(), parse_reinforcement(cell));
        }
    }

    let mut concrete = serde_json::Map::new();
    if let Some(grade) = row.value("GRADE") {
        concrete.insert("grade".to_string(), json!(grade));
    }
    if let Some(cover) = row.value("COVER") {
        match cover.parse::<i64>() {
            Ok(n) => concrete.insert("cover_mm".to_string(), json!(n)),
            Err(_) => concrete.insert("cover_description".to_string(), json!(cover)),
        };
    }

    let quantity = row
        .value("QTY")
        .map(parse_quantity)
        .unwrap_or_else(|| json!({}));

    let mut location = serde_json::Map::new();
    if let Some(description) = row.value("LOCATION") {
        location.insert("description".to_string(), json!(description));
    }
    if let Some(zone) = row.value("ZONE") {
        location.insert("zone".to_string(), json!(zone));
    }
    if let Some(level) = row.value("LEVEL") {
        location.insert("level".to_string(), json!(level));
    }

    let mut finish = serde_json::Map::new();
    if let Some(finish_type) = row.value("FINISH") {
        finish.insert("type".to_string(), json!(finish_type));
    }

    let specifications = json!({
        "dimensions": dimensions,
        "reinforcement": reinforcement,
        "concrete": concrete,
        "quantity": quantity,
        "location": location,
        "finish": finish
    });

    let page = row.value("PAGE").unwrap_or("1");
    let mut notes = serde_json::Map::new();
    notes.insert(
        "source_references".to_string(),
        json!([format!("Page {}", page)]),
    );
    notes.insert("missing_fields".to_string(), json!([]));
    notes.insert("assumptions_made".to_string(), json!([]));
    notes.insert("validation_warnings".to_string(), json!([]));
    if let Some(typical) = row.value("TYPICAL") {
        notes.insert("typical".to_string(), json!(typical));
    }
    if let Some(description) = row.value("NOTES") {
        notes.insert("description".to_string(), json!(description));
    }

    (specifications, Value::Object(notes))
}

/// The row's 1-indexed page number, defaulting to 1
pub fn row_page_number(row: &TakeoffRow) -> u32 {
    row.value("PAGE")
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(1)
}
