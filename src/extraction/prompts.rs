//! Multi-task prompts for unified extraction
//!
//! All prompts used by the unified extractor live here so they stay easy to
//! maintain and tune. A builder composes the requested task fragments into one
//! prompt and appends the strict JSON output contract.

use serde::{Deserialize, Serialize};

/// Types of extraction tasks that can be performed in one unified call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTask {
    Text,
    Layout,
    Tables,
    Entities,
    Summary,
    VisualElements,
    DrawingMetadata,
    All,
}

impl ExtractionTask {
    /// Expand ALL into the concrete task list
    pub fn expand(tasks: &[ExtractionTask]) -> Vec<ExtractionTask> {
        if tasks.contains(&ExtractionTask::All) {
            vec![
                ExtractionTask::Text,
                ExtractionTask::Layout,
                ExtractionTask::Tables,
                ExtractionTask::Entities,
                ExtractionTask::VisualElements,
                ExtractionTask::DrawingMetadata,
                ExtractionTask::Summary,
            ]
        } else {
            tasks.to_vec()
        }
    }
}

/// Collection of prompts for multi-task document extraction
pub struct MultiTaskPrompts;

impl MultiTaskPrompts {
    pub fn text_extraction_prompt() -> &'static str {
        r#"
1. TEXT CONTENT:
   - Extract all visible text in the document
   - Preserve paragraph structure and reading order
   - Include headers, footers, and captions
   - Maintain hierarchical structure (headings, subheadings, etc.)
   - Preserve bullet points and numbered lists
   - DO NOT include text from within tables in this section (tables are extracted separately)
"#
    }

    pub fn layout_analysis_prompt() -> &'static str {
        r#"
2. DOCUMENT LAYOUT:
   - Identify all content blocks in the document
   - For each block, specify:
     * Type: title, heading, paragraph, list, table, figure, caption, header, footer, title_block, drawing_area
     * Text content
     * Position: approximate location (top/middle/bottom, left/center/right)
     * Bounding box: {"x": left_px, "y": top_px, "width": width_px, "height": height_px}
     * Reading order: sequence number
   - Identify hierarchical relationships between blocks
   - Note any multi-column layouts
   - Distinguish between drawing area and annotation/specification areas
"#
    }

    pub fn table_extraction_prompt() -> &'static str {
        r#"
3. TABLES:
   - Extract all tables with their structure intact
   - For each table, include:
     * Table type: schedule, bill_of_materials, specifications, tolerance_table, general
     * Headers (column names) - preserve exact capitalization and spacing
     * All row data with EXACT values
     * Table caption/title if present
     * Position in document with bounding box coordinates
     * Any footnotes or annotations

   CRITICAL PRECISION REQUIREMENTS:
   - Maintain EXACT numerical values (2.50 is not 2.5, preserve all decimal places)
   - Preserve all units with values (25.4mm, 1.5 inches, 15kg - NEVER strip units)
   - Keep part numbers exactly as shown (ABC-123-XY, not abc123xy or ABC123XY)
   - Preserve empty cells vs zero values (they have different meanings)
   - Note which columns contain counts/quantities vs specifications
   - For schedule tables: identify the element types that need to be counted in the drawing
   - Preserve merged cells and complex cell structures
   - Handle nested headers and multi-level column groups

   ENGINEERING-SPECIFIC:
   - Bill of Materials (BOM): preserve item numbers, part numbers, quantities, descriptions, materials
   - Schedule tables: extract element types, specifications, required quantities
   - Tolerance tables: maintain precision of all numerical tolerances
   - Note if table contains reference quantities for validation against drawing elements
"#
    }

    pub fn entity_extraction_prompt() -> &'static str {
        r#"
4. ENTITIES:
   - Identify key entities in the document
   - For each entity, include:
     * Type: person, organization, location, date, number, monetary value,
              part_number, material_spec, measurement, standard_reference,
              component_type, quantity, tolerance, drawing_number
     * Value: the actual entity text (preserve exactly as written)
     * Context: surrounding text or section
     * Page number if available
     * Location: bounding box coordinates if visual entity

   ENGINEERING-SPECIFIC ENTITIES:
   - part_number: Alphanumeric codes (e.g., "ABC-123-XY", "DWG-45678")
   - material_spec: Material descriptions (e.g., "316 stainless steel", "Grade 8.8 steel")
   - measurement: Dimensions with units (e.g., "25.4mm", "1.5 inches")
   - standard_reference: Industry standards (e.g., "ISO 9001", "ASTM F568", "AS 1429")
   - component_type: Component descriptions (e.g., "M8 hex bolt", "6mm rivet")
   - quantity: Extract as integer WITH context (e.g., {"value": 15, "context": "M8 bolts in zone A"})
   - tolerance: Tolerance specifications (e.g., "+/-0.05mm", "H7/g6")
   - drawing_number: Drawing identification codes

   - Focus on domain-specific entities if apparent
   - Note relationships between entities when clear
   - Link quantities to their corresponding components
"#
    }

    pub fn summary_prompt() -> &'static str {
        r#"
5. SUMMARY:
   - Provide a concise summary of the document (3-5 sentences)
   - Capture the main points and purpose of the document
   - Highlight key findings or conclusions
   - Note document type and intended audience
   - Include important dates, numbers, or statistics
   - For technical drawings: summarize what is being depicted, main components, and purpose
"#
    }

    pub fn visual_element_extraction_prompt() -> &'static str {
        r#"
6. VISUAL ELEMENTS (For Drawings and Diagrams):
   - Identify ALL distinct visual elements (symbols, shapes, markers, annotations)
   - For each element instance, provide:
     * element_id: unique identifier for this specific element instance
     * type: bolt, rivet, fastener, weld_symbol, dimension_line, component, annotation, etc.
     * subtype: specific variant (e.g., "M8_hex_bolt", "6mm_rivet", "fillet_weld")
     * bounding_box: EXACT pixel coordinates {"x": left_px, "y": top_px, "width": width_px, "height": height_px}
     * center_point: {"x": center_x_px, "y": center_y_px} - use this for overlays
     * zone: spatial zone if grid present (e.g., "A-1") or quadrant (e.g., "top-left")
     * specifications: any visible specs (size, grade, material if labeled)
     * label: any text label or callout associated with this element
     * rotation: rotation angle if applicable (degrees)

   ELEMENT GROUPING:
   - Group identical/similar elements that are in close proximity
   - For each group, provide:
     * group_id: unique identifier for the group
     * element_type: type of elements in the group
     * count: EXACT number of elements in this group
     * elements: array of individual element instances with their coordinates
     * cluster_center: {"x": center_x_px, "y": center_y_px}
     * spatial_description: "cluster of 5 bolts in top-left corner"

   COUNTING RULES - CRITICAL:
   - Count ONLY elements visible in the drawing/diagram area
   - DO NOT count elements mentioned in tables, schedules, or text annotations
   - DO NOT count legend symbols or reference examples
   - Provide exact integer counts, NOT estimates or ranges
   - If an element is partially visible or unclear, mark as "uncertain" with note
   - Distinguish between identical elements at different locations

   SPATIAL RELATIONSHIPS:
   - Note element positions relative to major features
   - Identify patterns or arrays of elements (e.g., "linear array of 8 bolts along top edge")

   VALIDATION AGAINST SCHEDULES:
   - If schedule/BOM tables are present, list the element types they reference
   - These are the elements that MUST be counted in the drawing
"#
    }

    pub fn drawing_metadata_extraction_prompt() -> &'static str {
        r#"
7. DRAWING METADATA (For Engineering/Technical Drawings):
   - Extract all title block information:
     * drawing_number: Drawing identification code
     * revision: Current revision/version (letter or number)
     * sheet_number: Sheet number if multi-sheet drawing (e.g., "1 of 3")
     * drawing_title: Main title of the drawing
     * project_name: Project or assembly name if present
     * scale: Drawing scale (e.g., "1:2", "1:50", "NTS")
     * units: Measurement units (mm, inches, etc.)
     * projection_type: First angle, third angle, isometric, etc.
     * date: Drawing date or revision date
     * drawn_by: Author/drafter name
     * checked_by: Checker/reviewer name
     * approved_by: Approver name
     * company: Company name or logo text
     * drawing_standard: Standard followed (e.g., "ISO 128", "ASME Y14.5")

   - Extract general notes and specifications:
     * material_specifications: Overall material callouts
     * finish_specifications: Surface finish requirements
     * tolerance_notes: General tolerance notes
     * assembly_notes: Assembly instructions or notes
     * reference_drawings: Links to related drawings

   - Document characteristics:
     * drawing_type: part, assembly, detail, section, schematic, electrical, mechanical
     * complexity: simple, moderate, complex (based on element count and detail)
     * purpose: manufacturing, assembly, installation, maintenance, etc.
"#
    }

    pub fn output_format_instructions() -> &'static str {
        r#"
OUTPUT FORMAT:
Provide a JSON response with the following structure:
{
    "text": "Full extracted text content (excluding table data)...",

    "layout": [
        {
            "type": "title",
            "text": "Document Title",
            "position": "top-center",
            "bounding_box": {"x": 100, "y": 50, "width": 400, "height": 60},
            "reading_order": 1
        }
    ],

    "tables": [
        {
            "table_type": "schedule",
            "caption": "FASTENER SCHEDULE",
            "headers": ["MARK", "TYPE", "SIZE", "QUANTITY", "MATERIAL"],
            "rows": [
                ["A", "HEX BOLT", "M8x20", "15", "Grade 8.8 Steel"]
            ],
            "position": "bottom-left",
            "bounding_box": {"x": 50, "y": 1200, "width": 600, "height": 300},
            "notes": "All fasteners to be zinc plated",
            "contains_reference_quantities": true,
            "element_types_to_count": ["HEX BOLT M8x20"]
        }
    ],

    "entities": [
        {
            "type": "part_number",
            "value": "ABC-123-XY",
            "context": "Main assembly drawing number",
            "bounding_box": {"x": 150, "y": 100, "width": 120, "height": 20}
        }
    ],

    "visual_elements": {
        "element_groups": [
            {
                "group_id": "group_001",
                "element_type": "HEX_BOLT_M8x20",
                "count": 15,
                "cluster_center": {"x": 450, "y": 620},
                "spatial_description": "Cluster of 15 hex bolts across top frame section",
                "elements": [
                    {
                        "element_id": "bolt_001",
                        "type": "bolt",
                        "subtype": "M8_hex_bolt",
                        "center_point": {"x": 420, "y": 580},
                        "bounding_box": {"x": 415, "y": 575, "width": 10, "height": 10},
                        "zone": "top-left",
                        "specifications": "M8x20",
                        "label": "A",
                        "rotation": 0
                    }
                ]
            }
        ]
    },

    "drawing_metadata": {
        "drawing_number": "DWG-12345-A",
        "revision": "C",
        "sheet_number": "1 of 1",
        "drawing_title": "Frame Assembly - Main Structure",
        "scale": "1:10",
        "units": "mm",
        "drawing_type": "assembly",
        "general_notes": ["All dimensions in millimeters unless otherwise specified"]
    },

    "summary": "This assembly drawing depicts a support frame structure..."
}

CRITICAL REQUIREMENTS:
- Include only the sections that were requested in the analysis
- Ensure all JSON is valid and properly formatted
- All numerical coordinates must be integers (pixel values)
- All counts must be exact integers, never estimates or ranges
- Preserve units with all measurements
- Maintain exact capitalization and formatting for part numbers
- Bounding boxes must use image pixel coordinates (0,0 = top-left of image)
- For visual elements, EVERY instance must have precise center_point coordinates for overlay visualization
"#
    }

    /// Build a unified prompt for the requested tasks
    pub fn build_unified_prompt(tasks: &[ExtractionTask]) -> String {
        let mut prompt = String::from(
            r#"Analyze this document image and extract the following information.

IMPORTANT COORDINATE SYSTEM:
- All coordinates are in pixels relative to the image
- Origin (0,0) is at the top-left corner of the image
- X increases from left to right
- Y increases from top to bottom
- Provide exact integer pixel values for all coordinates

"#,
        );

        let expanded = ExtractionTask::expand(tasks);
        let mut sections = Vec::new();

        if expanded.contains(&ExtractionTask::Text) {
            sections.push(Self::text_extraction_prompt());
        }
        if expanded.contains(&ExtractionTask::Layout) {
            sections.push(Self::layout_analysis_prompt());
        }
        if expanded.contains(&ExtractionTask::Tables) {
            sections.push(Self::table_extraction_prompt());
        }
        if expanded.contains(&ExtractionTask::Entities) {
            sections.push(Self::entity_extraction_prompt());
        }
        if expanded.contains(&ExtractionTask::VisualElements) {
            sections.push(Self::visual_element_extraction_prompt());
        }
        if expanded.contains(&ExtractionTask::DrawingMetadata) {
            sections.push(Self::drawing_metadata_extraction_prompt());
        }
        if expanded.contains(&ExtractionTask::Summary) {
            sections.push(Self::summary_prompt());
        }

        prompt.push_str(&sections.join("\n"));
        prompt.push('\n');
        prompt.push_str(Self::output_format_instructions());
        prompt
    }

    /// Insert a specialized prompt after the coordinate preamble
    pub fn with_specialized_prompt(base_prompt: &str, specialized: &str) -> String {
        let lines: Vec<&str> = base_prompt.split('\n').collect();
        let mut out = Vec::with_capacity(lines.len() + 3);
        let mut inserted = false;

        for (i, line) in lines.iter().enumerate() {
            out.push(line.to_string());
            if !inserted && i > 0 && line.trim().is_empty() {
                out.push(format!("\n{}\n", specialized));
                inserted = true;
            }
        }
        out.join("\n")
    }
}

/// Specialized prompts for specific document types or domains
pub struct SpecializedPrompts;

impl SpecializedPrompts {
    pub fn engineering_drawing_prompt() -> &'static str {
        r#"
Analyze this engineering drawing with comprehensive extraction.

DRAWING METADATA:
- Drawing number, revision, sheet number
- Title block information (title, project, scale, units, dates, personnel)
- Drawing standard and projection type
- General notes and specifications

ELEMENTS & COUNTS:
- Identify ALL distinct visual elements (bolts, rivets, fasteners, components, symbols)
- For EACH element instance, provide EXACT pixel coordinates (center point and bounding box)
- Count ONLY elements visible in the drawing area (NOT in tables or legends)
- Provide exact integer counts for each element type
- Note element specifications (size, grade, material) from labels or callouts
- Group similar elements by proximity and type

TABLES & SCHEDULES:
- Extract ALL tables (BOM, schedules, specifications, tolerances)
- Maintain EXACT numerical precision
- Preserve units with ALL values (never strip units)
- Keep part numbers exactly as written
- For schedule tables: identify which elements need to be counted in the drawing
- Link schedule quantities to actual element counts for validation

VALIDATION:
- Cross-reference schedule/BOM quantities with actual element counts
- Flag discrepancies between specified and counted quantities
- Note any unclear or ambiguous elements

OUTPUT CRITICAL DATA:
- Element counts MUST be exact integers (not "several" or "multiple")
- Specifications MUST include units
- Coordinates MUST be exact pixels for overlay capability
- Part numbers preserved exactly
- Link elements to specifications in tables
"#
    }

    pub fn financial_document_prompt() -> &'static str {
        r#"
Analyze this financial document with special attention to:
- Financial tables with numerical data (maintain exact precision)
- Currency values and percentages
- Date ranges and fiscal periods
- Financial metrics and KPIs
- Footnotes and disclaimers

Extract all tables with exact numerical precision and maintain decimal places.
Identify financial entities such as company names, ticker symbols, and monetary values.
Preserve currency symbols and units with all values.
"#
    }

    pub fn scientific_document_prompt() -> &'static str {
        r#"
Analyze this scientific document with special attention to:
- Abstract and conclusions
- Methodology sections
- Results and data tables
- Figures and their captions
- Citations and references
- Technical terminology and definitions

Extract tables with precise numerical values and units.
Preserve mathematical formulas and equations.
Maintain exact notation for scientific measurements and uncertainties.
"#
    }

    pub fn legal_document_prompt() -> &'static str {
        r#"
Analyze this legal document with special attention to:
- Parties involved and their roles
- Dates, deadlines, and time periods
- Defined terms (often in quotes or bold)
- Numbered sections and clauses
- Signatures and attestations
- Legal citations and references

Extract any tables containing terms, conditions, or schedules.
Preserve the hierarchical structure of sections and subsections.
Maintain exact wording for defined terms and key clauses.
"#
    }
}

/// Utility functions for working with extraction prompts
pub struct PromptUtils;

impl PromptUtils {
    /// Recommended extraction tasks for a document-type tag
    pub fn tasks_for_document_type(doc_type: &str) -> Vec<ExtractionTask> {
        match doc_type {
            "engineering_drawing" => vec![
                ExtractionTask::DrawingMetadata,
                ExtractionTask::VisualElements,
                ExtractionTask::Tables,
                ExtractionTask::Entities,
                ExtractionTask::Layout,
                ExtractionTask::Text,
                ExtractionTask::Summary,
            ],
            "financial" => vec![
                ExtractionTask::Text,
                ExtractionTask::Tables,
                ExtractionTask::Entities,
                ExtractionTask::Layout,
                ExtractionTask::Summary,
            ],
            "scientific" => vec![
                ExtractionTask::Text,
                ExtractionTask::Layout,
                ExtractionTask::Tables,
                ExtractionTask::Entities,
                ExtractionTask::Summary,
            ],
            "legal" => vec![
                ExtractionTask::Text,
                ExtractionTask::Layout,
                ExtractionTask::Entities,
                ExtractionTask::Summary,
            ],
            _ => vec![
                ExtractionTask::Text,
                ExtractionTask::Layout,
                ExtractionTask::Summary,
            ],
        }
    }

    /// Append custom instructions to a base prompt
    pub fn add_custom_instructions(base_prompt: &str, custom_instructions: &str) -> String {
        format!(
            "{}\n\nADDITIONAL INSTRUCTIONS:\n{}",
            base_prompt, custom_instructions
        )
    }

    /// Prepend image dimension context for coordinate accuracy
    pub fn with_image_dimensions(base_prompt: &str, width: u32, height: u32) -> String {
        format!(
            "IMAGE DIMENSIONS:\n- Width: {} pixels\n- Height: {} pixels\n- All coordinates must be within these bounds\n{}",
            width, height, base_prompt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_expands() {
        let expanded = ExtractionTask::expand(&[ExtractionTask::All]);
        assert_eq!(expanded.len(), 7);
        assert!(!expanded.contains(&ExtractionTask::All));
    }

    #[test]
    fn test_unified_prompt_includes_requested_sections() {
        let prompt =
            MultiTaskPrompts::build_unified_prompt(&[ExtractionTask::Text, ExtractionTask::Tables]);
        assert!(prompt.contains("1. TEXT CONTENT"));
        assert!(prompt.contains("3. TABLES"));
        assert!(!prompt.contains("6. VISUAL ELEMENTS"));
        assert!(prompt.contains("OUTPUT FORMAT"));
        assert!(prompt.contains("top-left corner of the image"));
    }

    #[test]
    fn test_all_prompt_has_every_section() {
        let prompt = MultiTaskPrompts::build_unified_prompt(&[ExtractionTask::All]);
        for section in [
            "1. TEXT CONTENT",
            "2. DOCUMENT LAYOUT",
            "3. TABLES",
            "4. ENTITIES",
            "5. SUMMARY",
            "6. VISUAL ELEMENTS",
            "7. DRAWING METADATA",
        ] {
            assert!(prompt.contains(section), "missing section: {}", section);
        }
    }

    #[test]
    fn test_tasks_for_document_type() {
        let tasks = PromptUtils::tasks_for_document_type("engineering_drawing");
        assert!(tasks.contains(&ExtractionTask::VisualElements));
        assert!(tasks.contains(&ExtractionTask::DrawingMetadata));

        let default = PromptUtils::tasks_for_document_type("memo");
        assert_eq!(default.len(), 3);
    }

    #[test]
    fn test_specialized_prompt_insertion() {
        let base = MultiTaskPrompts::build_unified_prompt(&[ExtractionTask::Text]);
        let combined = MultiTaskPrompts::with_specialized_prompt(
            &base,
            SpecializedPrompts::engineering_drawing_prompt(),
        );
        assert!(combined.contains("ELEMENTS & COUNTS"));
        // Specialized content lands before the task sections
        let specialized_pos = combined.find("ELEMENTS & COUNTS").unwrap();
        let tasks_pos = combined.find("1. TEXT CONTENT").unwrap();
        assert!(specialized_pos < tasks_pos);
    }

    #[test]
    fn test_image_dimensions_prefix() {
        let prompt = PromptUtils::with_image_dimensions("BASE", 800, 1200);
        assert!(prompt.starts_with("IMAGE DIMENSIONS:"));
        assert!(prompt.contains("Width: 800 pixels"));
        assert!(prompt.ends_with("BASE"));
    }
}
