//! Kind-aware document chunking
//!
//! Text splits by a target token count with overlap, breaking on paragraph
//! or sentence boundaries where possible. Tables and drawing metadata become
//! one atomic chunk each; visual-element groups become one chunk per group
//! with a serialized spatial description.

use crate::extraction::unified::ExtractionResponse;
use crate::extraction::{ElementGroup, ExtractedTable};
use crate::rag::types::{estimate_tokens, Chunk, ChunkKind};
use uuid::Uuid;

/// Configuration for chunking
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target chunk size in tokens
    pub chunk_size: usize,
    /// Overlap between text chunks in tokens
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Deterministic, kind-aware chunker
pub struct Chunker {
    config: ChunkerConfig,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk a full extraction response for a document
    pub fn chunk_document(
        &self,
        document_id: Uuid,
        extraction: &ExtractionResponse,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut index: i64 = 0;

        // Text chunks
        for content in self.split_text(&extraction.text) {
            chunks.push(
                Chunk::new(document_id, index, ChunkKind::Text, content).with_metadata(
                    serde_json::json!({"chunk_type": "text"}),
                ),
            );
            index += 1;
        }

        // One atomic chunk per table
        for table in &extraction.tables {
            let chunk = Chunk::new(document_id, index, ChunkKind::Table, render_table_text(table))
                .with_page(table.page)
                .with_metadata(serde_json::json!({
                    "chunk_type": "table",
                    "table_type": table.table_type,
                    "caption": table.caption,
                }));
            chunks.push(chunk);
            index += 1;
        }

        // One chunk per visual element group
        if let Some(visual) = &extraction.visual_elements {
            for group in &visual.element_groups {
                let chunk = Chunk::new(
                    document_id,
                    index,
                    ChunkKind::VisualElementGroup,
                    render_group_text(group),
                )
                .with_page(group.page)
                .with_metadata(serde_json::json!({
                    "chunk_type": "visual_element_group",
                    "element_type": group.element_type,
                    "count": group.count,
                }));
                chunks.push(chunk);
                index += 1;
            }
        }

        // One atomic chunk for drawing metadata
        if let Some(metadata) = &extraction.drawing_metadata {
            if !metadata.is_empty() {
                let content = serde_json::to_string_pretty(metadata).unwrap_or_default();
                chunks.push(
                    Chunk::new(document_id, index, ChunkKind::DrawingMetadata, content)
                        .with_metadata(serde_json::json!({"chunk_type": "drawing_metadata"})),
                );
                index += 1;
            }
        }

        // Document summary as an atomic metadata chunk
        if !extraction.summary.is_empty() {
            chunks.push(
                Chunk::new(
                    document_id,
                    index,
                    ChunkKind::Metadata,
                    extraction.summary.clone(),
                )
                .with_metadata(serde_json::json!({"chunk_type": "metadata"})),
            );
        }

        chunks
    }

    /// Split plain text into overlapping chunks on friendly boundaries
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chunk_chars = self.config.chunk_size * 4;
        let overlap_chars = self.config.chunk_overlap * 4;

        if text.trim().is_empty() {
            return Vec::new();
        }
        if text.len() <= chunk_chars {
            return vec![text.to_string()];
        }

        let bytes_boundary = |s: &str, at: usize| -> usize {
            let mut i = at.min(s.len());
            while i > 0 && !s.is_char_boundary(i) {
                i -= 1;
            }
            i
        };

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < text.len() {
            let hard_end = bytes_boundary(text, start + chunk_chars);
            let window = &text[start..hard_end];

            let piece = if hard_end < text.len() {
                find_break(window)
            } else {
                window
            };

            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            // Always make progress, accounting for overlap
            let advance = piece.len().saturating_sub(overlap_chars).max(1);
            start += advance;
            // Round up to the next char boundary so progress is guaranteed
            while start < text.len() && !text.is_char_boundary(start) {
                start += 1;
            }
            if start >= text.len() {
                break;
            }
        }

        chunks
    }
}

/// Prefer a paragraph break, then a sentence ending, then a word boundary
fn find_break(window: &str) -> &str {
    if let Some(pos) = window.rfind("\n\n") {
        if pos > 0 {
            return &window[..pos];
        }
    }

    // Look for a sentence ending in the last 100 chars
    let search_start = window.len().saturating_sub(100);
    if let Some(pos) = window[search_start..].rfind(['.', '!', '?']) {
        return &window[..search_start + pos + 1];
    }

    if let Some(pos) = window.rfind(char::is_whitespace) {
        if pos > 0 {
            return &window[..pos];
        }
    }

    window
}

/// Serialize a table chunk: caption, headers, and pipe-joined rows
fn render_table_text(table: &ExtractedTable) -> String {
    let mut out = String::new();
    if !table.caption.is_empty() {
        out.push_str(&table.caption);
        out.push('\n');
    }
    out.push_str(&table.headers.join(" | "));
    out.push('\n');
    for row in &table.rows {
        out.push_str(&row.join(" | "));
        out.push('\n');
    }
    if !table.notes.is_empty() {
        out.push_str(&table.notes);
    }
    out.trim_end().to_string()
}

/// Serialize a visual element group: type, count, location, representatives
fn render_group_text(group: &ElementGroup) -> String {
    let mut out = format!("{} x{}", group.element_type, group.count);
    if let Some(center) = &group.cluster_center {
        out.push_str(&format!(" at ({}, {})", center.x, center.y));
    }
    if !group.spatial_description.is_empty() {
        out.push_str(&format!("\n{}", group.spatial_description));
    }
    for instance in group.elements.iter().take(3) {
        out.push('\n');
        out.push_str(&format!(
            "- {} {}",
            instance.element_id,
            if instance.specifications.is_empty() {
                instance.subtype.clone()
            } else {
                instance.specifications.clone()
            }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::PixelPoint;

    fn response_with_text(text: &str) -> ExtractionResponse {
        ExtractionResponse {
            text: text.to_string(),
            success: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.split_text("This is a short text.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "This is a short text.");
    }

    #[test]
    fn test_long_text_chunks_with_overlap() {
        let chunker = Chunker::new(ChunkerConfig {
            chunk_size: 25,
            chunk_overlap: 5,
        });
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let text = sentence.repeat(10);

        let chunks = chunker.split_text(&text);
        assert!(chunks.len() > 1, "long text should produce several chunks");
        // Every chunk respects the budget (100 chars for 25 tokens)
        for chunk in &chunks {
            assert!(chunk.len() <= 25 * 4 + 1);
        }
    }

    #[test]
    fn test_split_prefers_sentence_boundary() {
        let chunker = Chunker::new(ChunkerConfig {
            chunk_size: 20,
            chunk_overlap: 0,
        });
        let text = "First sentence here. Second sentence follows and keeps going on and on for a while longer.";
        let chunks = chunker.split_text(text);
        assert!(chunks[0].ends_with('.'), "chunk should end at a sentence: {:?}", chunks[0]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.split_text("").is_empty());
        assert!(chunker.split_text("   \n ").is_empty());
    }

    #[test]
    fn test_table_chunk_is_single_and_atomic() {
        let mut response = response_with_text("");
        response.tables.push(ExtractedTable {
            table_type: "schedule".to_string(),
            caption: "FASTENER SCHEDULE".to_string(),
            headers: vec!["MARK".into(), "QTY".into()],
            rows: (0..200)
                .map(|i| vec![format!("A{i}"), "1".to_string()])
                .collect(),
            position: String::new(),
            bounding_box: None,
            notes: String::new(),
            contains_reference_quantities: true,
            element_types_to_count: vec![],
            page: 2,
        });

        let chunker = Chunker::new(ChunkerConfig {
            chunk_size: 10,
            chunk_overlap: 2,
        });
        let chunks = chunker.chunk_document(Uuid::new_v4(), &response);

        // However large, the table stays one chunk
        let table_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::Table)
            .collect();
        assert_eq!(table_chunks.len(), 1);
        assert!(table_chunks[0].kind.is_atomic());
        assert_eq!(table_chunks[0].page_number, Some(2));
        assert!(table_chunks[0].content.contains("FASTENER SCHEDULE"));
    }

    #[test]
    fn test_visual_group_chunk() {
        let mut response = response_with_text("");
        response.visual_elements = Some(crate::extraction::VisualElements {
            element_groups: vec![ElementGroup {
                group_id: "group_001".to_string(),
                element_type: "HEX_BOLT_M8x20".to_string(),
                count: 15,
                cluster_center: Some(PixelPoint { x: 450, y: 620 }),
                spatial_description: "Cluster across top frame section".to_string(),
                elements: vec![],
                page: 1,
            }],
            validation: Default::default(),
        });

        let chunker = Chunker::default();
        let chunks = chunker.chunk_document(Uuid::new_v4(), &response);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::VisualElementGroup);
        assert!(chunks[0].content.contains("HEX_BOLT_M8x20 x15"));
        assert!(chunks[0].content.contains("(450, 620)"));
    }

    #[test]
    fn test_chunk_indexes_are_sequential() {
        let mut response = response_with_text("Some document body text.");
        response.summary = "A short drawing.".to_string();
        let mut metadata = serde_json::Map::new();
        metadata.insert("drawing_number".to_string(), serde_json::json!("DWG-1"));
        response.drawing_metadata = Some(metadata);

        let chunker = Chunker::default();
        let chunks = chunker.chunk_document(Uuid::new_v4(), &response);

        let indexes: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        let expected: Vec<i64> = (0..chunks.len() as i64).collect();
        assert_eq!(indexes, expected);
    }
}
