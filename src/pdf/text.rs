//! Vector text extraction with precise coordinates
//!
//! Interprets the page content stream's text operators directly, so every
//! text run comes back with its bounding box in page coordinates. Engineering
//! drawings rely on this precision to associate labels with shapes.

use crate::error::Result;
use crate::pdf::{
    decode_pdf_string, open_document, operand_f64, page_rotation, page_size, Matrix,
};
use lopdf::content::Content;
use lopdf::{Document, Object};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Glyph advance approximation as a fraction of font size
const AVG_GLYPH_WIDTH: f64 = 0.5;

/// Word grouping thresholds in PDF points
const WORD_GAP_X: f64 = 3.0;
const WORD_GAP_Y: f64 = 2.0;

/// Coordinate system for extracted positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSystem {
    /// PDF native, origin at bottom-left
    Pdf,
    /// Raster image convention, origin at top-left
    Image,
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self::Pdf
    }
}

/// A single text instance with its position and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextInstance {
    pub text: String,
    pub bbox: crate::geometry::BoundingBox,
    pub center: crate::geometry::Point,
    pub page_number: u32,
    pub font_name: String,
    pub font_size: f64,
    pub flags: u32,
    pub confidence: f64,
}

impl TextInstance {
    pub fn width(&self) -> f64 {
        self.bbox.width()
    }

    pub fn height(&self) -> f64 {
        self.bbox.height()
    }
}

/// Metadata for one extracted page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page_number: u32,
    pub width: f64,
    pub height: f64,
    pub rotation: i32,
    pub coordinate_system: CoordinateSystem,
}

impl PageMetadata {
    pub fn aspect_ratio(&self) -> f64 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// One page of extraction output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    pub metadata: PageMetadata,
    pub text_instances: Vec<TextInstance>,
}

/// Document-level metadata from the Info dictionary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
    pub creator: String,
    pub producer: String,
    pub page_count: usize,
}

/// Extraction statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextStatistics {
    pub total_text_instances: usize,
    pub average_font_size: f64,
    pub extraction_method: String,
}

/// Full text extraction result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextExtraction {
    pub success: bool,
    pub file_path: String,
    pub total_pages: usize,
    pub pages: Vec<PageText>,
    pub info: DocumentInfo,
    pub statistics: TextStatistics,
    pub errors: Vec<String>,
}

/// Configuration for vector text extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextExtractionConfig {
    /// Minimum text length to keep
    pub min_text_length: usize,

    /// Remove duplicate instances at the same position
    pub deduplicate: bool,

    /// Position tolerance for deduplication in points
    pub dedup_tolerance: f64,

    /// Output coordinate system
    pub coordinate_system: CoordinateSystem,

    /// Specific 1-indexed pages to extract (None = all)
    pub page_numbers: Option<Vec<u32>>,
}

impl Default for TextExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_length: 1,
            deduplicate: true,
            dedup_tolerance: 2.0,
            coordinate_system: CoordinateSystem::Pdf,
            page_numbers: None,
        }
    }
}

/// Extracts text with coordinates from PDF vector data
///
/// The primary pass emits one instance per show-text run. When a page yields
/// zero glyphs that way, a character-level fallback re-reads the page and
/// groups characters into words by proximity.
pub struct VectorTextExtractor {
    config: TextExtractionConfig,
}

impl Default for VectorTextExtractor {
    fn default() -> Self {
        Self::new(TextExtractionConfig::default())
    }
}

impl VectorTextExtractor {
    pub fn new(config: TextExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract text with coordinates from a PDF file
    pub fn extract_from_file(&self, file_path: &str) -> Result<TextExtraction> {
        info!("Starting vector text extraction from: {}", file_path);
        let doc = open_document(file_path)?;

        let pages: Vec<_> = doc.get_pages().into_iter().collect();
        let mut result = TextExtraction {
            success: true,
            file_path: file_path.to_string(),
            total_pages: pages.len(),
            pages: Vec::new(),
            info: document_info(&doc, pages.len()),
            statistics: TextStatistics {
                extraction_method: "operator_stream".to_string(),
                ..Default::default()
            },
            errors: Vec::new(),
        };

        for (page_number, page_id) in pages {
            if let Some(wanted) = &self.config.page_numbers {
                if !wanted.contains(&page_number) {
                    continue;
                }
            }

            match self.extract_page(&doc, page_number, page_id) {
                Ok(page) => result.pages.push(page),
                Err(e) => {
                    let msg = format!("Error processing page {}: {}", page_number, e);
                    warn!("{}", msg);
                    result.errors.push(msg);
                }
            }
        }

        self.finish_statistics(&mut result);
        Ok(result)
    }

    fn extract_page(
        &self,
        doc: &Document,
        page_number: u32,
        page_id: lopdf::ObjectId,
    ) -> Result<PageText> {
        let (width, height) = page_size(doc, page_id);
        let metadata = PageMetadata {
            page_number,
            width,
            height,
            rotation: page_rotation(doc, page_id),
            coordinate_system: self.config.coordinate_system,
        };

        let content_data = doc
            .get_page_content(page_id)
            .map_err(|e| crate::error::ExtractionError::Pdf(e.to_string()))?;
        let content = Content::decode(&content_data)
            .map_err(|e| crate::error::ExtractionError::Pdf(e.to_string()))?;

        // Primary pass: one instance per show-text run
        let mut instances = run_interpreter(&content, page_number, EmitMode::Runs);

        // Character-level fallback when the primary pass sees no glyphs
        if instances.is_empty() {
            debug!(
                "Page {} yielded no glyphs from run extraction, using character fallback",
                page_number
            );
            let chars = run_interpreter(&content, page_number, EmitMode::Chars);
            instances = group_chars_into_words(chars);
        }

        instances.retain(|ti| ti.text.len() >= self.config.min_text_length);

        if self.config.coordinate_system == CoordinateSystem::Image {
            for ti in &mut instances {
                flip_y(ti, height);
            }
        }

        if self.config.deduplicate {
            instances = deduplicate(instances, self.config.dedup_tolerance);
        }

        Ok(PageText {
            metadata,
            text_instances: instances,
        })
    }

    fn finish_statistics(&self, result: &mut TextExtraction) {
        let mut total = 0usize;
        let mut font_sizes = Vec::new();
        for page in &result.pages {
            total += page.text_instances.len();
            for ti in &page.text_instances {
                if ti.font_size > 0.0 {
                    font_sizes.push(ti.font_size);
                }
            }
        }
        result.statistics.total_text_instances = total;
        result.statistics.average_font_size = if font_sizes.is_empty() {
            0.0
        } else {
            font_sizes.iter().sum::<f64>() / font_sizes.len() as f64
        };
    }

    /// Find instances matching a text, optionally exact
    pub fn find_text_instances<'a>(
        result: &'a TextExtraction,
        search_text: &str,
        exact_match: bool,
    ) -> Vec<&'a TextInstance> {
        let needle = search_text.to_lowercase();
        result
            .pages
            .iter()
            .flat_map(|p| p.text_instances.iter())
            .filter(|ti| {
                let hay = ti.text.to_lowercase();
                if exact_match {
                    hay == needle
                } else {
                    hay.contains(&needle)
                }
            })
            .collect()
    }
}

/// Flip an instance's Y coordinates against the page height
fn flip_y(ti: &mut TextInstance, page_height: f64) {
    let (y0, y1) = (ti.bbox.y0, ti.bbox.y1);
    ti.bbox.y0 = page_height - y1;
    ti.bbox.y1 = page_height - y0;
    ti.center.y = page_height - ti.center.y;
}

/// Deduplicate instances whose quantized centers and text are equal
///
/// Some PDFs render bold text as overstrokes; this keeps one instance per
/// position. Idempotent by construction.
fn deduplicate(instances: Vec<TextInstance>, tolerance: f64) -> Vec<TextInstance> {
    let mut seen: HashSet<(i64, i64, String)> = HashSet::new();
    let mut unique = Vec::with_capacity(instances.len());

    for ti in instances {
        let key = (
            (ti.center.x / tolerance).round() as i64,
            (ti.center.y / tolerance).round() as i64,
            ti.text.clone(),
        );
        if seen.insert(key) {
            unique.push(ti);
        }
    }
    unique
}

/// Group character instances into words by proximity
///
/// A character joins the current word while the horizontal gap stays within
/// 3 pt and the vertical offset within 2 pt; otherwise a new word starts.
fn group_chars_into_words(mut chars: Vec<TextInstance>) -> Vec<TextInstance> {
    if chars.is_empty() {
        return chars;
    }

    chars.sort_by(|a, b| {
        (a.bbox.y0, a.bbox.x0)
            .partial_cmp(&(b.bbox.y0, b.bbox.x0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut words: Vec<TextInstance> = Vec::new();
    let mut current: Option<TextInstance> = None;

    for ch in chars {
        if ch.text.trim().is_empty() {
            if let Some(word) = current.take() {
                words.push(word);
            }
            continue;
        }

        match current.as_mut() {
            None => current = Some(ch),
            Some(word) => {
                let horizontal_gap = ch.bbox.x0 - word.bbox.x1;
                let vertical_gap = (ch.bbox.y0 - word.bbox.y0).abs();

                if horizontal_gap < WORD_GAP_X && vertical_gap < WORD_GAP_Y {
                    word.text.push_str(&ch.text);
                    word.bbox.x1 = ch.bbox.x1;
                    word.bbox.y1 = word.bbox.y1.max(ch.bbox.y1);
                    word.center = word.bbox.center();
                } else {
                    words.push(current.take().unwrap());
                    current = Some(ch);
                }
            }
        }
    }

    if let Some(word) = current {
        words.push(word);
    }
    words
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitMode {
    /// One instance per show-text run (primary)
    Runs,
    /// One instance per character (fallback input to word grouping)
    Chars,
}

/// Text-operator interpreter state
struct TextState {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_name: String,
    font_size: f64,
    leading: f64,
    in_text: bool,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_name: String::new(),
            font_size: 0.0,
            leading: 0.0,
            in_text: false,
        }
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        let translate = Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        };
        self.line_matrix = translate.multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }
}

/// Walk the content stream and emit text instances
fn run_interpreter(content: &Content, page_number: u32, mode: EmitMode) -> Vec<TextInstance> {
    let mut state = TextState::new();
    let mut instances = Vec::new();

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm),
            "Q" => {
                if let Some(m) = state.ctm_stack.pop() {
                    state.ctm = m;
                }
            }
            "cm" => {
                let v: Vec<f64> = operands.iter().filter_map(operand_f64).collect();
                if v.len() == 6 {
                    let m = Matrix {
                        a: v[0],
                        b: v[1],
                        c: v[2],
                        d: v[3],
                        e: v[4],
                        f: v[5],
                    };
                    state.ctm = m.multiply(&state.ctm);
                }
            }
            "BT" => {
                state.in_text = true;
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "ET" => state.in_text = false,
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    state.font_name = String::from_utf8_lossy(name).to_string();
                }
                if let Some(size) = operands.get(1).and_then(operand_f64) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(l) = operands.first().and_then(operand_f64) {
                    state.leading = l;
                }
            }
            "Td" => {
                let v: Vec<f64> = operands.iter().filter_map(operand_f64).collect();
                if v.len() == 2 {
                    state.next_line(v[0], v[1]);
                }
            }
            "TD" => {
                let v: Vec<f64> = operands.iter().filter_map(operand_f64).collect();
                if v.len() == 2 {
                    state.leading = -v[1];
                    state.next_line(v[0], v[1]);
                }
            }
            "Tm" => {
                let v: Vec<f64> = operands.iter().filter_map(operand_f64).collect();
                if v.len() == 6 {
                    state.text_matrix = Matrix {
                        a: v[0],
                        b: v[1],
                        c: v[2],
                        d: v[3],
                        e: v[4],
                        f: v[5],
                    };
                    state.line_matrix = state.text_matrix;
                }
            }
            "T*" => {
                let leading = state.leading;
                state.next_line(0.0, -leading);
            }
            "Tj" | "'" => {
                if op.operator == "'" {
                    let leading = state.leading;
                    state.next_line(0.0, -leading);
                }
                if let Some(Object::String(bytes, _)) = operands.first() {
                    show_text(
                        &decode_pdf_string(bytes),
                        &mut state,
                        page_number,
                        mode,
                        &mut instances,
                    );
                }
            }
            "\"" => {
                let leading = state.leading;
                state.next_line(0.0, -leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    show_text(
                        &decode_pdf_string(bytes),
                        &mut state,
                        page_number,
                        mode,
                        &mut instances,
                    );
                }
            }
            "TJ" => {
                if let Some(Object::Array(parts)) = operands.first() {
                    for part in parts {
                        match part {
                            Object::String(bytes, _) => show_text(
                                &decode_pdf_string(bytes),
                                &mut state,
                                page_number,
                                mode,
                                &mut instances,
                            ),
                            // Kerning adjustments shift the pen in thousandths of font size
                            Object::Integer(_) | Object::Real(_) => {
                                if let Some(adj) = operand_f64(part) {
                                    let shift = -adj / 1000.0 * state.font_size;
                                    let translate = Matrix {
                                        e: shift,
                                        f: 0.0,
                                        ..Matrix::IDENTITY
                                    };
                                    state.text_matrix = translate.multiply(&state.text_matrix);
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }

    instances
}

/// Emit instances for one show-text run and advance the text matrix
fn show_text(
    text: &str,
    state: &mut TextState,
    page_number: u32,
    mode: EmitMode,
    out: &mut Vec<TextInstance>,
) {
    if !state.in_text && mode == EmitMode::Runs {
        return;
    }

    let font_size = if state.font_size > 0.0 {
        state.font_size
    } else {
        10.0
    };
    let device = state.text_matrix.multiply(&state.ctm);
    let scale = device.scale().max(f64::MIN_POSITIVE);
    let effective_size = font_size * scale;

    let emit = |text: &str, x: f64, y: f64, width: f64, out: &mut Vec<TextInstance>| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let bbox = crate::geometry::BoundingBox::new(x, y, x + width, y + effective_size);
        out.push(TextInstance {
            text: trimmed.to_string(),
            center: bbox.center(),
            bbox,
            page_number,
            font_name: state.font_name.clone(),
            font_size: effective_size,
            flags: 0,
            confidence: if mode == EmitMode::Runs { 1.0 } else { 0.95 },
        });
    };

    match mode {
        EmitMode::Runs => {
            let (x, y) = device.apply(0.0, 0.0);
            let width = text.chars().count() as f64 * AVG_GLYPH_WIDTH * effective_size;
            emit(text, x, y, width, out);
        }
        EmitMode::Chars => {
            let char_width = AVG_GLYPH_WIDTH * effective_size;
            for (i, ch) in text.chars().enumerate() {
                let (x, y) = device.apply(i as f64 * AVG_GLYPH_WIDTH * font_size, 0.0);
                emit(&ch.to_string(), x, y, char_width, out);
            }
        }
    }

    // Advance the pen past the run
    let advance = text.chars().count() as f64 * AVG_GLYPH_WIDTH * font_size;
    let translate = Matrix {
        e: advance,
        f: 0.0,
        ..Matrix::IDENTITY
    };
    state.text_matrix = translate.multiply(&state.text_matrix);
}

fn document_info(doc: &Document, page_count: usize) -> DocumentInfo {
    let mut info = DocumentInfo {
        page_count,
        ..Default::default()
    };

    if let Ok(Object::Reference(id)) = doc.trailer.get(b"Info") {
        if let Ok(dict) = doc.get_dictionary(*id) {
            let read = |key: &[u8]| -> String {
                match dict.get(key) {
                    Ok(Object::String(bytes, _)) => decode_pdf_string(bytes),
                    _ => String::new(),
                }
            };
            info.title = read(b"Title");
            info.author = read(b"Author");
            info.creator = read(b"Creator");
            info.producer = read(b"Producer");
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, Point};

    fn instance(text: &str, x: f64, y: f64) -> TextInstance {
        let bbox = BoundingBox::new(x, y, x + 10.0, y + 10.0);
        TextInstance {
            text: text.to_string(),
            center: bbox.center(),
            bbox,
            page_number: 1,
            font_name: "Helvetica".to_string(),
            font_size: 10.0,
            flags: 0,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_deduplication() {
        let instances = vec![
            instance("C1", 100.0, 100.0),
            instance("C1", 100.5, 100.5), // overstrike of the same label
            instance("C1", 300.0, 100.0), // genuinely elsewhere
            instance("C2", 100.0, 100.0), // different text, same spot
        ];

        let unique = deduplicate(instances, 2.0);
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_deduplication_idempotent() {
        let instances = vec![
            instance("C1", 100.0, 100.0),
            instance("C1", 100.4, 100.1),
            instance("B2", 50.0, 70.0),
        ];

        let once = deduplicate(instances, 2.0);
        let twice = deduplicate(once.clone(), 2.0);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.center, b.center);
        }
    }

    #[test]
    fn test_word_grouping_joins_close_chars() {
        let chars = vec![
            instance("C", 100.0, 100.0),
            instance("1", 111.0, 100.0), // 1pt gap after the 10pt-wide 'C'
            instance("B", 200.0, 100.0), // far away, new word
        ];

        let words = group_chars_into_words(chars);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "C1");
        assert_eq!(words[1].text, "B");
    }

    #[test]
    fn test_word_grouping_splits_on_vertical_gap() {
        let chars = vec![instance("A", 100.0, 100.0), instance("B", 111.0, 105.0)];

        let words = group_chars_into_words(chars);
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn test_y_flip() {
        let mut ti = instance("C1", 100.0, 100.0);
        let original_center = ti.center;
        flip_y(&mut ti, 800.0);
        assert_eq!(ti.center.y, 800.0 - original_center.y);
        assert!(ti.bbox.y0 <= ti.bbox.y1);

        // Flipping back restores the original
        flip_y(&mut ti, 800.0);
        assert_eq!(ti.center, original_center);
    }

    #[test]
    fn test_empty_page_is_not_an_error() {
        // An empty char list groups into an empty word list
        let words = group_chars_into_words(Vec::new());
        assert!(words.is_empty());
    }

    #[test]
    fn test_find_text_instances() {
        let extraction = TextExtraction {
            success: true,
            file_path: "test.pdf".to_string(),
            total_pages: 1,
            pages: vec![PageText {
                metadata: PageMetadata {
                    page_number: 1,
                    width: 612.0,
                    height: 792.0,
                    rotation: 0,
                    coordinate_system: CoordinateSystem::Pdf,
                },
                text_instances: vec![instance("C1", 10.0, 10.0), instance("C12", 50.0, 10.0)],
            }],
            info: DocumentInfo::default(),
            statistics: TextStatistics::default(),
            errors: Vec::new(),
        };

        let exact = VectorTextExtractor::find_text_instances(&extraction, "C1", true);
        assert_eq!(exact.len(), 1);

        let contains = VectorTextExtractor::find_text_instances(&extraction, "C1", false);
        assert_eq!(contains.len(), 2);
    }

    #[test]
    fn test_interpreter_reads_simple_stream() {
        let content = Content {
            operations: vec![
                lopdf::content::Operation::new("BT", vec![]),
                lopdf::content::Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                ),
                lopdf::content::Operation::new(
                    "Td",
                    vec![Object::Integer(100), Object::Integer(700)],
                ),
                lopdf::content::Operation::new(
                    "Tj",
                    vec![Object::String(
                        b"C1".to_vec(),
                        lopdf::StringFormat::Literal,
                    )],
                ),
                lopdf::content::Operation::new("ET", vec![]),
            ],
        };

        let instances = run_interpreter(&content, 1, EmitMode::Runs);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].text, "C1");
        assert!((instances[0].bbox.x0 - 100.0).abs() < 1e-9);
        assert!((instances[0].bbox.y0 - 700.0).abs() < 1e-9);
        assert!((instances[0].font_size - 12.0).abs() < 1e-9);
    }
}
