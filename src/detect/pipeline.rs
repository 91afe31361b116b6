//! Vector element detection pipeline
//!
//! Orchestrates the per-page flow: text extraction, line/arc recovery,
//! adaptive shape assembly, and text-shape association.

use crate::detect::assembler::{AdaptiveShapeAssembler, ShapeDetection};
use crate::detect::elements::{DetectedElement, DetectionSummary, ElementDetector};
use crate::error::Result;
use crate::pdf::drawings::{DrawingDetector, PageDrawings};
use crate::pdf::text::{TextExtraction, VectorTextExtractor};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Elements detected on one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageElements {
    pub page_number: u32,
    pub shapes: ShapeDetection,
    pub elements: Vec<DetectedElement>,
    pub text_count: usize,
    pub line_count: usize,
    pub arc_count: usize,
}

/// Complete detection result for a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub success: bool,
    pub file_path: String,
    pub total_pages: usize,
    pub pages: Vec<PageElements>,
    pub summary: DetectionSummary,
    pub error: Option<String>,
}

/// Runs the full vector-geometric detection pipeline
pub struct VectorElementPipeline {
    text_extractor: VectorTextExtractor,
    drawing_detector: DrawingDetector,
    assembler: AdaptiveShapeAssembler,
    element_detector: ElementDetector,
}

impl Default for VectorElementPipeline {
    fn default() -> Self {
        Self {
            text_extractor: VectorTextExtractor::default(),
            drawing_detector: DrawingDetector::default(),
            assembler: AdaptiveShapeAssembler::default(),
            element_detector: ElementDetector::default(),
        }
    }
}

impl VectorElementPipeline {
    pub fn new(
        text_extractor: VectorTextExtractor,
        drawing_detector: DrawingDetector,
        assembler: AdaptiveShapeAssembler,
        element_detector: ElementDetector,
    ) -> Self {
        Self {
            text_extractor,
            drawing_detector,
            assembler,
            element_detector,
        }
    }

    /// Process every page of a PDF file
    pub fn process_file(&self, file_path: &str) -> Result<DetectionResult> {
        info!("Starting vector element detection for: {}", file_path);

        let text_result = self.text_extractor.extract_from_file(file_path)?;
        let drawing_pages = self.drawing_detector.extract_from_file(file_path)?;

        let mut pages = Vec::new();
        let mut per_page_elements = Vec::new();

        for drawings in &drawing_pages {
            let page = self.process_page(&text_result, drawings);
            per_page_elements.push(page.elements.clone());
            pages.push(page);
        }

        let summary = ElementDetector::summarize(&per_page_elements);
        info!(
            "Detection complete: {} elements across {} pages",
            summary.total_elements, summary.pages_processed
        );

        Ok(DetectionResult {
            success: true,
            file_path: file_path.to_string(),
            total_pages: drawing_pages.len(),
            pages,
            summary,
            error: None,
        })
    }

    /// Process one page from already-extracted text and drawings
    pub fn process_page(
        &self,
        text_result: &TextExtraction,
        drawings: &PageDrawings,
    ) -> PageElements {
        let page_number = drawings.page_number;
        let empty = Vec::new();
        let text_instances = text_result
            .pages
            .iter()
            .find(|p| p.metadata.page_number == page_number)
            .map(|p| &p.text_instances)
            .unwrap_or(&empty);

        let shapes = self
            .assembler
            .detect_shapes(&drawings.lines, &drawings.arcs, page_number);

        let shape_refs: Vec<&crate::geometry::Shape> = shapes.all_shapes();
        let elements =
            self.element_detector
                .detect_page_elements(&shape_refs, text_instances, page_number);

        PageElements {
            page_number,
            text_count: text_instances.len(),
            line_count: drawings.lines.len(),
            arc_count: drawings.arcs.len(),
            shapes,
            elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{mm_to_pt, BoundingBox, Point};
    use crate::pdf::drawings::LineSegment;
    use crate::pdf::text::{CoordinateSystem, PageMetadata, PageText, TextInstance};

    fn text_extraction_with(instances: Vec<TextInstance>) -> TextExtraction {
        TextExtraction {
            success: true,
            file_path: "drawing.pdf".to_string(),
            total_pages: 1,
            pages: vec![PageText {
                metadata: PageMetadata {
                    page_number: 1,
                    width: 842.0,
                    height: 595.0,
                    rotation: 0,
                    coordinate_system: CoordinateSystem::Pdf,
                },
                text_instances: instances,
            }],
            info: Default::default(),
            statistics: Default::default(),
            errors: Vec::new(),
        }
    }

    fn label(text: &str, x: f64, y: f64) -> TextInstance {
        let bbox = BoundingBox::new(x - 6.0, y - 5.0, x + 6.0, y + 5.0);
        TextInstance {
            text: text.to_string(),
            center: Point::new(x, y),
            bbox,
            page_number: 1,
            font_name: "Arial".to_string(),
            font_size: 10.0,
            flags: 0,
            confidence: 1.0,
        }
    }

    fn rect_lines(x: f64, y: f64, w_mm: f64, h_mm: f64) -> Vec<LineSegment> {
        let w = mm_to_pt(w_mm);
        let h = mm_to_pt(h_mm);
        let line = |x0, y0, x1, y1| LineSegment {
            x0,
            y0,
            x1,
            y1,
            linewidth: 1.0,
            color: (0.0, 0.0, 0.0),
        };
        vec![
            line(x, y, x + w, y),
            line(x + w, y, x + w, y + h),
            line(x + w, y + h, x, y + h),
            line(x, y + h, x, y),
        ]
    }

    #[test]
    fn test_page_pipeline_detects_labeled_rectangle() {
        let pipeline = VectorElementPipeline::default();
        let lines = rect_lines(100.0, 100.0, 30.0, 10.0);
        let center_x = 100.0 + mm_to_pt(15.0);
        let center_y = 100.0 + mm_to_pt(5.0);

        let text = text_extraction_with(vec![label("C1", center_x, center_y)]);
        let drawings = PageDrawings {
            page_number: 1,
            lines,
            arcs: Vec::new(),
        };

        let page = pipeline.process_page(&text, &drawings);
        assert_eq!(page.elements.len(), 1);
        assert_eq!(page.elements[0].element_id, "C1");
        assert_eq!(page.shapes.rectangles.len(), 1);
    }

    #[test]
    fn test_page_pipeline_empty_page() {
        let pipeline = VectorElementPipeline::default();
        let text = text_extraction_with(Vec::new());
        let drawings = PageDrawings {
            page_number: 1,
            lines: Vec::new(),
            arcs: Vec::new(),
        };

        let page = pipeline.process_page(&text, &drawings);
        assert!(page.elements.is_empty());
        assert_eq!(page.shapes.total_shapes(), 0);
    }
}
