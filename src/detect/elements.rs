//! Element detection from shapes and text
//!
//! Associates text labels with nearby shapes to produce detected elements.
//! A label counts as an element ID when its font size, length, and pattern
//! all look like a drawing callout rather than prose.

use crate::geometry::{mm_to_pt, Shape};
use crate::pdf::text::TextInstance;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Where the text sits relative to its shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    Inside,
    Near,
}

/// Classified element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Column,
    Beam,
    Footing,
    Slab,
    Wall,
    BoredPier,
    Fastener,
    Unknown,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Column => "column",
            ElementType::Beam => "beam",
            ElementType::Footing => "footing",
            ElementType::Slab => "slab",
            ElementType::Wall => "wall",
            ElementType::BoredPier => "bored_pier",
            ElementType::Fastener => "fastener",
            ElementType::Unknown => "unknown",
        }
    }
}

/// An ID pattern with the element type it hints at
struct ElementPattern {
    regex: Regex,
    element_type: ElementType,
}

/// Domain table of element-ID patterns
fn element_patterns() -> &'static Vec<ElementPattern> {
    static PATTERNS: OnceLock<Vec<ElementPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let make = |pattern: &str, element_type| ElementPattern {
            regex: Regex::new(pattern).expect("invalid element pattern"),
            element_type,
        };
        vec![
            make(r"^C\d{1,3}$", ElementType::Column),
            make(r"^B\d{1,3}$", ElementType::Beam),
            make(r"^F\d{1,3}$", ElementType::Footing),
            make(r"^S\d{1,3}$", ElementType::Slab),
            make(r"^W\d{1,3}$", ElementType::Wall),
            make(r"^BP\d{1,3}$", ElementType::BoredPier),
            make(r"^M\d{1,2}(x\d{1,3})?$", ElementType::Fastener),
            // Generic mark: 1-3 letters followed by 1-3 digits
            make(r"^[A-Z]{1,3}\d{1,3}$", ElementType::Unknown),
        ]
    })
}

/// Classify an element ID string by the pattern table
pub fn classify_element_id(element_id: &str) -> ElementType {
    for pattern in element_patterns() {
        if pattern.regex.is_match(element_id) {
            return pattern.element_type;
        }
    }
    ElementType::Unknown
}

/// Whether the text matches any element-ID pattern
pub fn matches_element_pattern(text: &str) -> bool {
    element_patterns().iter().any(|p| p.regex.is_match(text))
}

/// Configuration for element detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDetectionConfig {
    /// Confidence when the text center lies inside the shape
    pub inside_shape_confidence: f64,

    /// Maximum distance for a "near" association in millimeters
    pub near_threshold_mm: f64,

    /// Base confidence for near associations
    pub near_confidence_base: f64,

    /// Font size range for element labels in points
    pub min_text_font_size: f64,
    pub max_text_font_size: f64,

    /// Minimum confidence to include an element
    pub min_element_confidence: f64,
}

impl Default for ElementDetectionConfig {
    fn default() -> Self {
        Self {
            inside_shape_confidence: 1.0,
            near_threshold_mm: 10.0,
            near_confidence_base: 0.7,
            min_text_font_size: 8.0,
            max_text_font_size: 20.0,
            min_element_confidence: 0.5,
        }
    }
}

/// A text-shape association candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextShapeAssociation {
    pub text: String,
    pub font_size: f64,
    pub position: TextPosition,
    pub distance: f64,
    pub confidence: f64,
}

/// A detected element: a shape with its best label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedElement {
    pub element_id: String,
    pub element_type: ElementType,
    pub location: crate::geometry::Point,
    pub shape: Shape,
    /// Sorted by confidence descending; the first entry is the primary
    pub associations: Vec<TextShapeAssociation>,
    pub page_number: u32,
    pub confidence: f64,
}

/// One occurrence in the summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementOccurrence {
    pub page_number: u32,
    pub location: crate::geometry::Point,
    pub confidence: f64,
}

/// Aggregate counts across pages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub total_elements: usize,
    pub unique_element_ids: usize,
    /// Per element ID: every occurrence, ordered by page
    pub element_counts: BTreeMap<String, Vec<ElementOccurrence>>,
    /// Per element type: total count
    pub element_types: BTreeMap<ElementType, usize>,
    pub pages_processed: usize,
}

/// Detects elements by pairing shapes with validated text labels
pub struct ElementDetector {
    config: ElementDetectionConfig,
}

impl Default for ElementDetector {
    fn default() -> Self {
        Self::new(ElementDetectionConfig::default())
    }
}

impl ElementDetector {
    pub fn new(config: ElementDetectionConfig) -> Self {
        Self { config }
    }

    /// Detect elements on one page from its shapes and text instances
    pub fn detect_page_elements(
        &self,
        shapes: &[&Shape],
        text_instances: &[TextInstance],
        page_number: u32,
    ) -> Vec<DetectedElement> {
        debug!(
            "Page {}: {} shapes, {} text instances",
            page_number,
            shapes.len(),
            text_instances.len()
        );

        let mut elements = Vec::new();

        for shape in shapes {
            let associations = self.find_text_associations(shape, text_instances);
            if associations.is_empty() {
                continue;
            }

            let primary = &associations[0];
            let confidence = primary.confidence;
            if confidence < self.config.min_element_confidence {
                continue;
            }

            let element_id = primary.text.clone();
            elements.push(DetectedElement {
                element_type: classify_element_id(&element_id),
                element_id,
                location: shape.center(),
                shape: (*shape).clone(),
                associations,
                page_number,
                confidence,
            });
        }

        info!("Page {}: found {} elements", page_number, elements.len());
        elements
    }

    /// Find candidate associations for a shape, sorted best-first
    fn find_text_associations(
        &self,
        shape: &Shape,
        text_instances: &[TextInstance],
    ) -> Vec<TextShapeAssociation> {
        let near_threshold = mm_to_pt(self.config.near_threshold_mm);
        let mut associations = Vec::new();

        for ti in text_instances {
            if !self.is_valid_element_text(ti) {
                continue;
            }

            let distance = shape.distance_to_point(&ti.center);
            let (position, confidence) = if shape.contains_point(&ti.center) {
                (TextPosition::Inside, self.config.inside_shape_confidence)
            } else if distance <= near_threshold {
                (
                    TextPosition::Near,
                    self.config.near_confidence_base * (1.0 - distance / near_threshold),
                )
            } else {
                continue;
            };

            associations.push(TextShapeAssociation {
                text: ti.text.clone(),
                font_size: ti.font_size,
                position,
                distance,
                confidence,
            });
        }

        // Best first; ties prefer inside, then smaller font (callouts beat
        // titles), then lexicographic text
        associations.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| match (a.position, b.position) {
                    (TextPosition::Inside, TextPosition::Near) => std::cmp::Ordering::Less,
                    (TextPosition::Near, TextPosition::Inside) => std::cmp::Ordering::Greater,
                    _ => std::cmp::Ordering::Equal,
                })
                .then_with(|| {
                    a.font_size
                        .partial_cmp(&b.font_size)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.text.cmp(&b.text))
        });

        associations
    }

    /// Validate that a text instance could be an element ID
    fn is_valid_element_text(&self, ti: &TextInstance) -> bool {
        let text = ti.text.trim();

        if ti.font_size < self.config.min_text_font_size
            || ti.font_size > self.config.max_text_font_size
        {
            return false;
        }

        // Element IDs are short single tokens
        if text.contains(' ') || text.len() > 10 {
            return false;
        }

        matches_element_pattern(text)
    }

    /// Aggregate per-page elements into a summary
    pub fn summarize(pages: &[Vec<DetectedElement>]) -> DetectionSummary {
        let mut summary = DetectionSummary {
            pages_processed: pages.len(),
            ..Default::default()
        };

        for page in pages {
            for element in page {
                summary.total_elements += 1;
                summary
                    .element_counts
                    .entry(element.element_id.clone())
                    .or_default()
                    .push(ElementOccurrence {
                        page_number: element.page_number,
                        location: element.location,
                        confidence: element.confidence,
                    });
                *summary.element_types.entry(element.element_type).or_insert(0) += 1;
            }
        }

        summary.unique_element_ids = summary.element_counts.len();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, Point, ShapeStyle};

    fn text_at(text: &str, x: f64, y: f64, font_size: f64) -> TextInstance {
        let bbox = BoundingBox::new(x - 5.0, y - 5.0, x + 5.0, y + 5.0);
        TextInstance {
            text: text.to_string(),
            center: Point::new(x, y),
            bbox,
            page_number: 1,
            font_name: "Helvetica".to_string(),
            font_size,
            flags: 0,
            confidence: 1.0,
        }
    }

    fn circle_at(x: f64, y: f64, radius: f64) -> Shape {
        Shape::circle(Point::new(x, y), radius, ShapeStyle::default(), 1).unwrap()
    }

    #[test]
    fn test_pattern_classification() {
        assert_eq!(classify_element_id("C1"), ElementType::Column);
        assert_eq!(classify_element_id("B12"), ElementType::Beam);
        assert_eq!(classify_element_id("BP3"), ElementType::BoredPier);
        assert_eq!(classify_element_id("M8x20"), ElementType::Fastener);
        assert_eq!(classify_element_id("XYZ99"), ElementType::Unknown);
        assert!(!matches_element_pattern("hello world"));
        assert!(!matches_element_pattern("note"));
    }

    #[test]
    fn test_inside_association() {
        let detector = ElementDetector::default();
        let shape = circle_at(100.0, 100.0, 30.0);
        let texts = vec![text_at("C1", 100.0, 100.0, 10.0)];

        let elements = detector.detect_page_elements(&[&shape], &texts, 1);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].element_id, "C1");
        assert_eq!(elements[0].element_type, ElementType::Column);
        assert_eq!(elements[0].confidence, 1.0);
        assert_eq!(elements[0].associations[0].position, TextPosition::Inside);
    }

    #[test]
    fn test_near_association_confidence_decays() {
        let detector = ElementDetector::default();
        let shape = circle_at(100.0, 100.0, 10.0);
        // 5pt outside the circle boundary, well within the ~28.3pt threshold
        let texts = vec![text_at("C2", 115.0, 100.0, 10.0)];

        let elements = detector.detect_page_elements(&[&shape], &texts, 1);
        assert_eq!(elements.len(), 1);
        let confidence = elements[0].confidence;
        let expected = 0.7 * (1.0 - 5.0 / mm_to_pt(10.0));
        assert!((confidence - expected).abs() < 1e-9);
        assert_eq!(elements[0].associations[0].position, TextPosition::Near);
    }

    #[test]
    fn test_far_text_discarded() {
        let detector = ElementDetector::default();
        let shape = circle_at(100.0, 100.0, 10.0);
        let texts = vec![text_at("C3", 300.0, 100.0, 10.0)];

        let elements = detector.detect_page_elements(&[&shape], &texts, 1);
        assert!(elements.is_empty());
    }

    #[test]
    fn test_font_size_validation() {
        let detector = ElementDetector::default();
        let shape = circle_at(100.0, 100.0, 30.0);
        // Title-sized text inside the shape is not a callout
        let texts = vec![text_at("C1", 100.0, 100.0, 36.0)];

        let elements = detector.detect_page_elements(&[&shape], &texts, 1);
        assert!(elements.is_empty());
    }

    #[test]
    fn test_primary_is_highest_confidence() {
        let detector = ElementDetector::default();
        let shape = circle_at(100.0, 100.0, 30.0);
        let texts = vec![
            text_at("B7", 140.0, 100.0, 10.0), // near
            text_at("C1", 100.0, 100.0, 10.0), // inside, wins
        ];

        let elements = detector.detect_page_elements(&[&shape], &texts, 1);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].element_id, "C1");
        assert_eq!(elements[0].associations.len(), 2);
        assert!(elements[0].associations[0].confidence >= elements[0].associations[1].confidence);
    }

    #[test]
    fn test_tie_break_smaller_font_wins() {
        let detector = ElementDetector::default();
        let shape = circle_at(100.0, 100.0, 30.0);
        // Both inside with confidence 1.0; the smaller font should be primary
        let texts = vec![
            text_at("W9", 90.0, 100.0, 14.0),
            text_at("C4", 110.0, 100.0, 9.0),
        ];

        let elements = detector.detect_page_elements(&[&shape], &texts, 1);
        assert_eq!(elements[0].element_id, "C4");
    }

    #[test]
    fn test_min_confidence_filter() {
        let config = ElementDetectionConfig {
            min_element_confidence: 0.6,
            ..Default::default()
        };
        let detector = ElementDetector::new(config);
        let shape = circle_at(100.0, 100.0, 10.0);
        // Near association starts at 0.7 base and decays below 0.6
        let texts = vec![text_at("C2", 125.0, 100.0, 10.0)];

        let elements = detector.detect_page_elements(&[&shape], &texts, 1);
        assert!(elements.is_empty());
    }

    #[test]
    fn test_summary_aggregation() {
        let detector = ElementDetector::default();
        let shape1 = circle_at(100.0, 100.0, 30.0);
        let shape2 = circle_at(300.0, 100.0, 30.0);
        let shape3 = circle_at(500.0, 100.0, 30.0);

        let page1 = detector.detect_page_elements(
            &[&shape1, &shape2],
            &[
                text_at("C1", 100.0, 100.0, 10.0),
                text_at("C1", 300.0, 100.0, 10.0),
            ],
            1,
        );
        let page2 =
            detector.detect_page_elements(&[&shape3], &[text_at("B2", 500.0, 100.0, 10.0)], 2);

        let summary = ElementDetector::summarize(&[page1, page2]);
        assert_eq!(summary.total_elements, 3);
        assert_eq!(summary.unique_element_ids, 2);
        assert_eq!(summary.element_counts["C1"].len(), 2);
        assert_eq!(summary.element_types[&ElementType::Column], 2);
        assert_eq!(summary.element_types[&ElementType::Beam], 1);
        assert_eq!(summary.pages_processed, 2);
    }
}
