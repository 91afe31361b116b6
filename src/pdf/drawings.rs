//! Line and arc recovery from PDF drawing operators
//!
//! Walks the page content stream's path operators and emits line segments and
//! bezier arcs with their stroke attributes. Filters keep only strokes that
//! plausibly belong to drawn geometry: length band in millimeters, stroke
//! width band, solid style, and dark ink.

use crate::error::Result;
use crate::geometry::{pt_to_mm, BoundingBox, Point};
use crate::pdf::{open_document, operand_f64, Matrix};
use lopdf::content::Content;
use lopdf::Object;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A straight stroke segment from the drawing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub linewidth: f64,
    pub color: (f64, f64, f64),
}

impl LineSegment {
    pub fn length(&self) -> f64 {
        ((self.x1 - self.x0).powi(2) + (self.y1 - self.y0).powi(2)).sqrt()
    }

    pub fn length_mm(&self) -> f64 {
        pt_to_mm(self.length())
    }

    pub fn midpoint(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Direction in degrees in (-180, 180]
    pub fn angle_degrees(&self) -> f64 {
        (self.y1 - self.y0).atan2(self.x1 - self.x0).to_degrees()
    }
}

/// Arc classification by curve count and shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArcKind {
    /// Exactly four bezier curves with a near-square bounding box
    Circle,
    Arc,
    Curve,
}

/// A bezier subpath from the drawing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub bbox: BoundingBox,
    pub curve_count: usize,
    pub center: Point,
    pub aspect_ratio: f64,
    pub kind: ArcKind,
    pub linewidth: f64,
    pub color: (f64, f64, f64),
}

impl Arc {
    pub fn width_mm(&self) -> f64 {
        pt_to_mm(self.bbox.width())
    }

    pub fn height_mm(&self) -> f64 {
        pt_to_mm(self.bbox.height())
    }

    pub fn diameter_mm(&self) -> f64 {
        (self.width_mm() + self.height_mm()) / 2.0
    }
}

/// Line-length size buckets in millimeters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SizeBuckets {
    pub tiny: Vec<LineSegment>,
    pub small: Vec<LineSegment>,
    pub medium: Vec<LineSegment>,
    pub large: Vec<LineSegment>,
}

/// Configuration for line and arc detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawingDetectorConfig {
    /// Minimum line length in millimeters
    pub min_length_mm: f64,

    /// Maximum line length in millimeters
    pub max_length_mm: f64,

    /// Minimum arc bounding-box dimension in millimeters
    pub min_arc_size_mm: f64,

    /// Maximum arc bounding-box dimension in millimeters
    pub max_arc_size_mm: f64,

    /// Stroke width band in points
    pub min_stroke_width: f64,
    pub max_stroke_width: f64,

    /// Keep dashed/dotted strokes
    pub include_non_solid: bool,

    /// Maximum mean RGB lightness for a stroke to count as ink
    pub max_lightness: f64,
}

impl Default for DrawingDetectorConfig {
    fn default() -> Self {
        Self {
            min_length_mm: 0.05,
            max_length_mm: 200.0,
            min_arc_size_mm: 1.0,
            max_arc_size_mm: 200.0,
            min_stroke_width: 0.5,
            max_stroke_width: 6.0,
            include_non_solid: false,
            max_lightness: 0.5,
        }
    }
}

/// Per-page detection output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageDrawings {
    pub page_number: u32,
    pub lines: Vec<LineSegment>,
    pub arcs: Vec<Arc>,
}

/// Detects line segments and arcs from PDF vector data
pub struct DrawingDetector {
    config: DrawingDetectorConfig,
}

impl Default for DrawingDetector {
    fn default() -> Self {
        Self::new(DrawingDetectorConfig::default())
    }
}

impl DrawingDetector {
    pub fn new(config: DrawingDetectorConfig) -> Self {
        Self { config }
    }

    /// Extract lines and arcs from every page of a PDF
    pub fn extract_from_file(&self, file_path: &str) -> Result<Vec<PageDrawings>> {
        let doc = open_document(file_path)?;
        let mut pages = Vec::new();

        for (page_number, page_id) in doc.get_pages() {
            let content_data = doc
                .get_page_content(page_id)
                .map_err(|e| crate::error::ExtractionError::Pdf(e.to_string()))?;
            let content = Content::decode(&content_data)
                .map_err(|e| crate::error::ExtractionError::Pdf(e.to_string()))?;

            let page = self.extract_page(&content, page_number);
            info!(
                "Page {}: {} lines, {} arcs",
                page_number,
                page.lines.len(),
                page.arcs.len()
            );
            pages.push(page);
        }

        Ok(pages)
    }

    /// Extract lines and arcs from one decoded content stream
    pub fn extract_page(&self, content: &Content, page_number: u32) -> PageDrawings {
        let mut walker = PathWalker::new(&self.config, page_number);
        walker.walk(content);
        debug!(
            "Page {}: kept {} lines and {} arcs after filtering",
            page_number,
            walker.result.lines.len(),
            walker.result.arcs.len()
        );
        walker.result
    }

    /// Filter lines to a length band in millimeters
    pub fn filter_by_length(lines: &[LineSegment], min_mm: f64, max_mm: f64) -> Vec<LineSegment> {
        lines
            .iter()
            .filter(|l| {
                let mm = l.length_mm();
                min_mm <= mm && mm <= max_mm
            })
            .cloned()
            .collect()
    }

    /// Bucket lines by length in millimeters
    pub fn categorize_by_size(lines: &[LineSegment]) -> SizeBuckets {
        let mut buckets = SizeBuckets::default();
        for line in lines {
            let mm = line.length_mm();
            if mm < 1.0 {
                buckets.tiny.push(line.clone());
            } else if mm < 10.0 {
                buckets.small.push(line.clone());
            } else if mm < 50.0 {
                buckets.medium.push(line.clone());
            } else {
                buckets.large.push(line.clone());
            }
        }
        buckets
    }
}

/// Classify an arc by curve count and aspect ratio
pub fn classify_arc(curve_count: usize, aspect_ratio: f64) -> ArcKind {
    if curve_count == 4 && (0.75..=1.35).contains(&aspect_ratio) {
        ArcKind::Circle
    } else if curve_count >= 2 {
        ArcKind::Arc
    } else {
        ArcKind::Curve
    }
}

/// Graphics state tracked while walking the path operators
struct GraphicsState {
    ctm: Matrix,
    line_width: f64,
    stroke_color: (f64, f64, f64),
    dashed: bool,
}

impl GraphicsState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            line_width: 1.0,
            stroke_color: (0.0, 0.0, 0.0),
            dashed: false,
        }
    }
}

struct PathWalker<'a> {
    config: &'a DrawingDetectorConfig,
    state: GraphicsState,
    state_stack: Vec<GraphicsState>,
    /// Straight segments of the path being built
    pending_lines: Vec<LineSegment>,
    /// Points touched by bezier operators in the current path
    pending_curve_points: Vec<(f64, f64)>,
    pending_curve_count: usize,
    current_point: Option<(f64, f64)>,
    subpath_start: Option<(f64, f64)>,
    result: PageDrawings,
}

impl<'a> PathWalker<'a> {
    fn new(config: &'a DrawingDetectorConfig, page_number: u32) -> Self {
        Self {
            config,
            state: GraphicsState::new(),
            state_stack: Vec::new(),
            pending_lines: Vec::new(),
            pending_curve_points: Vec::new(),
            pending_curve_count: 0,
            current_point: None,
            subpath_start: None,
            result: PageDrawings {
                page_number,
                ..Default::default()
            },
        }
    }

    fn walk(&mut self, content: &Content) {
        for op in &content.operations {
            let nums: Vec<f64> = op.operands.iter().filter_map(operand_f64).collect();
            match op.operator.as_str() {
                "q" => self.state_stack.push(GraphicsState {
                    ctm: self.state.ctm,
                    line_width: self.state.line_width,
                    stroke_color: self.state.stroke_color,
                    dashed: self.state.dashed,
                }),
                "Q" => {
                    if let Some(s) = self.state_stack.pop() {
                        self.state = s;
                    }
                }
                "cm" if nums.len() == 6 => {
                    let m = Matrix {
                        a: nums[0],
                        b: nums[1],
                        c: nums[2],
                        d: nums[3],
                        e: nums[4],
                        f: nums[5],
                    };
                    self.state.ctm = m.multiply(&self.state.ctm);
                }
                "w" if !nums.is_empty() => self.state.line_width = nums[0],
                "RG" if nums.len() == 3 => self.state.stroke_color = (nums[0], nums[1], nums[2]),
                "G" if !nums.is_empty() => {
                    self.state.stroke_color = (nums[0], nums[0], nums[0]);
                }
                "K" if nums.len() == 4 => {
                    // CMYK to RGB approximation
                    let (c, m, y, k) = (nums[0], nums[1], nums[2], nums[3]);
                    self.state.stroke_color = (
                        (1.0 - c) * (1.0 - k),
                        (1.0 - m) * (1.0 - k),
                        (1.0 - y) * (1.0 - k),
                    );
                }
                "d" => {
                    self.state.dashed = match op.operands.first() {
                        Some(Object::Array(pattern)) => !pattern.is_empty(),
                        _ => false,
                    };
                }
                "m" if nums.len() == 2 => {
                    let p = self.state.ctm.apply(nums[0], nums[1]);
                    self.current_point = Some(p);
                    self.subpath_start = Some(p);
                }
                "l" if nums.len() == 2 => {
                    let p = self.state.ctm.apply(nums[0], nums[1]);
                    if let Some(from) = self.current_point {
                        self.push_line(from, p);
                    }
                    self.current_point = Some(p);
                }
                "c" if nums.len() == 6 => {
                    self.push_curve(&[
                        (nums[0], nums[1]),
                        (nums[2], nums[3]),
                        (nums[4], nums[5]),
                    ]);
                }
                "v" | "y" if nums.len() == 4 => {
                    self.push_curve(&[(nums[0], nums[1]), (nums[2], nums[3])]);
                }
                "re" if nums.len() == 4 => {
                    let (x, y, w, h) = (nums[0], nums[1], nums[2], nums[3]);
                    let corners = [
                        self.state.ctm.apply(x, y),
                        self.state.ctm.apply(x + w, y),
                        self.state.ctm.apply(x + w, y + h),
                        self.state.ctm.apply(x, y + h),
                    ];
                    for i in 0..4 {
                        self.push_line(corners[i], corners[(i + 1) % 4]);
                    }
                }
                "h" => {
                    if let (Some(from), Some(start)) = (self.current_point, self.subpath_start) {
                        if from != start {
                            self.push_line(from, start);
                        }
                        self.current_point = Some(start);
                    }
                }
                // Painting operators flush the accumulated path
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "n" => {
                    let stroked = !matches!(op.operator.as_str(), "n");
                    self.flush_path(stroked);
                }
                _ => {}
            }
        }

        // A malformed stream may end without a paint operator
        self.flush_path(true);
    }

    fn push_line(&mut self, from: (f64, f64), to: (f64, f64)) {
        self.pending_lines.push(LineSegment {
            x0: from.0,
            y0: from.1,
            x1: to.0,
            y1: to.1,
            linewidth: self.state.line_width,
            color: self.state.stroke_color,
        });
    }

    fn push_curve(&mut self, control_points: &[(f64, f64)]) {
        if let Some(p) = self.current_point {
            self.pending_curve_points.push(p);
        }
        for &(x, y) in control_points {
            self.pending_curve_points.push(self.state.ctm.apply(x, y));
        }
        if let Some(&last) = control_points.last() {
            self.current_point = Some(self.state.ctm.apply(last.0, last.1));
        }
        self.pending_curve_count += 1;
    }

    fn stroke_passes_filters(&self) -> bool {
        let width_ok = self.state.line_width >= self.config.min_stroke_width
            && self.state.line_width <= self.config.max_stroke_width;
        let style_ok = self.config.include_non_solid || !self.state.dashed;
        let (r, g, b) = self.state.stroke_color;
        let dark_ok = (r + g + b) / 3.0 <= self.config.max_lightness;
        width_ok && style_ok && dark_ok
    }

    fn flush_path(&mut self, stroked: bool) {
        let lines = std::mem::take(&mut self.pending_lines);
        let curve_points = std::mem::take(&mut self.pending_curve_points);
        let curve_count = std::mem::take(&mut self.pending_curve_count);
        self.current_point = None;
        self.subpath_start = None;

        if !stroked || !self.stroke_passes_filters() {
            return;
        }

        for line in lines {
            let mm = line.length_mm();
            if self.config.min_length_mm <= mm && mm <= self.config.max_length_mm {
                self.result.lines.push(line);
            }
        }

        if curve_count > 0 && curve_points.len() >= 2 {
            let xs: Vec<f64> = curve_points.iter().map(|p| p.0).collect();
            let ys: Vec<f64> = curve_points.iter().map(|p| p.1).collect();
            let bbox = BoundingBox::new(
                xs.iter().cloned().fold(f64::INFINITY, f64::min),
                ys.iter().cloned().fold(f64::INFINITY, f64::min),
                xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            );

            let width_mm = pt_to_mm(bbox.width());
            let height_mm = pt_to_mm(bbox.height());
            if width_mm < self.config.min_arc_size_mm
                || height_mm < self.config.min_arc_size_mm
                || width_mm > self.config.max_arc_size_mm
                || height_mm > self.config.max_arc_size_mm
            {
                return;
            }

            let aspect_ratio = if bbox.height() > 0.0 {
                bbox.width() / bbox.height()
            } else {
                0.0
            };

            self.result.arcs.push(Arc {
                center: bbox.center(),
                bbox,
                curve_count,
                aspect_ratio,
                kind: classify_arc(curve_count, aspect_ratio),
                linewidth: self.state.line_width,
                color: self.state.stroke_color,
            });
        }
    }
}
