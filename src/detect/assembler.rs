//! Adaptive shape assembly from line segments
//!
//! Drawings arrive in wildly different vector styles: some use clean
//! medium-length segments that close into rectangles, others (certain CAD
//! exporters) emit thousands of sub-millimeter strokes. One set of clustering
//! parameters fails on the opposite regime, so the assembler analyzes the
//! line-length distribution first and tunes itself before clustering.

use crate::geometry::{mm_to_pt, pt_to_mm, BoundingBox, LineStyle, Point, Shape, ShapeStyle};
use crate::pdf::drawings::{Arc, ArcKind, LineSegment};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Drawing style classification from line-length analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingStyle {
    /// More than 70% of lines are under 5mm
    TinySegments,
    /// More than 30% of lines are 10-50mm
    Normal,
    Mixed,
}

/// Line distribution analysis for a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineAnalysis {
    pub total_lines: usize,
    pub tiny_lines: usize,
    pub small_lines: usize,
    pub medium_lines: usize,
    pub large_lines: usize,
    pub avg_length_mm: f64,
    pub median_length_mm: f64,
    pub drawing_style: DrawingStyle,
}

/// Tuned clustering parameters
#[derive(Debug, Clone, PartialEq)]
struct ClusterParams {
    /// Cluster join distance in points
    cluster_distance: f64,
    circle_tolerance: f64,
    min_lines_per_cluster: usize,
    min_line_length_mm: f64,
    max_line_length_mm: f64,
}

/// Result of shape assembly for one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeDetection {
    pub page_number: u32,
    pub analysis: Option<LineAnalysis>,
    pub circles: Vec<Shape>,
    pub rectangles: Vec<Shape>,
    pub polygons: Vec<Shape>,
}

impl ShapeDetection {
    pub fn all_shapes(&self) -> Vec<&Shape> {
        self.circles
            .iter()
            .chain(self.rectangles.iter())
            .chain(self.polygons.iter())
            .collect()
    }

    pub fn total_shapes(&self) -> usize {
        self.circles.len() + self.rectangles.len() + self.polygons.len()
    }
}

/// Cluster of nearby line segments
#[derive(Debug, Clone)]
struct LineCluster {
    lines: Vec<LineSegment>,
}

impl LineCluster {
    fn bbox(&self) -> BoundingBox {
        let mut xs = Vec::with_capacity(self.lines.len() * 2);
        let mut ys = Vec::with_capacity(self.lines.len() * 2);
        for line in &self.lines {
            xs.push(line.x0);
            xs.push(line.x1);
            ys.push(line.y0);
            ys.push(line.y1);
        }
        BoundingBox::new(
            xs.iter().cloned().fold(f64::INFINITY, f64::min),
            ys.iter().cloned().fold(f64::INFINITY, f64::min),
            xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        )
    }

    fn total_length(&self) -> f64 {
        self.lines.iter().map(|l| l.length()).sum()
    }

    fn avg_linewidth(&self) -> f64 {
        if self.lines.is_empty() {
            return 1.0;
        }
        self.lines.iter().map(|l| l.linewidth).sum::<f64>() / self.lines.len() as f64
    }

    fn avg_color(&self) -> (f64, f64, f64) {
        if self.lines.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let n = self.lines.len() as f64;
        (
            self.lines.iter().map(|l| l.color.0).sum::<f64>() / n,
            self.lines.iter().map(|l| l.color.1).sum::<f64>() / n,
            self.lines.iter().map(|l| l.color.2).sum::<f64>() / n,
        )
    }

    fn style(&self) -> ShapeStyle {
        ShapeStyle {
            stroke_width: self.avg_linewidth(),
            stroke_color: self.avg_color(),
            fill_color: None,
            line_style: LineStyle::Solid,
        }
    }
}

/// Configuration for the adaptive assembler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    pub min_circle_diameter_mm: f64,
    pub max_circle_diameter_mm: f64,
    pub min_rectangle_size_mm: f64,
    pub max_rectangle_size_mm: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            min_circle_diameter_mm: 5.0,
            max_circle_diameter_mm: 100.0,
            min_rectangle_size_mm: 5.0,
            max_rectangle_size_mm: 100.0,
        }
    }
}

/// Assembles lines and arcs into circles, rectangles, and polygons with
/// auto-tuned clustering parameters
pub struct AdaptiveShapeAssembler {
    config: AssemblerConfig,
}

impl Default for AdaptiveShapeAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}

impl AdaptiveShapeAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    /// Detect shapes on one page from its lines and arcs
    pub fn detect_shapes(
        &self,
        lines: &[LineSegment],
        arcs: &[Arc],
        page_number: u32,
    ) -> ShapeDetection {
        let mut detection = ShapeDetection {
            page_number,
            analysis: None,
            circles: Vec::new(),
            rectangles: Vec::new(),
            polygons: Vec::new(),
        };

        // Circles drawn directly as 4-bezier subpaths skip clustering
        for arc in arcs {
            if arc.kind == ArcKind::Circle {
                let diameter_mm = arc.diameter_mm();
                if diameter_mm >= self.config.min_circle_diameter_mm
                    && diameter_mm <= self.config.max_circle_diameter_mm
                {
                    if let Ok(circle) = Shape::circle(
                        arc.center,
                        mm_to_pt(diameter_mm) / 2.0,
                        ShapeStyle {
                            stroke_width: arc.linewidth,
                            stroke_color: arc.color,
                            fill_color: None,
                            line_style: LineStyle::Solid,
                        },
                        page_number,
                    ) {
                        detection.circles.push(circle);
                    }
                }
            }
        }

        if lines.is_empty() {
            return detection;
        }

        let analysis = analyze_lines(lines);
        let params = select_parameters(&analysis);
        info!(
            "Page {}: style {:?}, cluster distance {:.1}mm, {} lines",
            page_number,
            analysis.drawing_style,
            pt_to_mm(params.cluster_distance),
            analysis.total_lines
        );

        let filtered = filter_lines(lines, &params);
        debug!(
            "Filtered to {} lines ({:.1}-{:.1}mm range)",
            filtered.len(),
            params.min_line_length_mm,
            params.max_line_length_mm
        );

        let clusters = cluster_lines(&filtered, &params);
        debug!("Created {} clusters", clusters.len());

        for cluster in clusters {
            if let Some(shape) = self.classify_cluster(&cluster, &params, page_number) {
                match &shape {
                    Shape::Circle { .. } => detection.circles.push(shape),
                    Shape::Rectangle { .. } => detection.rectangles.push(shape),
                    Shape::Polygon { .. } => detection.polygons.push(shape),
                }
            }
        }

        info!(
            "Page {}: detected {} circles, {} rectangles, {} polygons",
            page_number,
            detection.circles.len(),
            detection.rectangles.len(),
            detection.polygons.len()
        );

        detection.analysis = Some(analysis);
        detection
    }

    /// Classify a cluster, first match wins: circle, rectangle, polygon
    fn classify_cluster(
        &self,
        cluster: &LineCluster,
        params: &ClusterParams,
        page_number: u32,
    ) -> Option<Shape> {
        let bbox = cluster.bbox();
        let (width, height) = (bbox.width(), bbox.height());

        // Discard clusters below 2mm in either dimension
        if width < mm_to_pt(2.0) || height < mm_to_pt(2.0) {
            return None;
        }

        let style = cluster.style();

        if is_circular_cluster(cluster, params.circle_tolerance) {
            let diameter = (width + height) / 2.0;
            if diameter >= mm_to_pt(self.config.min_circle_diameter_mm)
                && diameter <= mm_to_pt(self.config.max_circle_diameter_mm)
            {
                return Shape::circle(bbox.center(), diameter / 2.0, style, page_number).ok();
            }
        }

        if is_rectangular_cluster(cluster) {
            let min = mm_to_pt(self.config.min_rectangle_size_mm);
            let max = mm_to_pt(self.config.max_rectangle_size_mm);
            if (min..=max).contains(&width) && (min..=max).contains(&height) {
                return Some(Shape::rectangle(bbox, style, page_number));
            }
        }

        if (3..=20).contains(&cluster.lines.len()) {
            let vertices = extract_vertices(cluster);
            if (3..=12).contains(&vertices.len()) {
                return Shape::polygon(vertices, style, page_number).ok();
            }
        }

        None
    }
}

/// Analyze the line-length distribution and classify the drawing style
pub(crate) fn analyze_lines(lines: &[LineSegment]) -> LineAnalysis {
    let mut lengths_mm: Vec<f64> = lines.iter().map(|l| l.length_mm()).collect();

    let tiny = lengths_mm.iter().filter(|&&l| l < 5.0).count();
    let small = lengths_mm.iter().filter(|&&l| (5.0..10.0).contains(&l)).count();
    let medium = lengths_mm
        .iter()
        .filter(|&&l| (10.0..50.0).contains(&l))
        .count();
    let large = lengths_mm.iter().filter(|&&l| l >= 50.0).count();

    let total = lengths_mm.len();
    let avg = lengths_mm.iter().sum::<f64>() / total as f64;

    lengths_mm.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if total % 2 == 0 {
        (lengths_mm[total / 2 - 1] + lengths_mm[total / 2]) / 2.0
    } else {
        lengths_mm[total / 2]
    };

    let tiny_ratio = tiny as f64 / total as f64;
    let medium_ratio = medium as f64 / total as f64;

    // Tiny branch requires a strictly greater ratio than 0.70
    let drawing_style = if tiny_ratio > 0.70 {
        DrawingStyle::TinySegments
    } else if medium_ratio > 0.30 {
        DrawingStyle::Normal
    } else {
        DrawingStyle::Mixed
    };

    LineAnalysis {
        total_lines: total,
        tiny_lines: tiny,
        small_lines: small,
        medium_lines: medium,
        large_lines: large,
        avg_length_mm: avg,
        median_length_mm: median,
        drawing_style,
    }
}

/// Pick clustering parameters for the detected style, then fine-tune by
/// average length
fn select_parameters(analysis: &LineAnalysis) -> ClusterParams {
    let mut params = match analysis.drawing_style {
        DrawingStyle::TinySegments => ClusterParams {
            cluster_distance: mm_to_pt(20.0),
            circle_tolerance: 0.35,
            min_lines_per_cluster: 2,
            min_line_length_mm: 0.5,
            max_line_length_mm: 100.0,
        },
        DrawingStyle::Normal => ClusterParams {
            cluster_distance: mm_to_pt(10.0),
            circle_tolerance: 0.25,
            min_lines_per_cluster: 2,
            min_line_length_mm: 3.0,
            max_line_length_mm: 150.0,
        },
        DrawingStyle::Mixed => ClusterParams {
            cluster_distance: mm_to_pt(15.0),
            circle_tolerance: 0.30,
            min_lines_per_cluster: 2,
            min_line_length_mm: 1.0,
            max_line_length_mm: 120.0,
        },
    };

    if analysis.avg_length_mm < 3.0 {
        params.cluster_distance *= 1.5;
    } else if analysis.avg_length_mm > 20.0 {
        params.cluster_distance *= 0.7;
    }

    params
}

fn filter_lines(lines: &[LineSegment], params: &ClusterParams) -> Vec<LineSegment> {
    lines
        .iter()
        .filter(|l| {
            let mm = l.length_mm();
            params.min_line_length_mm <= mm && mm <= params.max_line_length_mm
        })
        .cloned()
        .collect()
}

/// Cluster lines using a spatial grid of midpoints
fn cluster_lines(lines: &[LineSegment], params: &ClusterParams) -> Vec<LineCluster> {
    if lines.is_empty() {
        return Vec::new();
    }

    let grid_size = (params.cluster_distance / 2.0).max(50.0);
    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

    for (idx, line) in lines.iter().enumerate() {
        let mid = line.midpoint();
        let cell_x = (mid.x / grid_size) as i64;
        let cell_y = (mid.y / grid_size) as i64;

        // Register into the cell and its neighbors so nearby lines in
        // adjacent cells can still join one cluster
        for dx in -1..=1 {
            for dy in -1..=1 {
                grid.entry((cell_x + dx, cell_y + dy)).or_default().push(idx);
            }
        }
    }

    let mut clusters = Vec::new();
    let mut used: HashSet<usize> = HashSet::new();
    const MAX_ITERATIONS: usize = 15;

    let mut cells: Vec<_> = grid.into_iter().collect();
    cells.sort_by_key(|(key, _)| *key);

    for (_, indices) in cells {
        for &idx in &indices {
            if used.contains(&idx) {
                continue;
            }

            let mut cluster_lines = vec![lines[idx].clone()];
            used.insert(idx);

            let mut changed = true;
            let mut iterations = 0;
            while changed && iterations < MAX_ITERATIONS {
                changed = false;
                iterations += 1;

                for &other_idx in &indices {
                    if used.contains(&other_idx) {
                        continue;
                    }
                    if is_line_near_cluster(
                        &lines[other_idx],
                        &cluster_lines,
                        params.cluster_distance,
                    ) {
                        cluster_lines.push(lines[other_idx].clone());
                        used.insert(other_idx);
                        changed = true;
                    }
                }
            }

            if cluster_lines.len() >= params.min_lines_per_cluster {
                clusters.push(LineCluster {
                    lines: cluster_lines,
                });
            }
        }
    }

    clusters
}

fn is_line_near_cluster(line: &LineSegment, cluster: &[LineSegment], max_distance: f64) -> bool {
    cluster
        .iter()
        .any(|cl| distance_between_lines(line, cl) <= max_distance)
}

/// Minimum distance over endpoint and midpoint pairs of two segments
fn distance_between_lines(a: &LineSegment, b: &LineSegment) -> f64 {
    let points_a = [
        Point::new(a.x0, a.y0),
        Point::new(a.x1, a.y1),
        a.midpoint(),
    ];
    let points_b = [
        Point::new(b.x0, b.y0),
        Point::new(b.x1, b.y1),
        b.midpoint(),
    ];

    let mut min = f64::INFINITY;
    for pa in &points_a {
        for pb in &points_b {
            min = min.min(pa.distance_to(pb));
        }
    }
    min
}

/// Circle test: near-square bbox and line coverage close to the expected
/// perimeter, within the tuned tolerance
fn is_circular_cluster(cluster: &LineCluster, tolerance: f64) -> bool {
    let bbox = cluster.bbox();
    let (width, height) = (bbox.width(), bbox.height());

    if width == 0.0 || height == 0.0 {
        return false;
    }

    let aspect = width / height;
    if !(0.65..=1.35).contains(&aspect) {
        return false;
    }

    let expected_circumference = std::f64::consts::PI * ((width + height) / 2.0);
    let coverage = if expected_circumference > 0.0 {
        cluster.total_length() / expected_circumference
    } else {
        0.0
    };

    let min_coverage = (1.0 - tolerance).max(0.2);
    let max_coverage = (1.0 + tolerance * 2.0).min(3.0);

    (min_coverage..=max_coverage).contains(&coverage)
}

/// Rectangle test: at least one near-horizontal and one near-vertical line
fn is_rectangular_cluster(cluster: &LineCluster) -> bool {
    let mut h_lines = 0;
    let mut v_lines = 0;

    for line in &cluster.lines {
        let angle = line.angle_degrees().abs();
        if angle < 25.0 || angle > 155.0 {
            h_lines += 1;
        } else if (65.0..115.0).contains(&angle) {
            v_lines += 1;
        }
    }

    h_lines >= 1 && v_lines >= 1
}

/// Derive polygon vertices: deduplicate endpoints with a 7pt tolerance and
/// sort by angle around the centroid
fn extract_vertices(cluster: &LineCluster) -> Vec<Point> {
    const TOLERANCE: f64 = 7.0;

    let mut endpoints = Vec::with_capacity(cluster.lines.len() * 2);
    for line in &cluster.lines {
        endpoints.push(Point::new(line.x0, line.y0));
        endpoints.push(Point::new(line.x1, line.y1));
    }

    let mut vertices: Vec<Point> = Vec::new();
    for point in endpoints {
        if !vertices.iter().any(|v| v.distance_to(&point) < TOLERANCE) {
            vertices.push(point);
        }
    }

    if vertices.len() >= 3 {
        let cx = vertices.iter().map(|v| v.x).sum::<f64>() / vertices.len() as f64;
        let cy = vertices.iter().map(|v| v.y).sum::<f64>() / vertices.len() as f64;
        vertices.sort_by(|a, b| {
            let angle_a = (a.y - cy).atan2(a.x - cx);
            let angle_b = (b.y - cy).atan2(b.x - cx);
            angle_a
                .partial_cmp(&angle_b)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> LineSegment {
        LineSegment {
            x0,
            y0,
            x1,
            y1,
            linewidth: 1.0,
            color: (0.0, 0.0, 0.0),
        }
    }

    fn line_of_mm(length_mm: f64) -> LineSegment {
        line(0.0, 0.0, mm_to_pt(length_mm), 0.0)
    }

    #[test]
    fn test_style_classification_tiny() {
        // 86% tiny lines, like some CAD exporters produce
        let mut lines = Vec::new();
        for _ in 0..86 {
            lines.push(line_of_mm(2.0));
        }
        for _ in 0..14 {
            lines.push(line_of_mm(30.0));
        }

        let analysis = analyze_lines(&lines);
        assert_eq!(analysis.drawing_style, DrawingStyle::TinySegments);
        assert_eq!(analysis.tiny_lines, 86);
    }

    #[test]
    fn test_style_boundary_is_strict() {
        // Exactly 70% tiny must NOT take the tiny branch
        let mut lines = Vec::new();
        for _ in 0..70 {
            lines.push(line_of_mm(2.0));
        }
        for _ in 0..30 {
            // Keep these out of the medium bucket so the style lands on mixed
            lines.push(line_of_mm(7.0));
        }

        let analysis = analyze_lines(&lines);
        assert_ne!(analysis.drawing_style, DrawingStyle::TinySegments);
        assert_eq!(analysis.drawing_style, DrawingStyle::Mixed);
    }

    #[test]
    fn test_style_classification_normal() {
        let mut lines = Vec::new();
        for _ in 0..40 {
            lines.push(line_of_mm(20.0));
        }
        for _ in 0..60 {
            lines.push(line_of_mm(60.0));
        }

        let analysis = analyze_lines(&lines);
        assert_eq!(analysis.drawing_style, DrawingStyle::Normal);
    }

    #[test]
    fn test_parameter_selection() {
        let mut lines = Vec::new();
        for _ in 0..90 {
            lines.push(line_of_mm(4.0));
        }
        for _ in 0..10 {
            lines.push(line_of_mm(30.0));
        }

        let analysis = analyze_lines(&lines);
        let params = select_parameters(&analysis);
        // Tiny style: 20mm, no fine-tune since avg > 3mm
        assert!((pt_to_mm(params.cluster_distance) - 20.0).abs() < 0.01);
        assert!((params.circle_tolerance - 0.35).abs() < 1e-9);
        assert_eq!(params.min_lines_per_cluster, 2);
    }

    #[test]
    fn test_parameter_fine_tuning() {
        let lines: Vec<_> = (0..100).map(|_| line_of_mm(1.0)).collect();
        let analysis = analyze_lines(&lines);
        let params = select_parameters(&analysis);
        // avg < 3mm multiplies the tiny-style 20mm by 1.5
        assert!((pt_to_mm(params.cluster_distance) - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_rectangle_detection() {
        // A clean 30x10mm rectangle from four segments; the elongated aspect
        // keeps it out of the circle band
        let w = mm_to_pt(30.0);
        let h = mm_to_pt(10.0);
        let lines = vec![
            line(0.0, 0.0, w, 0.0),
            line(w, 0.0, w, h),
            line(w, h, 0.0, h),
            line(0.0, h, 0.0, 0.0),
        ];

        let assembler = AdaptiveShapeAssembler::default();
        let detection = assembler.detect_shapes(&lines, &[], 1);

        assert_eq!(detection.rectangles.len(), 1);
        assert!(detection.circles.is_empty());
    }

    #[test]
    fn test_circle_from_segments() {
        // Approximate a 15mm-diameter circle with 24 chords
        let r = mm_to_pt(7.5);
        let cx = 200.0;
        let cy = 200.0;
        let n = 24;
        let mut lines = Vec::new();
        for i in 0..n {
            let a0 = (i as f64) * 2.0 * std::f64::consts::PI / n as f64;
            let a1 = ((i + 1) as f64) * 2.0 * std::f64::consts::PI / n as f64;
            lines.push(line(
                cx + r * a0.cos(),
                cy + r * a0.sin(),
                cx + r * a1.cos(),
                cy + r * a1.sin(),
            ));
        }

        let assembler = AdaptiveShapeAssembler::default();
        let detection = assembler.detect_shapes(&lines, &[], 1);

        assert_eq!(detection.circles.len(), 1, "expected one circle");
        if let Shape::Circle { center, radius, .. } = &detection.circles[0] {
            assert!((center.x - cx).abs() < 2.0);
            assert!((center.y - cy).abs() < 2.0);
            assert!((pt_to_mm(*radius * 2.0) - 15.0).abs() < 1.0);
        } else {
            panic!("not a circle");
        }
    }

    #[test]
    fn test_bezier_circle_bypasses_clustering() {
        let arc = Arc {
            bbox: BoundingBox::new(100.0, 100.0, 100.0 + mm_to_pt(15.0), 100.0 + mm_to_pt(15.0)),
            curve_count: 4,
            center: Point::new(100.0 + mm_to_pt(7.5), 100.0 + mm_to_pt(7.5)),
            aspect_ratio: 1.0,
            kind: ArcKind::Circle,
            linewidth: 1.0,
            color: (0.0, 0.0, 0.0),
        };

        let assembler = AdaptiveShapeAssembler::default();
        let detection = assembler.detect_shapes(&[], &[arc], 1);
        assert_eq!(detection.circles.len(), 1);
    }

    #[test]
    fn test_min_lines_per_cluster() {
        // A single isolated line cannot form a shape
        let lines = vec![line_of_mm(20.0)];
        let assembler = AdaptiveShapeAssembler::default();
        let detection = assembler.detect_shapes(&lines, &[], 1);
        assert_eq!(detection.total_shapes(), 0);
    }

    #[test]
    fn test_classification_monotone_circle_to_polygon() {
        // Adding lines to a recognized circle may demote it to a polygon but
        // never to nothing
        let r = mm_to_pt(7.5);
        let cx = 200.0;
        let cy = 200.0;
        let n = 12;
        let mut lines = Vec::new();
        for i in 0..n {
            let a0 = (i as f64) * 2.0 * std::f64::consts::PI / n as f64;
            let a1 = ((i + 1) as f64) * 2.0 * std::f64::consts::PI / n as f64;
            lines.push(line(
                cx + r * a0.cos(),
                cy + r * a0.sin(),
                cx + r * a1.cos(),
                cy + r * a1.sin(),
            ));
        }

        let assembler = AdaptiveShapeAssembler::default();
        let before = assembler.detect_shapes(&lines, &[], 1);
        assert!(before.total_shapes() > 0);

        // Pile extra strokes through the middle
        lines.push(line(cx - r, cy, cx + r, cy));
        lines.push(line(cx, cy - r, cx, cy + r));
        let after = assembler.detect_shapes(&lines, &[], 1);
        assert!(after.total_shapes() > 0);
    }

    #[test]
    fn test_extract_vertices_dedup() {
        // Square with endpoints repeated at each corner
        let cluster = LineCluster {
            lines: vec![
                line(0.0, 0.0, 30.0, 0.0),
                line(30.0, 0.0, 30.0, 30.0),
                line(30.0, 30.0, 0.0, 30.0),
                line(0.0, 30.0, 0.0, 0.0),
            ],
        };

        let vertices = extract_vertices(&cluster);
        assert_eq!(vertices.len(), 4);
    }
}
