//! Shape primitives and geometry for vector drawing analysis
//!
//! All coordinates are in PDF points; 1 pt = 1/2.834645 mm. Shapes are a
//! tagged enum so downstream code dispatches on the variant rather than on
//! dictionary keys.

use crate::error::{GeometryError, Result};
use serde::{Deserialize, Serialize};

/// Points-to-millimeters conversion factor (1 pt = 1/2.834645 mm)
pub const MM_TO_PT: f64 = 2.834645;

/// Convert points to millimeters
pub fn pt_to_mm(pt: f64) -> f64 {
    pt / MM_TO_PT
}

/// Convert millimeters to points
pub fn mm_to_pt(mm: f64) -> f64 {
    mm * MM_TO_PT
}

/// A point on a PDF page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned bounding box with x0 <= x1 and y0 <= y1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Create a bounding box, normalizing corner order
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.x0 <= point.x && point.x <= self.x1 && self.y0 <= point.y && point.y <= self.y1
    }

    /// Distance from the box boundary to a point; zero when inside
    pub fn distance_to_point(&self, point: &Point) -> f64 {
        let dx = (self.x0 - point.x).max(0.0).max(point.x - self.x1);
        let dy = (self.y0 - point.y).max(0.0).max(point.y - self.y1);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Line rendering style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self::Solid
    }
}

/// Stroke and fill attributes carried by every shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    pub stroke_width: f64,
    /// RGB components in [0, 1]
    pub stroke_color: (f64, f64, f64),
    pub fill_color: Option<(f64, f64, f64)>,
    #[serde(default)]
    pub line_style: LineStyle,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke_width: 1.0,
            stroke_color: (0.0, 0.0, 0.0),
            fill_color: None,
            line_style: LineStyle::Solid,
        }
    }
}

/// A geometric shape recovered from vector drawing data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Shape {
    Circle {
        center: Point,
        radius: f64,
        style: ShapeStyle,
        page_number: u32,
    },
    Rectangle {
        bbox: BoundingBox,
        style: ShapeStyle,
        page_number: u32,
    },
    Polygon {
        vertices: Vec<Point>,
        style: ShapeStyle,
        page_number: u32,
    },
}

impl Shape {
    /// Create a circle; fails on a non-positive radius
    pub fn circle(center: Point, radius: f64, style: ShapeStyle, page_number: u32) -> Result<Self> {
        if radius <= 0.0 {
            return Err(
                GeometryError::InvalidShape(format!("non-positive radius: {radius}")).into(),
            );
        }
        Ok(Shape::Circle {
            center,
            radius,
            style,
            page_number,
        })
    }

    /// Create a rectangle from a bounding box
    pub fn rectangle(bbox: BoundingBox, style: ShapeStyle, page_number: u32) -> Self {
        Shape::Rectangle {
            bbox,
            style,
            page_number,
        }
    }

    /// Create a polygon; fails on fewer than 3 vertices or a degenerate edge
    pub fn polygon(vertices: Vec<Point>, style: ShapeStyle, page_number: u32) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(GeometryError::InvalidShape(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            ))
            .into());
        }
        for i in 0..vertices.len() {
            let j = (i + 1) % vertices.len();
            if vertices[i].distance_to(&vertices[j]) == 0.0 {
                return Err(GeometryError::InvalidShape(format!(
                    "zero-length polygon edge at vertex {i}"
                ))
                .into());
            }
        }
        Ok(Shape::Polygon {
            vertices,
            style,
            page_number,
        })
    }

    pub fn page_number(&self) -> u32 {
        match self {
            Shape::Circle { page_number, .. }
            | Shape::Rectangle { page_number, .. }
            | Shape::Polygon { page_number, .. } => *page_number,
        }
    }

    pub fn style(&self) -> &ShapeStyle {
        match self {
            Shape::Circle { style, .. }
            | Shape::Rectangle { style, .. }
            | Shape::Polygon { style, .. } => style,
        }
    }

    /// Bounding box of the shape
    pub fn bbox(&self) -> BoundingBox {
        match self {
            Shape::Circle { center, radius, .. } => BoundingBox::new(
                center.x - radius,
                center.y - radius,
                center.x + radius,
                center.y + radius,
            ),
            Shape::Rectangle { bbox, .. } => *bbox,
            Shape::Polygon { vertices, .. } => {
                let xs: Vec<f64> = vertices.iter().map(|v| v.x).collect();
                let ys: Vec<f64> = vertices.iter().map(|v| v.y).collect();
                BoundingBox::new(
                    xs.iter().cloned().fold(f64::INFINITY, f64::min),
                    ys.iter().cloned().fold(f64::INFINITY, f64::min),
                    xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                    ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                )
            }
        }
    }

    /// Geometric center of the shape
    pub fn center(&self) -> Point {
        match self {
            Shape::Circle { center, .. } => *center,
            _ => self.bbox().center(),
        }
    }

    /// Check whether a point lies inside (or on) the shape
    pub fn contains_point(&self, point: &Point) -> bool {
        match self {
            Shape::Circle { center, radius, .. } => center.distance_to(point) <= *radius,
            Shape::Rectangle { bbox, .. } => bbox.contains(point),
            Shape::Polygon { vertices, .. } => ray_cast_contains(vertices, point),
        }
    }

    /// Distance from the shape boundary to a point
    ///
    /// Exact for circles and rectangles. For polygons: minimum distance to any
    /// edge, signed by containment (negative means inside).
    pub fn distance_to_point(&self, point: &Point) -> f64 {
        match self {
            Shape::Circle { center, radius, .. } => center.distance_to(point) - radius,
            Shape::Rectangle { bbox, .. } => {
                if bbox.contains(point) {
                    0.0
                } else {
                    bbox.distance_to_point(point)
                }
            }
            Shape::Polygon { vertices, .. } => {
                let mut min_dist = f64::INFINITY;
                for i in 0..vertices.len() {
                    let j = (i + 1) % vertices.len();
                    let d = segment_distance(&vertices[i], &vertices[j], point);
                    min_dist = min_dist.min(d);
                }
                if ray_cast_contains(vertices, point) {
                    -min_dist
                } else {
                    min_dist
                }
            }
        }
    }
}

/// Even-odd ray cast containment test
fn ray_cast_contains(vertices: &[Point], point: &Point) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let (vi, vj) = (&vertices[i], &vertices[j]);
        if (vi.y > point.y) != (vj.y > point.y)
            && point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distance from a point to a line segment
fn segment_distance(a: &Point, b: &Point, p: &Point) -> f64 {
    let len_sq = (b.x - a.x).powi(2) + (b.y - a.y).powi(2);
    if len_sq == 0.0 {
        return a.distance_to(p);
    }
    let t = (((p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y)) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y));
    proj.distance_to(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pt_mm_conversion() {
        let mm = pt_to_mm(MM_TO_PT);
        assert!((mm - 1.0).abs() < 1e-9);
        assert!((mm_to_pt(pt_to_mm(42.0)) - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_circle_validation() {
        let bad = Shape::circle(Point::new(0.0, 0.0), 0.0, ShapeStyle::default(), 1);
        assert!(bad.is_err());

        let ok = Shape::circle(Point::new(0.0, 0.0), 5.0, ShapeStyle::default(), 1).unwrap();
        assert!(ok.contains_point(&Point::new(3.0, 0.0)));
        assert!(!ok.contains_point(&Point::new(6.0, 0.0)));
        assert!((ok.distance_to_point(&Point::new(8.0, 0.0)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rectangle_distance() {
        let rect = Shape::rectangle(BoundingBox::new(0.0, 0.0, 10.0, 10.0), ShapeStyle::default(), 1);
        assert!(rect.contains_point(&Point::new(5.0, 5.0)));
        assert_eq!(rect.distance_to_point(&Point::new(5.0, 5.0)), 0.0);
        assert!((rect.distance_to_point(&Point::new(13.0, 14.0)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_validation() {
        let too_few = Shape::polygon(
            vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
            ShapeStyle::default(),
            1,
        );
        assert!(too_few.is_err());

        let degenerate = Shape::polygon(
            vec![
                Point::new(0.0, 0.0),
                Point::new(0.0, 0.0),
                Point::new(1.0, 1.0),
            ],
            ShapeStyle::default(),
            1,
        );
        assert!(degenerate.is_err());
    }

    #[test]
    fn test_polygon_containment_and_distance() {
        let triangle = Shape::polygon(
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(5.0, 10.0),
            ],
            ShapeStyle::default(),
            1,
        )
        .unwrap();

        assert!(triangle.contains_point(&Point::new(5.0, 2.0)));
        assert!(!triangle.contains_point(&Point::new(-1.0, 5.0)));

        // Inside points get a negative signed distance
        assert!(triangle.distance_to_point(&Point::new(5.0, 2.0)) < 0.0);
        assert!(triangle.distance_to_point(&Point::new(5.0, -3.0)) > 0.0);
    }

    #[test]
    fn test_shape_serialization_tagged() {
        let circle = Shape::circle(Point::new(1.0, 2.0), 3.0, ShapeStyle::default(), 2).unwrap();
        let json = serde_json::to_value(&circle).unwrap();
        assert_eq!(json["kind"], "circle");
        assert_eq!(json["page_number"], 2);
    }

    #[test]
    fn test_bbox_normalizes_corners() {
        let bbox = BoundingBox::new(10.0, 12.0, 2.0, 3.0);
        assert!(bbox.x0 <= bbox.x1);
        assert!(bbox.y0 <= bbox.y1);
        assert_eq!(bbox.width(), 8.0);
    }
}
