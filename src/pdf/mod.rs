//! PDF parsing and rasterization
//!
//! Low-level access to PDF pages: operator-stream text extraction with
//! coordinates, line/arc recovery from drawing operators, and page
//! rasterization for vision models.

pub mod drawings;
pub mod raster;
pub mod text;

use crate::error::{ExtractionError, Result};
use lopdf::{Document, Object, ObjectId};

/// A 2D affine transform in PDF order [a b c d e f]
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Compose `self` after `other` (other applied first)
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Transform a point
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Approximate uniform scale factor
    pub fn scale(&self) -> f64 {
        ((self.a * self.a + self.b * self.b).sqrt() + (self.c * self.c + self.d * self.d).sqrt())
            / 2.0
    }
}

/// Open a PDF document, mapping errors to the extraction error space
pub(crate) fn open_document(file_path: &str) -> Result<Document> {
    if !std::path::Path::new(file_path).exists() {
        return Err(ExtractionError::InputNotFound(file_path.to_string()).into());
    }
    Document::load(file_path).map_err(|e| ExtractionError::Pdf(e.to_string()).into())
}

/// Extract a numeric operand value
pub(crate) fn operand_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Page media box (width, height), following Parent inheritance
pub(crate) fn page_size(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Ok(Object::Array(media_box)) = dict.get(b"MediaBox") {
            let values: Vec<f64> = media_box.iter().filter_map(operand_f64).collect();
            if values.len() == 4 {
                return (values[2] - values[0], values[3] - values[1]);
            }
        }
        current = dict
            .get(b"Parent")
            .ok()
            .and_then(|p| p.as_reference().ok());
    }
    // US Letter default when no MediaBox is present
    (612.0, 792.0)
}

/// Page rotation in degrees, following Parent inheritance
pub(crate) fn page_rotation(doc: &Document, page_id: ObjectId) -> i32 {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Ok(Object::Integer(rotation)) = dict.get(b"Rotate") {
            return *rotation as i32;
        }
        current = dict
            .get(b"Parent")
            .ok()
            .and_then(|p| p.as_reference().ok());
    }
    0
}

/// Decode a PDF string's bytes to text (Latin-1 fallback)
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
