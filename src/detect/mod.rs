//! Vector-geometric element detection
//!
//! Non-LLM pipeline that recovers shapes from PDF drawing operators, then
//! associates nearby text labels with those shapes to produce spatially
//! precise element occurrences.

pub mod assembler;
pub mod elements;
pub mod pipeline;

pub use assembler::{AdaptiveShapeAssembler, DrawingStyle, LineAnalysis, ShapeDetection};
pub use elements::{
    DetectedElement, ElementDetectionConfig, ElementDetector, TextPosition, TextShapeAssociation,
};
pub use pipeline::{DetectionResult, PageElements, VectorElementPipeline};
