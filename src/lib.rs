//! Engineering-Drawing Takeoff and RAG Extraction Engine
//!
//! Extracts structured information from PDFs (drawings, schedules,
//! specifications) in three cooperating layers:
//! - raw content: text with coordinates, tables, layout blocks, entities,
//!   visual elements recovered by vision LLMs or rule-based extractors
//! - semantic content: chunked and embedded passages indexed for retrieval
//! - domain content: counted and located engineering elements,
//!   cross-validated against schedule tables
//!
//! # Example
//!
//! ```rust,no_run
//! use takeoff_engine::detect::VectorElementPipeline;
//!
//! fn main() -> anyhow::Result<()> {
//!     let pipeline = VectorElementPipeline::default();
//!     let result = pipeline.process_file("drawings/structural_set.pdf")?;
//!
//!     for (element_id, occurrences) in &result.summary.element_counts {
//!         println!("{}: {} occurrences", element_id, occurrences.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod extraction;
pub mod geometry;
pub mod llm;
pub mod pdf;
pub mod progress;
pub mod rag;
pub mod takeoff;

// Re-export main types
pub use config::{
    DetectionConfig, EngineConfig, KnowledgeBasePolicy, RetryConfig, StorageConfig, TakeoffConfig,
    VectorIndexConfig, VisionConfig,
};
pub use detect::{
    AdaptiveShapeAssembler, DetectedElement, DetectionResult, DrawingStyle, ElementDetector,
    VectorElementPipeline,
};
pub use error::{
    EngineError, ExtractionError, GeometryError, LlmError, Result, StorageError, VectorStoreError,
};
pub use extraction::prompts::{ExtractionTask, MultiTaskPrompts, PromptUtils, SpecializedPrompts};
pub use extraction::rules::{DocumentFormat, RuleBasedExtractor, RuleExtraction};
pub use extraction::unified::{
    ExtractionRequest, ExtractionResponse, QualityPriority, UnifiedExtractor,
};
pub use geometry::{BoundingBox, Point, Shape, ShapeStyle};
pub use llm::provider::{LlmProvider, ProviderConfig, ProviderType};
pub use llm::router::{ModelRouter, OptimizationStrategy, RouteDecision, StaticModelRouter};
pub use pdf::raster::{ImageFormat, PageImage, RasterConfig, Rasterizer};
pub use pdf::text::{TextInstance, VectorTextExtractor};
pub use progress::{ExecutionStatus, ExecutionUpdate, NoopProgressSink, ProgressSink};
pub use rag::{
    Chunk, ChunkKind, Chunker, DocumentStore, EmbeddingService, HybridSearch, KnowledgeBase,
    Reranker, RetrievalService, SqliteVectorStore, StorageResult, StorageService, StoredDocument,
    VectorStore,
};
pub use takeoff::{ChunkedTakeoffExtractor, TakeoffRunResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
