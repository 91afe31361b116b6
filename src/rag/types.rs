//! Core data model for the storage and retrieval engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "processing" => DocumentStatus::Processing,
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Pending,
        }
    }

    /// Status transitions are monotone except failed -> processing on retry
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        ) || *self == next
    }
}

/// A document in a knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub title: String,
    /// MIME/format tag ("pdf", "text", "markdown", "csv", ...)
    pub document_type: String,
    /// Reference into source storage (path or object key)
    pub source_ref: String,
    pub status: DocumentStatus,
    pub processing_error: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub extraction_method: String,
    pub extraction_cost_usd: f64,
    pub extraction_quality_score: f64,
    pub extraction_metadata: serde_json::Value,
    pub chunk_count: i64,
    pub token_count: i64,
    pub embedding_cost: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// One page of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPage {
    pub id: Uuid,
    pub document_id: Uuid,
    /// 1-indexed, unique within the document
    pub page_number: u32,
    pub page_text: String,
    pub word_count: i64,
    pub token_count: i64,
    /// Pixel dimensions when the page was rasterized
    pub image_width: Option<i64>,
    pub image_height: Option<i64>,
}

/// Kinds of retrieval chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Text,
    Table,
    Metadata,
    VisualElementGroup,
    DrawingMetadata,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Table => "table",
            ChunkKind::Metadata => "metadata",
            ChunkKind::VisualElementGroup => "visual_element_group",
            ChunkKind::DrawingMetadata => "drawing_metadata",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "table" => ChunkKind::Table,
            "metadata" => ChunkKind::Metadata,
            "visual_element_group" => ChunkKind::VisualElementGroup,
            "drawing_metadata" => ChunkKind::DrawingMetadata,
            _ => ChunkKind::Text,
        }
    }

    /// Atomic chunks are never merged or split during rechunking
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            ChunkKind::Table | ChunkKind::Metadata | ChunkKind::DrawingMetadata
        )
    }
}

/// A semantic chunk of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Unique within the document
    pub chunk_index: i64,
    pub kind: ChunkKind,
    pub content: String,
    pub token_count: i64,
    pub metadata: serde_json::Value,
    pub page_number: Option<u32>,
    pub parent_chunk_id: Option<Uuid>,
    /// Weak reference into the vector index; may dangle during failover
    pub embedding_vector_id: Option<String>,
    pub retrieval_count: i64,
    pub relevance_score_avg: Option<f64>,
}

impl Chunk {
    pub fn new(document_id: Uuid, chunk_index: i64, kind: ChunkKind, content: String) -> Self {
        let token_count = estimate_tokens(&content);
        Self {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            kind,
            content,
            token_count,
            metadata: serde_json::json!({}),
            page_number: None,
            parent_chunk_id: None,
            embedding_vector_id: None,
            retrieval_count: 0,
            relevance_score_avg: None,
        }
    }

    pub fn with_page(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Rough token estimate: one token per four characters of English text
pub fn estimate_tokens(text: &str) -> i64 {
    (text.len() as i64 + 3) / 4
}

/// Retrieval strategy for a knowledge base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    Similarity,
    Mmr,
    Hybrid,
    Reranking,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Similarity => "similarity",
            RetrievalStrategy::Mmr => "mmr",
            RetrievalStrategy::Hybrid => "hybrid",
            RetrievalStrategy::Reranking => "reranking",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "mmr" => RetrievalStrategy::Mmr,
            "hybrid" => RetrievalStrategy::Hybrid,
            "reranking" => RetrievalStrategy::Reranking,
            _ => RetrievalStrategy::Similarity,
        }
    }
}

/// A knowledge base: tenant-scoped collection of documents sharing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub similarity_top_k: i64,
    pub mmr_diversity_bias: f64,
    pub retrieval_strategy: RetrievalStrategy,
    pub document_count: i64,
    pub chunk_count: i64,
    pub total_tokens: i64,
    pub total_embedding_cost: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_queried: Option<DateTime<Utc>>,
}

impl KnowledgeBase {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            chunk_size: 1000,
            chunk_overlap: 200,
            similarity_top_k: 5,
            mmr_diversity_bias: 0.3,
            retrieval_strategy: RetrievalStrategy::Similarity,
            document_count: 0,
            chunk_count: 0,
            total_tokens: 0,
            total_embedding_cost: 0.0,
            is_active: true,
            created_at: now,
            last_updated: now,
            last_queried: None,
        }
    }
}

/// Distance metric of a vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dot,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Dot => "dot",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "euclidean" => DistanceMetric::Euclidean,
            "dot" => DistanceMetric::Dot,
            _ => DistanceMetric::Cosine,
        }
    }
}

/// Vector index lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorIndexStatus {
    Initializing,
    Active,
    Updating,
    Error,
    Rebuilding,
}

impl VectorIndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorIndexStatus::Initializing => "initializing",
            VectorIndexStatus::Active => "active",
            VectorIndexStatus::Updating => "updating",
            VectorIndexStatus::Error => "error",
            VectorIndexStatus::Rebuilding => "rebuilding",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "active" => VectorIndexStatus::Active,
            "updating" => VectorIndexStatus::Updating,
            "error" => VectorIndexStatus::Error,
            "rebuilding" => VectorIndexStatus::Rebuilding,
            _ => VectorIndexStatus::Initializing,
        }
    }
}

/// Descriptor of a vector index backing a knowledge base
///
/// Only one active descriptor exists per knowledge base at a time; writes
/// serialize through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexDescriptor {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub name: String,
    pub status: VectorIndexStatus,
    pub dimensions: i64,
    pub metric: DistanceMetric,
    pub vector_count: i64,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Query lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Processing => "processing",
            QueryStatus::Completed => "completed",
            QueryStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "processing" => QueryStatus::Processing,
            "completed" => QueryStatus::Completed,
            "failed" => QueryStatus::Failed,
            _ => QueryStatus::Pending,
        }
    }
}

/// A query against a knowledge base, with performance tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQuery {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub query_text: String,
    pub retrieval_strategy: RetrievalStrategy,
    pub similarity_top_k: i64,
    pub mmr_diversity_bias: Option<f64>,
    pub reranking_enabled: bool,
    pub status: QueryStatus,
    pub error_message: String,
    pub latency_ms: Option<i64>,
    pub embedding_latency_ms: Option<i64>,
    pub retrieval_latency_ms: Option<i64>,
    pub reranking_latency_ms: Option<i64>,
    pub embedding_cost: f64,
    pub reranking_cost: f64,
    pub total_cost: f64,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// One retrieved chunk within a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQueryResult {
    pub id: Uuid,
    pub query_id: Uuid,
    pub chunk_id: Uuid,
    pub rank: i64,
    pub relevance_score: f64,
    pub reranking_score: Option<f64>,
    /// Human-labelled relevance, when feedback exists
    pub is_relevant: Option<bool>,
}

/// Trade discipline for takeoff extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trade {
    Concrete,
}

impl Trade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trade::Concrete => "concrete",
        }
    }
}

/// A takeoff extraction run over a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeoffExtraction {
    pub id: Uuid,
    pub document_id: Uuid,
    pub trade: Trade,
    pub extraction_method: String,
    pub status: DocumentStatus,
    pub processing_error: String,
    pub processing_time_ms: i64,
    pub extraction_cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// One extracted engineering element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeoffElement {
    pub id: Uuid,
    pub extraction_id: Uuid,
    pub document_id: Uuid,
    pub element_id: String,
    pub element_type: String,
    pub page_number: u32,
    pub confidence_score: f64,
    /// Schema-constrained specification groups
    pub specifications: serde_json::Value,
    /// Source references, missing fields, assumptions, validation warnings
    pub extraction_notes: serde_json::Value,
    pub completeness: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use DocumentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        // Retry path
        assert!(Failed.can_transition_to(Processing));
        // Backwards moves are not allowed
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_chunk_kind_atomicity() {
        assert!(ChunkKind::Table.is_atomic());
        assert!(ChunkKind::Metadata.is_atomic());
        assert!(ChunkKind::DrawingMetadata.is_atomic());
        assert!(!ChunkKind::Text.is_atomic());
        assert!(!ChunkKind::VisualElementGroup.is_atomic());
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_enum_round_trips() {
        for status in ["pending", "processing", "completed", "failed"] {
            assert_eq!(DocumentStatus::parse(status).as_str(), status);
        }
        for kind in [
            "text",
            "table",
            "metadata",
            "visual_element_group",
            "drawing_metadata",
        ] {
            assert_eq!(ChunkKind::parse(kind).as_str(), kind);
        }
        for metric in ["cosine", "euclidean", "dot"] {
            assert_eq!(DistanceMetric::parse(metric).as_str(), metric);
        }
    }
}
