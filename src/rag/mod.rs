//! Storage and retrieval engine
//!
//! Persists documents, pages, and chunks; embeds chunks into a namespaced
//! vector index; and answers queries through hybrid search and reranking.

pub mod chunker;
pub mod document_store;
pub mod embedding;
pub mod hybrid;
pub mod retrieval;
pub mod storage;
pub mod types;
pub mod vector_store;

pub use chunker::Chunker;
pub use document_store::DocumentStore;
pub use embedding::{EmbeddingBatch, EmbeddingService, LlmEmbeddingService};
pub use hybrid::{FusionMethod, HybridSearch, Reranker, RerankStrategy};
pub use retrieval::RetrievalService;
pub use storage::{StorageResult, StorageService};
pub use types::*;
pub use vector_store::{sanitize_metadata, SqliteVectorStore, VectorRecord, VectorSearchResult, VectorStore};
