//! Integration tests for the storage orchestrator
//!
//! Exercises the staged store: extraction, chunks, vectors; and the
//! partial-failure contract when the vector backend is unreachable.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use takeoff_engine::error::{Result, VectorStoreError};
use takeoff_engine::extraction::unified::ExtractionResponse;
use takeoff_engine::rag::chunker::Chunker;
use takeoff_engine::rag::document_store::DocumentStore;
use takeoff_engine::rag::embedding::{EmbeddingBatch, EmbeddingService};
use takeoff_engine::rag::types::*;
use takeoff_engine::rag::vector_store::{
    SqliteVectorStore, VectorRecord, VectorSearchResult, VectorStore, VectorStoreStats,
};
use takeoff_engine::rag::StorageService;
use uuid::Uuid;

/// Deterministic embedder: text bytes hashed into a fixed-dimension vector
struct FakeEmbeddingService;

#[async_trait]
impl EmbeddingService for FakeEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        let embeddings = texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; 8];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % 8] += byte as f32 / 255.0;
                }
                vector
            })
            .collect();

        Ok(EmbeddingBatch {
            success: true,
            embeddings,
            cost: 0.0001 * texts.len() as f64,
            model_used: "fake-embedding".to_string(),
            error: None,
        })
    }
}

/// Vector store whose backend is unreachable
struct UnavailableVectorStore;

#[async_trait]
impl VectorStore for UnavailableVectorStore {
    async fn initialize(&self, _create_if_absent: bool) -> Result<()> {
        Err(VectorStoreError::BackendUnavailable("connection refused".to_string()).into())
    }

    async fn upsert(&self, _vectors: Vec<VectorRecord>, _namespace: &str) -> Result<usize> {
        Err(VectorStoreError::BackendUnavailable("connection refused".to_string()).into())
    }

    async fn search(
        &self,
        _query_vector: &[f32],
        _top_k: usize,
        _filter: Option<&serde_json::Map<String, serde_json::Value>>,
        _namespace: &str,
    ) -> Result<Vec<VectorSearchResult>> {
        Err(VectorStoreError::BackendUnavailable("connection refused".to_string()).into())
    }

    async fn delete_ids(&self, _ids: &[String], _namespace: &str) -> Result<()> {
        Err(VectorStoreError::BackendUnavailable("connection refused".to_string()).into())
    }

    async fn delete_by_filter(
        &self,
        _filter: &serde_json::Map<String, serde_json::Value>,
        _namespace: &str,
    ) -> Result<()> {
        Err(VectorStoreError::BackendUnavailable("connection refused".to_string()).into())
    }

    async fn delete_namespace(&self, _namespace: &str) -> Result<()> {
        Err(VectorStoreError::BackendUnavailable("connection refused".to_string()).into())
    }

    async fn stats(&self, _namespace: Option<&str>) -> Result<VectorStoreStats> {
        Err(VectorStoreError::BackendUnavailable("connection refused".to_string()).into())
    }
}

async fn document_store() -> Arc<DocumentStore> {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = DocumentStore::new(pool);
    store.migrate().await.unwrap();
    Arc::new(store)
}

async fn seed_document(store: &DocumentStore) -> (Uuid, Uuid) {
    let kb = KnowledgeBase::new("drawings");
    store.create_knowledge_base(&kb).await.unwrap();

    let document = StoredDocument {
        id: Uuid::new_v4(),
        knowledge_base_id: kb.id,
        title: "Structural set".to_string(),
        document_type: "pdf".to_string(),
        source_ref: "sets/structural.pdf".to_string(),
        status: DocumentStatus::Processing,
        processing_error: String::new(),
        content: String::new(),
        metadata: serde_json::json!({}),
        extraction_method: String::new(),
        extraction_cost_usd: 0.0,
        extraction_quality_score: 0.0,
        extraction_metadata: serde_json::json!({}),
        chunk_count: 0,
        token_count: 0,
        embedding_cost: 0.0,
        is_active: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
        processed_at: None,
    };
    // Created pending, then moved to processing before extraction lands
    let mut pending = document.clone();
    pending.status = DocumentStatus::Pending;
    store.create_document(&pending).await.unwrap();
    store
        .set_document_status(document.id, DocumentStatus::Processing, None)
        .await
        .unwrap();

    (kb.id, document.id)
}

fn extraction_response() -> ExtractionResponse {
    ExtractionResponse {
        text: "General notes. Concrete shall be N32 unless noted otherwise.".to_string(),
        summary: "Structural cover sheet.".to_string(),
        success: true,
        cost_usd: 0.12,
        ..Default::default()
    }
}

async fn sqlite_vector_store() -> Arc<SqliteVectorStore> {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = SqliteVectorStore::new(pool, 8, DistanceMetric::Cosine);
    store.initialize(true).await.unwrap();
    Arc::new(store)
}

#[tokio::test]
async fn test_store_document_happy_path() {
    let documents = document_store().await;
    let vectors = sqlite_vector_store().await;
    let (kb_id, doc_id) = seed_document(&documents).await;

    let service = StorageService::new(
        documents.clone(),
        vectors.clone(),
        Arc::new(FakeEmbeddingService),
        Chunker::default(),
    );

    let result = service
        .store_document(
            doc_id,
            &extraction_response(),
            serde_json::json!({"file_name": "structural.pdf"}),
            None,
            true,
            kb_id,
        )
        .await;

    assert!(result.success, "errors: {:?}", result.errors);
    assert!(result.chunks_stored > 0);
    assert_eq!(result.vectors_stored, result.chunks_stored);
    assert!(result.errors.is_empty());

    // Document completed, chunks hold their vector ids
    let document = documents.get_document(doc_id).await.unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);
    let chunks = documents.get_chunks(doc_id).await.unwrap();
    assert!(chunks.iter().all(|c| c.embedding_vector_id.is_some()));

    // Vectors landed under the knowledge-base namespace
    let stats = vectors.stats(Some(&kb_id.to_string())).await.unwrap();
    assert_eq!(stats.total_vectors as usize, result.chunks_stored);

    // Knowledge-base counters reconciled
    let kb = documents.get_knowledge_base(kb_id).await.unwrap();
    assert_eq!(kb.document_count, 1);
    assert_eq!(kb.chunk_count as usize, result.chunks_stored);
}

#[tokio::test]
async fn test_vector_backend_unavailable_partial_success() {
    let documents = document_store().await;
    let (kb_id, doc_id) = seed_document(&documents).await;

    let service = StorageService::new(
        documents.clone(),
        Arc::new(UnavailableVectorStore),
        Arc::new(FakeEmbeddingService),
        Chunker::default(),
    );

    let result = service
        .store_document(
            doc_id,
            &extraction_response(),
            serde_json::json!({}),
            None,
            true,
            kb_id,
        )
        .await;

    // Extraction and chunks persisted; vectors missing; exactly one warning
    assert!(result.success);
    assert!(result.chunks_stored > 0);
    assert_eq!(result.vectors_stored, 0);
    assert!(result.errors.is_empty());
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("Vector backend unavailable"));

    let document = documents.get_document(doc_id).await.unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);
}

#[tokio::test]
async fn test_atomicity_no_chunks_without_extraction() {
    let documents = document_store().await;
    let vectors = sqlite_vector_store().await;
    let (kb_id, _) = seed_document(&documents).await;

    let service = StorageService::new(
        documents.clone(),
        vectors.clone(),
        Arc::new(FakeEmbeddingService),
        Chunker::default(),
    );

    // Unknown document: stage (a) fails, so no chunks and no vectors exist
    let ghost = Uuid::new_v4();
    let result = service
        .store_document(
            ghost,
            &extraction_response(),
            serde_json::json!({}),
            None,
            true,
            kb_id,
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.chunks_stored, 0);
    assert_eq!(result.vectors_stored, 0);
    assert!(!result.errors.is_empty());

    let stats = vectors.stats(None).await.unwrap();
    assert_eq!(stats.total_vectors, 0);
}

#[tokio::test]
async fn test_failed_extraction_is_persisted_for_audit() {
    let documents = document_store().await;
    let vectors = sqlite_vector_store().await;
    let (kb_id, doc_id) = seed_document(&documents).await;

    let service = StorageService::new(
        documents.clone(),
        vectors,
        Arc::new(FakeEmbeddingService),
        Chunker::default(),
    );

    let failed = ExtractionResponse {
        success: false,
        error: Some("Unauthorized: invalid api key".to_string()),
        ..Default::default()
    };

    let result = service
        .store_document(doc_id, &failed, serde_json::json!({}), None, true, kb_id)
        .await;

    // The store itself succeeds; the extraction record carries the failure
    assert!(result.success);
    let document = documents.get_document(doc_id).await.unwrap();
    assert_eq!(document.status, DocumentStatus::Failed);
    assert!(document.processing_error.contains("Unauthorized"));
}

#[tokio::test]
async fn test_soft_delete_then_restore_round_trip() {
    let documents = document_store().await;
    let vectors = sqlite_vector_store().await;
    let (kb_id, doc_id) = seed_document(&documents).await;

    let service = StorageService::new(
        documents.clone(),
        vectors.clone(),
        Arc::new(FakeEmbeddingService),
        Chunker::default(),
    );

    service
        .store_document(
            doc_id,
            &extraction_response(),
            serde_json::json!({}),
            None,
            true,
            kb_id,
        )
        .await;

    let before = documents.get_document(doc_id).await.unwrap();

    let deletion = service.delete_document(doc_id, kb_id).await;
    assert!(deletion.success);
    assert!(documents.get_document(doc_id).await.is_err());
    assert!(documents
        .keyword_search(kb_id, "concrete", 5)
        .await
        .unwrap()
        .is_empty());

    documents.restore_document(doc_id).await.unwrap();
    let after = documents.get_document(doc_id).await.unwrap();
    assert_eq!(after.title, before.title);
    assert_eq!(after.content, before.content);
    assert_eq!(after.chunk_count, before.chunk_count);
}
