//! Integration tests for retrieval: embed, search, rerank, statistics

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use takeoff_engine::error::Result;
use takeoff_engine::rag::document_store::DocumentStore;
use takeoff_engine::rag::embedding::{EmbeddingBatch, EmbeddingService};
use takeoff_engine::rag::retrieval::{RetrievalOptions, RetrievalService};
use takeoff_engine::rag::types::*;
use takeoff_engine::rag::vector_store::{SqliteVectorStore, VectorStore};
use takeoff_engine::rag::{Chunker, StorageService};
use takeoff_engine::ExtractionResponse;
use uuid::Uuid;

/// Deterministic embedder so searches are reproducible across calls
struct FakeEmbeddingService;

#[async_trait]
impl EmbeddingService for FakeEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        let embeddings = texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; 16];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % 16] += byte as f32 / 255.0;
                }
                vector
            })
            .collect();

        Ok(EmbeddingBatch {
            success: true,
            embeddings,
            cost: 0.0002,
            model_used: "fake-embedding".to_string(),
            error: None,
        })
    }
}

struct Fixture {
    documents: Arc<DocumentStore>,
    retrieval: RetrievalService,
    kb_id: Uuid,
    doc_id: Uuid,
}

async fn fixture() -> Fixture {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let documents = Arc::new(DocumentStore::new(pool));
    documents.migrate().await.unwrap();

    let vector_pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let vectors = Arc::new(SqliteVectorStore::new(
        vector_pool,
        16,
        DistanceMetric::Cosine,
    ));
    vectors.initialize(true).await.unwrap();

    let embedder = Arc::new(FakeEmbeddingService);

    let kb = KnowledgeBase::new("retrieval-kb");
    documents.create_knowledge_base(&kb).await.unwrap();

    let document = StoredDocument {
        id: Uuid::new_v4(),
        knowledge_base_id: kb.id,
        title: "Specification".to_string(),
        document_type: "pdf".to_string(),
        source_ref: "spec.pdf".to_string(),
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
    let mut pending = document.clone();
    pending.status = DocumentStatus::Pending;
    documents.create_document(&pending).await.unwrap();
    documents
        .set_document_status(document.id, DocumentStatus::Processing, None)
        .await
        .unwrap();

    // Store a response with a text body and a table so both chunk kinds exist
    let mut response = ExtractionResponse {
        text: "Concrete cover shall be 40mm for columns and 30mm for slabs. \
               All reinforcement to AS 4671."
            .to_string(),
        summary: "Concrete specification notes.".to_string(),
        success: true,
        ..Default::default()
    };
    response.tables.push(takeoff_engine::extraction::ExtractedTable {
        table_type: "schedule".to_string(),
        caption: "COLUMN SCHEDULE".to_string(),
        headers: vec!["MARK".into(), "SIZE".into(), "QTY".into()],
        rows: vec![vec!["C1".into(), "300x450".into(), "4".into()]],
        position: String::new(),
        bounding_box: None,
        notes: String::new(),
        contains_reference_quantities: true,
        element_types_to_count: vec![],
        page: 1,
    });

    let storage = StorageService::new(
        documents.clone(),
        vectors.clone(),
        embedder.clone(),
        Chunker::default(),
    );
    let stored = storage
        .store_document(
            document.id,
            &response,
            serde_json::json!({}),
            None,
            true,
            kb.id,
        )
        .await;
    assert!(stored.success);

    let retrieval = RetrievalService::new(documents.clone(), vectors, embedder);

    Fixture {
        documents,
        retrieval,
        kb_id: kb.id,
        doc_id: document.id,
    }
}

#[tokio::test]
async fn test_similarity_retrieval_returns_ranked_chunks() {
    let fixture = fixture().await;

    let outcome = fixture
        .retrieval
        .retrieve(
            "concrete cover for columns",
            fixture.kb_id,
            RetrievalOptions::default(),
        )
        .await
        .unwrap();

    assert!(!outcome.results.is_empty());
    // Scores are in descending order
    for pair in outcome.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    // Every result links back to the source document
    for result in &outcome.results {
        assert_eq!(result.document_id, fixture.doc_id.to_string());
    }
}

#[tokio::test]
async fn test_rank_stability_across_calls() {
    let fixture = fixture().await;
    let options = RetrievalOptions::default();

    let first = fixture
        .retrieval
        .retrieve("reinforcement standard", fixture.kb_id, options.clone())
        .await
        .unwrap();
    let second = fixture
        .retrieval
        .retrieve("reinforcement standard", fixture.kb_id, options)
        .await
        .unwrap();

    let ids_first: Vec<&str> = first.results.iter().map(|r| r.chunk_id.as_str()).collect();
    let ids_second: Vec<&str> = second.results.iter().map(|r| r.chunk_id.as_str()).collect();
    assert_eq!(ids_first, ids_second);
}

#[tokio::test]
async fn test_retrieval_updates_chunk_statistics() {
    let fixture = fixture().await;

    fixture
        .retrieval
        .retrieve(
            "concrete cover",
            fixture.kb_id,
            RetrievalOptions {
                top_k: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let chunks = fixture.documents.get_chunks(fixture.doc_id).await.unwrap();
    let retrieved: i64 = chunks.iter().map(|c| c.retrieval_count).sum();
    assert_eq!(retrieved, 1);

    let hit = chunks.iter().find(|c| c.retrieval_count > 0).unwrap();
    assert!(hit.relevance_score_avg.is_some());
}

#[tokio::test]
async fn test_reranking_strategy_prefers_tables_on_ties() {
    let fixture = fixture().await;

    let outcome = fixture
        .retrieval
        .retrieve(
            "column schedule",
            fixture.kb_id,
            RetrievalOptions {
                strategy: RetrievalStrategy::Reranking,
                top_k: 3,
                rerank_top_k: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!outcome.results.is_empty());
    // Reranked results carry a reranking score
    assert!(outcome.results[0].reranking_score.is_some());
}

#[tokio::test]
async fn test_hybrid_strategy_finds_keyword_matches() {
    let fixture = fixture().await;

    let outcome = fixture
        .retrieval
        .retrieve(
            "AS 4671",
            fixture.kb_id,
            RetrievalOptions {
                strategy: RetrievalStrategy::Hybrid,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!outcome.results.is_empty());
    // The chunk that literally contains the standard reference surfaces
    assert!(outcome
        .results
        .iter()
        .any(|r| r.content.contains("AS 4671")));
}

#[tokio::test]
async fn test_soft_deleted_documents_do_not_surface() {
    let fixture = fixture().await;

    fixture
        .documents
        .soft_delete_document(fixture.doc_id)
        .await
        .unwrap();

    let deleted = fixture
        .retrieval
        .retrieve(
            "concrete cover",
            fixture.kb_id,
            RetrievalOptions::default(),
        )
        .await
        .unwrap();
    assert!(deleted.results.is_empty());

    // Restoring brings the document back unchanged
    fixture
        .documents
        .restore_document(fixture.doc_id)
        .await
        .unwrap();
    let restored = fixture
        .retrieval
        .retrieve(
            "concrete cover",
            fixture.kb_id,
            RetrievalOptions::default(),
        )
        .await
        .unwrap();
    assert!(!restored.results.is_empty());
}
