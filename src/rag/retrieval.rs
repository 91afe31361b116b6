//! Retrieval service
//!
//! Orchestrates query answering: embed the query, search the vector index
//! (optionally fused with keyword search), rerank, and record statistics.

use crate::error::Result;
use crate::rag::document_store::DocumentStore;
use crate::rag::embedding::EmbeddingService;
use crate::rag::hybrid::{FusedHit, FusionMethod, HybridSearch, Reranker, SearchHit};
use crate::rag::types::{QueryStatus, RagQuery, RagQueryResult, RetrievalStrategy};
use crate::rag::vector_store::VectorStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Parameters for one retrieval call
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub strategy: RetrievalStrategy,
    /// Candidates retrieved before reranking
    pub rerank_top_k: usize,
    pub filter: Option<serde_json::Map<String, serde_json::Value>>,
    pub session_id: String,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            strategy: RetrievalStrategy::Similarity,
            rerank_top_k: 20,
            filter: None,
            session_id: String::new(),
        }
    }
}

/// One retrieved chunk
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub content: String,
    pub score: f64,
    pub reranking_score: Option<f64>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub document_id: String,
}

/// Retrieval outcome with its query record id
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub query_id: Uuid,
    pub results: Vec<RetrievedChunk>,
}

/// Query -> embed -> search -> rerank -> statistics
pub struct RetrievalService {
    document_store: Arc<DocumentStore>,
    vector_store: Arc<dyn VectorStore>,
    embedding_service: Arc<dyn EmbeddingService>,
}

impl RetrievalService {
    pub fn new(
        document_store: Arc<DocumentStore>,
        vector_store: Arc<dyn VectorStore>,
        embedding_service: Arc<dyn EmbeddingService>,
    ) -> Self {
        Self {
            document_store,
            vector_store,
            embedding_service,
        }
    }

    /// Retrieve relevant chunks for a query
    pub async fn retrieve(
        &self,
        query_text: &str,
        knowledge_base_id: Uuid,
        options: RetrievalOptions,
    ) -> Result<RetrievalOutcome> {
        let started = Instant::now();
        let use_reranking = options.strategy == RetrievalStrategy::Reranking;

        let query = RagQuery {
            id: Uuid::new_v4(),
            knowledge_base_id,
            query_text: query_text.to_string(),
            retrieval_strategy: options.strategy,
            similarity_top_k: options.top_k as i64,
            mmr_diversity_bias: None,
            reranking_enabled: use_reranking,
            status: QueryStatus::Processing,
            error_message: String::new(),
            latency_ms: None,
            embedding_latency_ms: None,
            retrieval_latency_ms: None,
            reranking_latency_ms: None,
            embedding_cost: 0.0,
            reranking_cost: 0.0,
            total_cost: 0.0,
            session_id: options.session_id.clone(),
            created_at: chrono::Utc::now(),
        };
        self.document_store.create_query(&query).await?;

        match self
            .run_query(query.id, query_text, knowledge_base_id, &options)
            .await
        {
            Ok((results, timings)) => {
                let latency_ms = started.elapsed().as_millis() as i64;
                self.document_store
                    .complete_query(
                        query.id,
                        latency_ms,
                        timings.embedding_ms,
                        timings.retrieval_ms,
                        timings.reranking_ms,
                        timings.embedding_cost,
                        0.0,
                    )
                    .await?;
                self.document_store.record_kb_query(knowledge_base_id).await?;

                info!(
                    "Retrieved {} chunks for query in {}ms (KB: {}, reranking: {})",
                    results.len(),
                    latency_ms,
                    knowledge_base_id,
                    use_reranking
                );

                Ok(RetrievalOutcome {
                    query_id: query.id,
                    results,
                })
            }
            Err(e) => {
                self.document_store
                    .fail_query(query.id, &e.to_string())
                    .await
                    .ok();
                Err(e)
            }
        }
    }

    async fn run_query(
        &self,
        query_id: Uuid,
        query_text: &str,
        knowledge_base_id: Uuid,
        options: &RetrievalOptions,
    ) -> Result<(Vec<RetrievedChunk>, QueryTimings)> {
        let mut timings = QueryTimings::default();
        let use_reranking = options.strategy == RetrievalStrategy::Reranking;

        // Embed the query
        let embed_started = Instant::now();
        let batch = self
            .embedding_service
            .embed_batch(&[query_text.to_string()])
            .await?;
        timings.embedding_ms = embed_started.elapsed().as_millis() as i64;
        timings.embedding_cost = batch.cost;

        let Some(query_vector) = batch.embeddings.into_iter().next() else {
            return Err(crate::error::LlmError::EmbeddingFailed(
                "empty embedding batch for query".to_string(),
            )
            .into());
        };

        // Retrieve more candidates when a rerank pass follows
        let candidates_k = if use_reranking {
            options.rerank_top_k
        } else {
            options.top_k
        };

        let retrieval_started = Instant::now();
        let namespace = knowledge_base_id.to_string();
        let vector_hits: Vec<SearchHit> = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            self.vector_store.search(
                &query_vector,
                candidates_k,
                options.filter.as_ref(),
                &namespace,
            ),
        )
        .await
        .map_err(|_| {
            crate::error::VectorStoreError::BackendUnavailable(
                "vector search timed out".to_string(),
            )
        })??
            .into_iter()
            .map(|r| {
                // Prefer the chunk row id from metadata so hits from both
                // search arms fuse under one key
                let chunk_id = r
                    .metadata
                    .get("chunk_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&r.id)
                    .to_string();
                SearchHit {
                    chunk_id,
                    content: r.content,
                    score: r.score,
                    metadata: r.metadata,
                }
            })
            .collect();

        let fused: Vec<FusedHit> = match options.strategy {
            RetrievalStrategy::Hybrid => {
                let keyword_hits = self
                    .document_store
                    .keyword_search(knowledge_base_id, query_text, candidates_k)
                    .await?;
                HybridSearch::new(FusionMethod::Rrf).fuse(&vector_hits, &keyword_hits, candidates_k)
            }
            _ => vector_hits
                .into_iter()
                .map(|hit| FusedHit {
                    chunk_id: hit.chunk_id,
                    content: hit.content,
                    score: hit.score,
                    original_score: hit.score,
                    metadata: hit.metadata,
                    vector_score: None,
                    keyword_score: None,
                })
                .collect(),
        };
        timings.retrieval_ms = retrieval_started.elapsed().as_millis() as i64;

        // Soft-deleted documents never surface, even while their vectors
        // await the reconciliation scan
        let mut active = Vec::with_capacity(fused.len());
        for hit in fused {
            let document_active = match hit
                .metadata
                .get("document_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                Some(doc_id) => self.document_store.is_document_active(doc_id).await?,
                None => true,
            };
            if document_active {
                active.push(hit);
            }
        }
        let mut fused = active;

        // Optional rerank
        if use_reranking {
            let rerank_started = Instant::now();
            fused = Reranker::default().rerank(fused, options.top_k);
            timings.reranking_ms = Some(rerank_started.elapsed().as_millis() as i64);
        } else {
            fused.truncate(options.top_k);
        }

        // Record per-chunk statistics and query results
        let mut results = Vec::with_capacity(fused.len());
        let mut result_rows = Vec::with_capacity(fused.len());

        for (rank, hit) in fused.into_iter().enumerate() {
            let document_id = hit
                .metadata
                .get("document_id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            if let Ok(chunk_uuid) = Uuid::parse_str(&hit.chunk_id) {
                self.document_store
                    .update_chunk_statistics(chunk_uuid, Some(hit.score))
                    .await?;
                result_rows.push(RagQueryResult {
                    id: Uuid::new_v4(),
                    query_id,
                    chunk_id: chunk_uuid,
                    rank: (rank + 1) as i64,
                    relevance_score: hit.original_score,
                    reranking_score: if use_reranking { Some(hit.score) } else { None },
                    is_relevant: None,
                });
            } else {
                warn!("Skipping statistics for non-UUID chunk id: {}", hit.chunk_id);
            }

            results.push(RetrievedChunk {
                chunk_id: hit.chunk_id,
                content: hit.content,
                score: hit.score,
                reranking_score: if use_reranking { Some(hit.score) } else { None },
                metadata: hit.metadata,
                document_id,
            });
        }

        self.document_store.store_query_results(&result_rows).await?;

        Ok((results, timings))
    }
}

#[derive(Debug, Default)]
struct QueryTimings {
    embedding_ms: i64,
    retrieval_ms: i64,
    reranking_ms: Option<i64>,
    embedding_cost: f64,
}
