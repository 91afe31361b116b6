//! Storage orchestrator
//!
//! Runs the staged store of a processed document: extraction, chunks, then
//! embeddings and vectors. Chunks are only written when the extraction
//! persisted; vectors are only attempted once chunks exist; a vector failure
//! records a warning without rolling anything back, so the document store is
//! never left half-committed.

use crate::error::Result;
use crate::extraction::unified::ExtractionResponse;
use crate::rag::chunker::Chunker;
use crate::rag::document_store::DocumentStore;
use crate::rag::embedding::EmbeddingService;
use crate::rag::types::Chunk;
use crate::rag::vector_store::{VectorRecord, VectorStore};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Per-vector-operation timeout
const VECTOR_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a staged document store
#[derive(Debug, Clone, Default)]
pub struct StorageResult {
    pub success: bool,
    pub document_id: String,
    pub chunks_stored: usize,
    pub vectors_stored: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub storage_time_ms: u64,
}

/// Orchestrates document, chunk, and vector persistence
pub struct StorageService {
    document_store: Arc<DocumentStore>,
    vector_store: Arc<dyn VectorStore>,
    embedding_service: Arc<dyn EmbeddingService>,
    chunker: Chunker,
}

impl StorageService {
    pub fn new(
        document_store: Arc<DocumentStore>,
        vector_store: Arc<dyn VectorStore>,
        embedding_service: Arc<dyn EmbeddingService>,
        chunker: Chunker,
    ) -> Self {
        Self {
            document_store,
            vector_store,
            embedding_service,
            chunker,
        }
    }

    /// Store a complete document with extraction results and chunks
    ///
    /// Stages run sequentially and are never reentered for one document:
    /// (a) extraction, (b) chunk generation, (c) chunk rows, (d) embeddings
    /// and namespaced vector upsert.
    pub async fn store_document(
        &self,
        document_id: Uuid,
        extraction_response: &ExtractionResponse,
        file_metadata: serde_json::Value,
        chunks: Option<Vec<Chunk>>,
        store_vectors: bool,
        knowledge_base_id: Uuid,
    ) -> StorageResult {
        let started = Instant::now();
        let mut result = StorageResult {
            document_id: document_id.to_string(),
            ..Default::default()
        };

        // Stage 1: store the extraction response
        info!("Storing extraction for document: {}", document_id);
        if let Err(e) = self
            .document_store
            .store_extraction(
                document_id,
                extraction_response,
                file_metadata,
                knowledge_base_id,
            )
            .await
        {
            result
                .errors
                .push(format!("Failed to store extraction response: {}", e));
            result.storage_time_ms = started.elapsed().as_millis() as u64;
            return result;
        }

        // Stage 2: generate chunks unless the caller provided them
        let chunks = match chunks {
            Some(chunks) => chunks,
            None => self
                .chunker
                .chunk_document(document_id, extraction_response),
        };
        if chunks.is_empty() {
            result
                .warnings
                .push("No chunks generated from document".to_string());
        }

        // Stage 3: store chunk rows
        if !chunks.is_empty() {
            info!("Storing {} chunks for document: {}", chunks.len(), document_id);
            if let Err(e) = self.document_store.store_chunks(document_id, &chunks).await {
                result.errors.push(format!("Failed to store chunks: {}", e));
                result.storage_time_ms = started.elapsed().as_millis() as u64;
                return result;
            }
            result.chunks_stored = chunks.len();
        }

        // Stage 4: embeddings and vectors; failure is a warning, not a rollback
        if store_vectors && !chunks.is_empty() {
            match self.store_vectors(document_id, &chunks, knowledge_base_id).await {
                Ok(count) => result.vectors_stored = count,
                Err(e) => {
                    warn!("Vector storage failed for document {}: {}", document_id, e);
                    result.warnings.push(format!("Vector storage failed: {}", e));
                }
            }
        }

        self.document_store
            .update_kb_statistics(knowledge_base_id)
            .await
            .ok();

        result.success = true;
        result.storage_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Stored document {}: {} chunks, {} vectors in {}ms",
            document_id, result.chunks_stored, result.vectors_stored, result.storage_time_ms
        );
        result
    }

    /// Store only chunks for an existing document (re-chunking path)
    pub async fn store_chunks_only(
        &self,
        document_id: Uuid,
        chunks: Vec<Chunk>,
        store_vectors: bool,
        knowledge_base_id: Uuid,
    ) -> StorageResult {
        let started = Instant::now();
        let mut result = StorageResult {
            document_id: document_id.to_string(),
            ..Default::default()
        };

        if let Err(e) = self.document_store.store_chunks(document_id, &chunks).await {
            result.errors.push(format!("Failed to store chunks: {}", e));
            result.storage_time_ms = started.elapsed().as_millis() as u64;
            return result;
        }
        result.chunks_stored = chunks.len();

        if store_vectors {
            match self.store_vectors(document_id, &chunks, knowledge_base_id).await {
                Ok(count) => result.vectors_stored = count,
                Err(e) => result.warnings.push(format!("Vector storage failed: {}", e)),
            }
        }

        result.success = true;
        result.storage_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Delete a document and its vectors (soft delete in the store)
    pub async fn delete_document(
        &self,
        document_id: Uuid,
        knowledge_base_id: Uuid,
    ) -> StorageResult {
        let mut result = StorageResult {
            document_id: document_id.to_string(),
            ..Default::default()
        };

        if let Err(e) = self.document_store.soft_delete_document(document_id).await {
            result.errors.push(format!("Failed to delete document: {}", e));
            return result;
        }

        let mut filter = serde_json::Map::new();
        filter.insert("document_id".to_string(), json!(document_id.to_string()));
        if let Err(e) = self
            .vector_store
            .delete_by_filter(&filter, &knowledge_base_id.to_string())
            .await
        {
            result
                .warnings
                .push(format!("Vector deletion failed: {}", e));
        }

        self.document_store
            .update_kb_statistics(knowledge_base_id)
            .await
            .ok();

        result.success = true;
        result
    }

    /// Embed chunks and upsert them under the knowledge-base namespace
    async fn store_vectors(
        &self,
        document_id: Uuid,
        chunks: &[Chunk],
        knowledge_base_id: Uuid,
    ) -> Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batch = self.embedding_service.embed_batch(&texts).await?;

        if batch.embeddings.len() != chunks.len() {
            return Err(crate::error::LlmError::EmbeddingFailed(format!(
                "embedding count mismatch: {} texts, {} vectors",
                chunks.len(),
                batch.embeddings.len()
            ))
            .into());
        }

        let mut records = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(batch.embeddings) {
            let vector_id = format!("{}_{}", document_id, chunk.chunk_index);

            let mut metadata = serde_json::Map::new();
            metadata.insert("document_id".to_string(), json!(document_id.to_string()));
            // The chunk row id rides along so retrieval can join hits from
            // the vector and keyword arms and update statistics
            metadata.insert("chunk_id".to_string(), json!(chunk.id.to_string()));
            metadata.insert("chunk_index".to_string(), json!(chunk.chunk_index));
            metadata.insert("chunk_type".to_string(), json!(chunk.kind.as_str()));
            metadata.insert("token_count".to_string(), json!(chunk.token_count));
            metadata.insert(
                "content".to_string(),
                json!(chunk.content.chars().take(1000).collect::<String>()),
            );
            if let serde_json::Value::Object(extra) = &chunk.metadata {
                for (key, value) in extra {
                    metadata.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }

            // The chunk row keeps only the weak reference
            self.document_store
                .set_chunk_vector_id(chunk.id, &vector_id)
                .await?;

            records.push(VectorRecord {
                id: vector_id,
                values: embedding,
                metadata,
            });
        }

        let namespace = knowledge_base_id.to_string();
        let count = tokio::time::timeout(
            VECTOR_OP_TIMEOUT,
            self.vector_store.upsert(records, &namespace),
        )
        .await
        .map_err(|_| {
            crate::error::VectorStoreError::BackendUnavailable("vector upsert timed out".to_string())
        })??;
        Ok(count)
    }
}
