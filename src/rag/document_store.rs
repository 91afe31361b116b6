//! Document store over SQLite
//!
//! Repository facade for documents, pages, chunks, knowledge bases, vector
//! index descriptors, takeoff extractions, and query records. Every
//! multi-row mutation runs in a transaction; the storage orchestrator is the
//! only caller that touches multiple tables in one logical action.

use crate::error::{Result, StorageError};
use crate::extraction::unified::ExtractionResponse;
use crate::rag::hybrid::SearchHit;
use crate::rag::types::*;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Quality score calibration, taken from production as-is
const QUALITY_BASE_SUCCESS: f64 = 0.3;
const QUALITY_TEXT: f64 = 0.2;
const QUALITY_TABLES: f64 = 0.15;
const QUALITY_LAYOUT: f64 = 0.15;
const QUALITY_ENTITIES: f64 = 0.1;
const QUALITY_SUMMARY: f64 = 0.1;
const QUALITY_WARNING_PENALTY: f64 = 0.1;
const QUALITY_WARNING_CAP: f64 = 0.3;

/// Local retry budget for transient database contention
const DB_RETRY_ATTEMPTS: u32 = 3;

/// Calculate a deterministic quality score for an extraction
pub fn quality_score(response: &ExtractionResponse) -> f64 {
    let mut score = 0.0;

    if response.success {
        score += QUALITY_BASE_SUCCESS;
    }
    if !response.text.is_empty() {
        score += QUALITY_TEXT;
    }
    if !response.tables.is_empty() {
        score += QUALITY_TABLES;
    }
    if !response.layout_blocks.is_empty() {
        score += QUALITY_LAYOUT;
    }
    if !response.entities.is_empty() {
        score += QUALITY_ENTITIES;
    }
    if !response.summary.is_empty() {
        score += QUALITY_SUMMARY;
    }

    let penalty =
        (QUALITY_WARNING_PENALTY * response.warnings.len() as f64).min(QUALITY_WARNING_CAP);
    (score - penalty).clamp(0.0, 1.0)
}

/// SQLite-backed document store
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the schema if it does not exist
    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_bases (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                chunk_size INTEGER NOT NULL DEFAULT 1000,
                chunk_overlap INTEGER NOT NULL DEFAULT 200,
                similarity_top_k INTEGER NOT NULL DEFAULT 5,
                mmr_diversity_bias REAL NOT NULL DEFAULT 0.3,
                retrieval_strategy TEXT NOT NULL DEFAULT 'similarity',
                document_count INTEGER NOT NULL DEFAULT 0,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                total_embedding_cost REAL NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                last_queried TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                knowledge_base_id TEXT NOT NULL,
                title TEXT NOT NULL,
                document_type TEXT NOT NULL DEFAULT 'text',
                source_ref TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                processing_error TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}',
                extraction_method TEXT NOT NULL DEFAULT '',
                extraction_cost_usd REAL NOT NULL DEFAULT 0,
                extraction_quality_score REAL NOT NULL DEFAULT 0,
                extraction_metadata TEXT NOT NULL DEFAULT '{}',
                chunk_count INTEGER NOT NULL DEFAULT 0,
                token_count INTEGER NOT NULL DEFAULT 0,
                embedding_cost REAL NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                processed_at TEXT,
                FOREIGN KEY (knowledge_base_id) REFERENCES knowledge_bases (id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS document_pages (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                page_text TEXT NOT NULL DEFAULT '',
                word_count INTEGER NOT NULL DEFAULT 0,
                token_count INTEGER NOT NULL DEFAULT 0,
                image_width INTEGER,
                image_height INTEGER,
                UNIQUE (document_id, page_number),
                FOREIGN KEY (document_id) REFERENCES documents (id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                kind TEXT NOT NULL DEFAULT 'text',
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                page_number INTEGER,
                parent_chunk_id TEXT,
                embedding_vector_id TEXT,
                retrieval_count INTEGER NOT NULL DEFAULT 0,
                relevance_score_avg REAL,
                UNIQUE (document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents (id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vector_indexes (
                id TEXT PRIMARY KEY,
                knowledge_base_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'initializing',
                dimensions INTEGER NOT NULL DEFAULT 1536,
                metric TEXT NOT NULL DEFAULT 'cosine',
                vector_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                UNIQUE (knowledge_base_id, name),
                FOREIGN KEY (knowledge_base_id) REFERENCES knowledge_bases (id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rag_queries (
                id TEXT PRIMARY KEY,
                knowledge_base_id TEXT NOT NULL,
                query_text TEXT NOT NULL,
                retrieval_strategy TEXT NOT NULL DEFAULT 'similarity',
                similarity_top_k INTEGER NOT NULL DEFAULT 5,
                mmr_diversity_bias REAL,
                reranking_enabled INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                error_message TEXT NOT NULL DEFAULT '',
                latency_ms INTEGER,
                embedding_latency_ms INTEGER,
                retrieval_latency_ms INTEGER,
                reranking_latency_ms INTEGER,
                embedding_cost REAL NOT NULL DEFAULT 0,
                reranking_cost REAL NOT NULL DEFAULT 0,
                total_cost REAL NOT NULL DEFAULT 0,
                session_id TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (knowledge_base_id) REFERENCES knowledge_bases (id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rag_query_results (
                id TEXT PRIMARY KEY,
                query_id TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                rank INTEGER NOT NULL,
                relevance_score REAL NOT NULL,
                reranking_score REAL,
                is_relevant INTEGER,
                UNIQUE (query_id, chunk_id),
                FOREIGN KEY (query_id) REFERENCES rag_queries (id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS takeoff_extractions (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                trade TEXT NOT NULL DEFAULT 'concrete',
                extraction_method TEXT NOT NULL DEFAULT 'ai_assisted',
                status TEXT NOT NULL DEFAULT 'processing',
                processing_error TEXT NOT NULL DEFAULT '',
                processing_time_ms INTEGER NOT NULL DEFAULT 0,
                extraction_cost_usd REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents (id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS takeoff_elements (
                id TEXT PRIMARY KEY,
                extraction_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                element_id TEXT NOT NULL,
                element_type TEXT NOT NULL,
                page_number INTEGER NOT NULL DEFAULT 1,
                confidence_score REAL NOT NULL DEFAULT 0,
                specifications TEXT NOT NULL DEFAULT '{}',
                extraction_notes TEXT NOT NULL DEFAULT '{}',
                completeness REAL NOT NULL DEFAULT 0,
                FOREIGN KEY (extraction_id) REFERENCES takeoff_extractions (id)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Document store schema ready");
        Ok(())
    }

    /// Retry a database operation on SQLITE_BUSY-style contention
    async fn with_db_retries<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = std::time::Duration::from_millis(50);
        for attempt in 1..=DB_RETRY_ATTEMPTS {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < DB_RETRY_ATTEMPTS && is_transient(&e) => {
                    warn!("Transient database error (attempt {}): {}", attempt, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("retry loop always returns")
    }

    // ---- Knowledge bases ----

    pub async fn create_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_bases (
                id, name, description, chunk_size, chunk_overlap, similarity_top_k,
                mmr_diversity_bias, retrieval_strategy, document_count, chunk_count,
                total_tokens, total_embedding_cost, is_active, created_at, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, 1, ?, ?)
            "#,
        )
        .bind(kb.id.to_string())
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(kb.chunk_size)
        .bind(kb.chunk_overlap)
        .bind(kb.similarity_top_k)
        .bind(kb.mmr_diversity_bias)
        .bind(kb.retrieval_strategy.as_str())
        .bind(kb.created_at.to_rfc3339())
        .bind(kb.last_updated.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_knowledge_base(&self, kb_id: Uuid) -> Result<KnowledgeBase> {
        let row = sqlx::query("SELECT * FROM knowledge_bases WHERE id = ? AND is_active = 1")
            .bind(kb_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::KnowledgeBaseNotFound(kb_id.to_string()))?;

        Ok(KnowledgeBase {
            id: kb_id,
            name: row.get("name"),
            description: row.get("description"),
            chunk_size: row.get("chunk_size"),
            chunk_overlap: row.get("chunk_overlap"),
            similarity_top_k: row.get("similarity_top_k"),
            mmr_diversity_bias: row.get("mmr_diversity_bias"),
            retrieval_strategy: RetrievalStrategy::parse(row.get("retrieval_strategy")),
            document_count: row.get("document_count"),
            chunk_count: row.get("chunk_count"),
            total_tokens: row.get("total_tokens"),
            total_embedding_cost: row.get("total_embedding_cost"),
            is_active: row.get::<i64, _>("is_active") != 0,
            created_at: parse_time(row.get("created_at")),
            last_updated: parse_time(row.get("last_updated")),
            last_queried: row
                .get::<Option<String>, _>("last_queried")
                .map(|t| parse_time(t)),
        })
    }

    /// Reconcile knowledge-base statistics to the sum over non-deleted documents
    pub async fn update_kb_statistics(&self, kb_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE knowledge_bases SET
                document_count = (
                    SELECT COUNT(*) FROM documents
                    WHERE knowledge_base_id = ?1 AND is_active = 1
                ),
                chunk_count = (
                    SELECT COUNT(*) FROM chunks
                    JOIN documents ON documents.id = chunks.document_id
                    WHERE documents.knowledge_base_id = ?1 AND documents.is_active = 1
                ),
                total_tokens = (
                    SELECT COALESCE(SUM(chunks.token_count), 0) FROM chunks
                    JOIN documents ON documents.id = chunks.document_id
                    WHERE documents.knowledge_base_id = ?1 AND documents.is_active = 1
                ),
                total_embedding_cost = (
                    SELECT COALESCE(SUM(embedding_cost), 0) FROM documents
                    WHERE knowledge_base_id = ?1 AND is_active = 1
                ),
                last_updated = ?2
            WHERE id = ?1
            "#,
        )
        .bind(kb_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deactivate a knowledge base and all of its documents in one
    /// transaction (explicit cascading soft delete)
    pub async fn soft_delete_knowledge_base(&self, kb_id: Uuid) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE knowledge_bases SET is_active = 0, last_updated = ? WHERE id = ?")
            .bind(&now)
            .bind(kb_id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE documents SET is_active = 0, updated_at = ? WHERE knowledge_base_id = ?",
        )
        .bind(&now)
        .bind(kb_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Soft-deleted knowledge base {} and its documents", kb_id);
        Ok(())
    }

    pub async fn record_kb_query(&self, kb_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE knowledge_bases SET last_queried = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(kb_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- Documents ----

    pub async fn create_document(&self, document: &StoredDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, knowledge_base_id, title, document_type, source_ref, status,
                processing_error, content, metadata, extraction_method,
                extraction_cost_usd, extraction_quality_score, extraction_metadata,
                chunk_count, token_count, embedding_cost, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(document.id.to_string())
        .bind(document.knowledge_base_id.to_string())
        .bind(&document.title)
        .bind(&document.document_type)
        .bind(&document.source_ref)
        .bind(document.status.as_str())
        .bind(&document.processing_error)
        .bind(&document.content)
        .bind(document.metadata.to_string())
        .bind(&document.extraction_method)
        .bind(document.extraction_cost_usd)
        .bind(document.extraction_quality_score)
        .bind(document.extraction_metadata.to_string())
        .bind(document.chunk_count)
        .bind(document.token_count)
        .bind(document.embedding_cost)
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_document(&self, document_id: Uuid) -> Result<StoredDocument> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ? AND is_active = 1")
            .bind(document_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::DocumentNotFound(document_id.to_string()))?;

        Ok(row_to_document(&row))
    }

    /// Change a document's status, enforcing the monotone transition rule
    pub async fn set_document_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let current = self.get_document(document_id).await?.status;
        if !current.can_transition_to(status) {
            return Err(StorageError::Failed(format!(
                "illegal status transition {} -> {}",
                current.as_str(),
                status.as_str()
            ))
            .into());
        }

        sqlx::query(
            "UPDATE documents SET status = ?, processing_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error.unwrap_or(""))
        .bind(Utc::now().to_rfc3339())
        .bind(document_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store the complete extraction response atomically
    ///
    /// Writes the extraction payload, updates document aggregates and quality
    /// score, and sets the final status. A `completed` document always has a
    /// non-empty extraction record afterwards.
    pub async fn store_extraction(
        &self,
        document_id: Uuid,
        response: &ExtractionResponse,
        file_metadata: serde_json::Value,
        knowledge_base_id: Uuid,
    ) -> Result<()> {
        let score = quality_score(response);
        let status = if response.success {
            DocumentStatus::Completed
        } else {
            DocumentStatus::Failed
        };
        let extraction_metadata = serde_json::to_value(response)?;
        let now = Utc::now().to_rfc3339();

        self.with_db_retries(|| {
            let extraction_metadata = extraction_metadata.clone();
            let file_metadata = file_metadata.clone();
            let now = now.clone();
            async move {
                let mut tx = self.pool.begin().await?;

                let updated = sqlx::query(
                    r#"
                    UPDATE documents SET
                        content = ?,
                        extraction_metadata = ?,
                        metadata = ?,
                        extraction_method = 'unified',
                        extraction_cost_usd = ?,
                        extraction_quality_score = ?,
                        status = ?,
                        processing_error = ?,
                        processed_at = ?,
                        updated_at = ?
                    WHERE id = ? AND knowledge_base_id = ?
                    "#,
                )
                .bind(&response.text)
                .bind(extraction_metadata.to_string())
                .bind(file_metadata.to_string())
                .bind(response.cost_usd)
                .bind(score)
                .bind(status.as_str())
                .bind(response.error.clone().unwrap_or_default())
                .bind(&now)
                .bind(&now)
                .bind(document_id.to_string())
                .bind(knowledge_base_id.to_string())
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    return Err(StorageError::DocumentNotFound(document_id.to_string()).into());
                }

                tx.commit().await?;
                Ok(())
            }
        })
        .await?;

        info!(
            "Stored extraction for document {} (quality: {:.2}, cost: ${:.4})",
            document_id, score, response.cost_usd
        );
        Ok(())
    }

    /// Soft-delete a document; its chunks stop surfacing in queries
    pub async fn soft_delete_document(&self, document_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE documents SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(document_id.to_string())
            .execute(&self.pool)
            .await?;
        info!("Soft-deleted document {}", document_id);
        Ok(())
    }

    /// Restore a soft-deleted document unchanged
    pub async fn restore_document(&self, document_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE documents SET is_active = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(document_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether a document exists and has not been soft-deleted
    pub async fn is_document_active(&self, document_id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT is_active FROM documents WHERE id = ?")
            .bind(document_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("is_active") != 0).unwrap_or(false))
    }

    pub async fn documents_by_knowledge_base(&self, kb_id: Uuid) -> Result<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE knowledge_base_id = ? AND is_active = 1 ORDER BY created_at DESC",
        )
        .bind(kb_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    // ---- Pages ----

    pub async fn store_pages(&self, document_id: Uuid, pages: &[DocumentPage]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for page in pages {
            sqlx::query(
                r#"
                INSERT INTO document_pages (
                    id, document_id, page_number, page_text, word_count,
                    token_count, image_width, image_height
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (document_id, page_number) DO UPDATE SET
                    page_text = excluded.page_text,
                    word_count = excluded.word_count,
                    token_count = excluded.token_count,
                    image_width = excluded.image_width,
                    image_height = excluded.image_height
                "#,
            )
            .bind(page.id.to_string())
            .bind(document_id.to_string())
            .bind(page.page_number)
            .bind(&page.page_text)
            .bind(page.word_count)
            .bind(page.token_count)
            .bind(page.image_width)
            .bind(page.image_height)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Stored {} pages for document {}", pages.len(), document_id);
        Ok(())
    }

    pub async fn get_pages(&self, document_id: Uuid) -> Result<Vec<DocumentPage>> {
        let rows = sqlx::query(
            "SELECT * FROM document_pages WHERE document_id = ? ORDER BY page_number",
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentPage {
                id: parse_uuid(row.get("id")),
                document_id,
                page_number: row.get::<i64, _>("page_number") as u32,
                page_text: row.get("page_text"),
                word_count: row.get("word_count"),
                token_count: row.get("token_count"),
                image_width: row.get("image_width"),
                image_height: row.get("image_height"),
            })
            .collect())
    }

    // ---- Chunks ----

    /// Store chunks and refresh the document's aggregates, atomically
    pub async fn store_chunks(&self, document_id: Uuid, chunks: &[Chunk]) -> Result<()> {
        self.with_db_retries(|| async {
            let mut tx = self.pool.begin().await?;

            for chunk in chunks {
                sqlx::query(
                    r#"
                    INSERT INTO chunks (
                        id, document_id, chunk_index, kind, content, token_count,
                        metadata, page_number, parent_chunk_id, embedding_vector_id,
                        retrieval_count, relevance_score_avg
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)
                    ON CONFLICT (document_id, chunk_index) DO UPDATE SET
                        kind = excluded.kind,
                        content = excluded.content,
                        token_count = excluded.token_count,
                        metadata = excluded.metadata,
                        page_number = excluded.page_number,
                        embedding_vector_id = excluded.embedding_vector_id
                    "#,
                )
                .bind(chunk.id.to_string())
                .bind(document_id.to_string())
                .bind(chunk.chunk_index)
                .bind(chunk.kind.as_str())
                .bind(&chunk.content)
                .bind(chunk.token_count)
                .bind(chunk.metadata.to_string())
                .bind(chunk.page_number)
                .bind(chunk.parent_chunk_id.map(|id| id.to_string()))
                .bind(&chunk.embedding_vector_id)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                r#"
                UPDATE documents SET
                    chunk_count = (SELECT COUNT(*) FROM chunks WHERE document_id = ?1),
                    token_count = (
                        SELECT COALESCE(SUM(token_count), 0) FROM chunks WHERE document_id = ?1
                    ),
                    updated_at = ?2
                WHERE id = ?1
                "#,
            )
            .bind(document_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!("Stored {} chunks for document {}", chunks.len(), document_id);
        Ok(())
    }

    pub async fn get_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let rows =
            sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index")
                .bind(document_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    pub async fn get_chunk(&self, chunk_id: Uuid) -> Result<Option<Chunk>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
            .bind(chunk_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_chunk))
    }

    /// Record the vector id a chunk's embedding landed under
    pub async fn set_chunk_vector_id(&self, chunk_id: Uuid, vector_id: &str) -> Result<()> {
        sqlx::query("UPDATE chunks SET embedding_vector_id = ? WHERE id = ?")
            .bind(vector_id)
            .bind(chunk_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update chunk retrieval statistics without lost updates
    ///
    /// Single statement: the increment and the rolling mean both read the
    /// pre-update row, so concurrent retrievals interleave safely.
    pub async fn update_chunk_statistics(
        &self,
        chunk_id: Uuid,
        relevance_score: Option<f64>,
    ) -> Result<()> {
        match relevance_score {
            Some(score) => {
                sqlx::query(
                    r#"
                    UPDATE chunks SET
                        relevance_score_avg = CASE
                            WHEN relevance_score_avg IS NULL THEN ?1
                            ELSE (relevance_score_avg * retrieval_count + ?1)
                                 / (retrieval_count + 1)
                        END,
                        retrieval_count = retrieval_count + 1
                    WHERE id = ?2
                    "#,
                )
                .bind(score)
                .bind(chunk_id.to_string())
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("UPDATE chunks SET retrieval_count = retrieval_count + 1 WHERE id = ?")
                    .bind(chunk_id.to_string())
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Keyword search over chunk content of active documents
    ///
    /// Scores by query-term frequency; this is the keyword arm of hybrid
    /// search.
    pub async fn keyword_search(
        &self,
        kb_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", terms.join("%"));
        let rows = sqlx::query(
            r#"
            SELECT chunks.* FROM chunks
            JOIN documents ON documents.id = chunks.document_id
            WHERE documents.knowledge_base_id = ?
              AND documents.is_active = 1
              AND LOWER(chunks.content) LIKE ?
            ORDER BY chunks.id
            "#,
        )
        .bind(kb_id.to_string())
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let chunk = row_to_chunk(row);
                let haystack = chunk.content.to_lowercase();
                let frequency: usize = terms
                    .iter()
                    .map(|term| haystack.matches(term.as_str()).count())
                    .sum();
                let score = frequency as f64 / (1.0 + haystack.len() as f64 / 1000.0);

                let mut metadata = match &chunk.metadata {
                    serde_json::Value::Object(map) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                metadata.insert(
                    "chunk_type".to_string(),
                    serde_json::Value::String(chunk.kind.as_str().to_string()),
                );
                metadata.insert("token_count".to_string(), chunk.token_count.into());
                metadata.insert(
                    "document_id".to_string(),
                    serde_json::Value::String(chunk.document_id.to_string()),
                );

                SearchHit {
                    chunk_id: chunk.id.to_string(),
                    content: chunk.content,
                    score,
                    metadata,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    // ---- Vector index descriptors ----

    pub async fn create_vector_index(&self, descriptor: &VectorIndexDescriptor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vector_indexes (
                id, knowledge_base_id, name, status, dimensions, metric,
                vector_count, error_message, created_at, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(descriptor.id.to_string())
        .bind(descriptor.knowledge_base_id.to_string())
        .bind(&descriptor.name)
        .bind(descriptor.status.as_str())
        .bind(descriptor.dimensions)
        .bind(descriptor.metric.as_str())
        .bind(descriptor.vector_count)
        .bind(&descriptor.error_message)
        .bind(descriptor.created_at.to_rfc3339())
        .bind(descriptor.last_updated.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a descriptor active, demoting any other active descriptor of the
    /// same knowledge base so exactly one stays active
    pub async fn activate_vector_index(&self, descriptor_id: Uuid, kb_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE vector_indexes SET status = 'updating', last_updated = ? WHERE knowledge_base_id = ? AND status = 'active'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(kb_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE vector_indexes SET status = 'active', last_updated = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(descriptor_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn active_vector_index(&self, kb_id: Uuid) -> Result<Option<VectorIndexDescriptor>> {
        let row = sqlx::query(
            "SELECT * FROM vector_indexes WHERE knowledge_base_id = ? AND status = 'active' ORDER BY created_at DESC LIMIT 1",
        )
        .bind(kb_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| VectorIndexDescriptor {
            id: parse_uuid(row.get("id")),
            knowledge_base_id: kb_id,
            name: row.get("name"),
            status: VectorIndexStatus::parse(row.get("status")),
            dimensions: row.get("dimensions"),
            metric: DistanceMetric::parse(row.get("metric")),
            vector_count: row.get("vector_count"),
            error_message: row.get("error_message"),
            created_at: parse_time(row.get("created_at")),
            last_updated: parse_time(row.get("last_updated")),
        }))
    }

    pub async fn set_vector_index_count(&self, descriptor_id: Uuid, count: i64) -> Result<()> {
        sqlx::query("UPDATE vector_indexes SET vector_count = ?, last_updated = ? WHERE id = ?")
            .bind(count)
            .bind(Utc::now().to_rfc3339())
            .bind(descriptor_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- Queries ----

    pub async fn create_query(&self, query: &RagQuery) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rag_queries (
                id, knowledge_base_id, query_text, retrieval_strategy,
                similarity_top_k, mmr_diversity_bias, reranking_enabled, status,
                error_message, embedding_cost, reranking_cost, total_cost,
                session_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, '', 0, 0, 0, ?, ?)
            "#,
        )
        .bind(query.id.to_string())
        .bind(query.knowledge_base_id.to_string())
        .bind(&query.query_text)
        .bind(query.retrieval_strategy.as_str())
        .bind(query.similarity_top_k)
        .bind(query.mmr_diversity_bias)
        .bind(query.reranking_enabled)
        .bind(query.status.as_str())
        .bind(&query.session_id)
        .bind(query.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a query completed with its latency and cost breakdown
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_query(
        &self,
        query_id: Uuid,
        latency_ms: i64,
        embedding_latency_ms: i64,
        retrieval_latency_ms: i64,
        reranking_latency_ms: Option<i64>,
        embedding_cost: f64,
        reranking_cost: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rag_queries SET
                status = 'completed',
                latency_ms = ?,
                embedding_latency_ms = ?,
                retrieval_latency_ms = ?,
                reranking_latency_ms = ?,
                embedding_cost = ?,
                reranking_cost = ?,
                total_cost = ? + ?
            WHERE id = ?
            "#,
        )
        .bind(latency_ms)
        .bind(embedding_latency_ms)
        .bind(retrieval_latency_ms)
        .bind(reranking_latency_ms)
        .bind(embedding_cost)
        .bind(reranking_cost)
        .bind(embedding_cost)
        .bind(reranking_cost)
        .bind(query_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_query(&self, query_id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE rag_queries SET status = 'failed', error_message = ? WHERE id = ?")
            .bind(error)
            .bind(query_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn store_query_results(&self, results: &[RagQueryResult]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for result in results {
            sqlx::query(
                r#"
                INSERT INTO rag_query_results (
                    id, query_id, chunk_id, rank, relevance_score, reranking_score, is_relevant
                ) VALUES (?, ?, ?, ?, ?, ?, NULL)
                "#,
            )
            .bind(result.id.to_string())
            .bind(result.query_id.to_string())
            .bind(result.chunk_id.to_string())
            .bind(result.rank)
            .bind(result.relevance_score)
            .bind(result.reranking_score)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- Takeoff ----

    pub async fn create_takeoff_extraction(&self, extraction: &TakeoffExtraction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO takeoff_extractions (
                id, document_id, trade, extraction_method, status,
                processing_error, processing_time_ms, extraction_cost_usd, created_at
            ) VALUES (?, ?, ?, ?, ?, '', 0, 0, ?)
            "#,
        )
        .bind(extraction.id.to_string())
        .bind(extraction.document_id.to_string())
        .bind(extraction.trade.as_str())
        .bind(&extraction.extraction_method)
        .bind(extraction.status.as_str())
        .bind(extraction.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete_takeoff_extraction(
        &self,
        extraction_id: Uuid,
        processing_time_ms: i64,
        cost_usd: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE takeoff_extractions SET
                status = 'completed',
                processing_time_ms = ?,
                extraction_cost_usd = ?
            WHERE id = ?
            "#,
        )
        .bind(processing_time_ms)
        .bind(cost_usd)
        .bind(extraction_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_takeoff_extraction(&self, extraction_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE takeoff_extractions SET status = 'failed', processing_error = ? WHERE id = ?",
        )
        .bind(error)
        .bind(extraction_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the element rows of an extraction atomically
    pub async fn replace_takeoff_elements(
        &self,
        extraction_id: Uuid,
        elements: &[TakeoffElement],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM takeoff_elements WHERE extraction_id = ?")
            .bind(extraction_id.to_string())
            .execute(&mut *tx)
            .await?;

        for element in elements {
            sqlx::query(
                r#"
                INSERT INTO takeoff_elements (
                    id, extraction_id, document_id, element_id, element_type,
                    page_number, confidence_score, specifications, extraction_notes,
                    completeness
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(element.id.to_string())
            .bind(extraction_id.to_string())
            .bind(element.document_id.to_string())
            .bind(&element.element_id)
            .bind(&element.element_type)
            .bind(element.page_number)
            .bind(element.confidence_score)
            .bind(element.specifications.to_string())
            .bind(element.extraction_notes.to_string())
            .bind(element.completeness)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            "Stored {} takeoff elements for extraction {}",
            elements.len(),
            extraction_id
        );
        Ok(())
    }

    pub async fn get_takeoff_elements(&self, extraction_id: Uuid) -> Result<Vec<TakeoffElement>> {
        let rows = sqlx::query(
            "SELECT * FROM takeoff_elements WHERE extraction_id = ? ORDER BY element_id",
        )
        .bind(extraction_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TakeoffElement {
                id: parse_uuid(row.get("id")),
                extraction_id,
                document_id: parse_uuid(row.get("document_id")),
                element_id: row.get("element_id"),
                element_type: row.get("element_type"),
                page_number: row.get::<i64, _>("page_number") as u32,
                confidence_score: row.get("confidence_score"),
                specifications: parse_json(row.get("specifications")),
                extraction_notes: parse_json(row.get("extraction_notes")),
                completeness: row.get("completeness"),
            })
            .collect())
    }
}

fn is_transient(error: &crate::error::EngineError) -> bool {
    match error {
        crate::error::EngineError::Database(e) => {
            let text = e.to_string().to_lowercase();
            text.contains("locked") || text.contains("busy")
        }
        crate::error::EngineError::Storage(StorageError::Transient(_)) => true,
        _ => false,
    }
}

fn parse_time(value: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_uuid(value: String) -> Uuid {
    Uuid::parse_str(&value).unwrap_or_default()
}

fn parse_json(value: String) -> serde_json::Value {
    serde_json::from_str(&value).unwrap_or(serde_json::Value::Null)
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> StoredDocument {
    StoredDocument {
        id: parse_uuid(row.get("id")),
        knowledge_base_id: parse_uuid(row.get("knowledge_base_id")),
        title: row.get("title"),
        document_type: row.get("document_type"),
        source_ref: row.get("source_ref"),
        status: DocumentStatus::parse(row.get("status")),
        processing_error: row.get("processing_error"),
        content: row.get("content"),
        metadata: parse_json(row.get("metadata")),
        extraction_method: row.get("extraction_method"),
        extraction_cost_usd: row.get("extraction_cost_usd"),
        extraction_quality_score: row.get("extraction_quality_score"),
        extraction_metadata: parse_json(row.get("extraction_metadata")),
        chunk_count: row.get("chunk_count"),
        token_count: row.get("token_count"),
        embedding_cost: row.get("embedding_cost"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_time(row.get("created_at")),
        updated_at: parse_time(row.get("updated_at")),
        processed_at: row
            .get::<Option<String>, _>("processed_at")
            .map(parse_time),
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    Chunk {
        id: parse_uuid(row.get("id")),
        document_id: parse_uuid(row.get("document_id")),
        chunk_index: row.get("chunk_index"),
        kind: ChunkKind::parse(row.get("kind")),
        content: row.get("content"),
        token_count: row.get("token_count"),
        metadata: parse_json(row.get("metadata")),
        page_number: row
            .get::<Option<i64>, _>("page_number")
            .map(|n| n as u32),
        parent_chunk_id: row
            .get::<Option<String>, _>("parent_chunk_id")
            .map(parse_uuid),
        embedding_vector_id: row.get("embedding_vector_id"),
        retrieval_count: row.get("retrieval_count"),
        relevance_score_avg: row.get("relevance_score_avg"),
    }
}
