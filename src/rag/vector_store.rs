//! Vector index adapter
//!
//! A thin interface over a pluggable vector database with per-knowledge-base
//! namespacing. The first backend is SQLite: vectors live in one table keyed
//! by (namespace, id) and similarity is computed in-process, which is plenty
//! for single-node deployments and keeps tests hermetic.

use crate::error::{Result, VectorStoreError};
use crate::rag::types::DistanceMetric;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Maximum metadata string length after sanitization
const MAX_METADATA_STRING: usize = 2000;
/// Maximum list length after sanitization
const MAX_METADATA_LIST: usize = 100;
/// Nested maps up to this size are flattened; larger ones are serialized
const MAX_FLATTEN_KEYS: usize = 5;
/// Upsert batch size
const UPSERT_BATCH: usize = 100;

/// A vector with its id and metadata, ready for upsert
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Map<String, Value>,
}

/// One search hit
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub id: String,
    pub score: f64,
    pub metadata: serde_json::Map<String, Value>,
    pub content: String,
    pub vector: Option<Vec<f32>>,
}

/// Index statistics
#[derive(Debug, Clone, Default)]
pub struct VectorStoreStats {
    pub total_vectors: u64,
    pub dimensions: usize,
    pub namespaces: BTreeMap<String, u64>,
}

/// Pluggable vector store interface
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ensure the index exists with the declared dimension and metric
    async fn initialize(&self, create_if_absent: bool) -> Result<()>;

    /// Insert or update vectors; idempotent by vector id
    async fn upsert(&self, vectors: Vec<VectorRecord>, namespace: &str) -> Result<usize>;

    /// Search for nearest vectors
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&serde_json::Map<String, Value>>,
        namespace: &str,
    ) -> Result<Vec<VectorSearchResult>>;

    /// Delete vectors by id
    async fn delete_ids(&self, ids: &[String], namespace: &str) -> Result<()>;

    /// Delete vectors whose metadata matches all filter entries
    async fn delete_by_filter(
        &self,
        filter: &serde_json::Map<String, Value>,
        namespace: &str,
    ) -> Result<()>;

    /// Delete an entire namespace
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    /// Index statistics, optionally scoped to one namespace
    async fn stats(&self, namespace: Option<&str>) -> Result<VectorStoreStats>;
}

/// Sanitize metadata to backend-safe values
///
/// Every value must be a string, number, boolean, or list of strings. Strings
/// truncate to 2000 chars, lists cap at 100 entries, small nested maps
/// flatten to `key_sub` entries, and anything else serializes to JSON text.
pub fn sanitize_metadata(metadata: &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    let mut clean = serde_json::Map::new();

    for (key, value) in metadata {
        match value {
            Value::Null => {}
            Value::String(s) => {
                clean.insert(key.clone(), Value::String(truncate(s, MAX_METADATA_STRING)));
            }
            Value::Bool(_) | Value::Number(_) => {
                clean.insert(key.clone(), value.clone());
            }
            Value::Array(items) => {
                if items.iter().all(|v| v.is_string()) {
                    let capped: Vec<Value> = items.iter().take(MAX_METADATA_LIST).cloned().collect();
                    clean.insert(key.clone(), Value::Array(capped));
                } else {
                    let serialized = serde_json::to_string(items).unwrap_or_default();
                    clean.insert(
                        key.clone(),
                        Value::String(truncate(&serialized, MAX_METADATA_STRING)),
                    );
                }
            }
            Value::Object(map) => {
                if map.len() < MAX_FLATTEN_KEYS {
                    for (sub_key, sub_value) in map {
                        if matches!(sub_value, Value::String(_) | Value::Number(_) | Value::Bool(_))
                        {
                            let flat_key = format!("{}_{}", key, sub_key);
                            let flat_value = match sub_value {
                                Value::String(s) => Value::String(truncate(s, MAX_METADATA_STRING)),
                                other => other.clone(),
                            };
                            clean.insert(flat_key, flat_value);
                        }
                    }
                } else {
                    let serialized = serde_json::to_string(map).unwrap_or_default();
                    clean.insert(
                        key.clone(),
                        Value::String(truncate(&serialized, MAX_METADATA_STRING)),
                    );
                }
            }
        }
    }

    clean
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// SQLite-backed vector store
pub struct SqliteVectorStore {
    pool: SqlitePool,
    dimensions: usize,
    metric: DistanceMetric,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            pool,
            dimensions,
            metric,
        }
    }

    /// Serialize an embedding to little-endian bytes
    pub fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding
            .iter()
            .flat_map(|f| f.to_le_bytes().to_vec())
            .collect()
    }

    /// Deserialize an embedding from little-endian bytes
    pub fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Calculate cosine similarity between two vectors
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
        let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
        let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f64 {
        match self.metric {
            DistanceMetric::Cosine => Self::cosine_similarity(a, b),
            DistanceMetric::Dot => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (*x as f64) * (*y as f64))
                .sum(),
            DistanceMetric::Euclidean => {
                let dist: f64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| ((*x as f64) - (*y as f64)).powi(2))
                    .sum::<f64>()
                    .sqrt();
                -dist
            }
        }
    }

    fn matches_filter(
        metadata: &serde_json::Map<String, Value>,
        filter: &serde_json::Map<String, Value>,
    ) -> bool {
        filter
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn initialize(&self, create_if_absent: bool) -> Result<()> {
        if !create_if_absent {
            let exists: Option<(String,)> = sqlx::query_as(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'vectors'",
            )
            .fetch_optional(&self.pool)
            .await?;
            if exists.is_none() {
                return Err(VectorStoreError::NotInitialized.into());
            }
            return Ok(());
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                namespace TEXT NOT NULL,
                id TEXT NOT NULL,
                vector BLOB NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                content TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (namespace, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_namespace ON vectors (namespace)")
            .execute(&self.pool)
            .await?;

        info!(
            "Vector index ready (dimensions: {}, metric: {})",
            self.dimensions,
            self.metric.as_str()
        );
        Ok(())
    }

    async fn upsert(&self, vectors: Vec<VectorRecord>, namespace: &str) -> Result<usize> {
        let mut upserted = 0usize;

        for batch in vectors.chunks(UPSERT_BATCH) {
            let mut tx = self.pool.begin().await?;

            for record in batch {
                if record.values.len() != self.dimensions {
                    return Err(VectorStoreError::InvalidDimension {
                        expected: self.dimensions,
                        actual: record.values.len(),
                    }
                    .into());
                }

                let clean = sanitize_metadata(&record.metadata);
                let content = clean
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();

                sqlx::query(
                    r#"
                    INSERT INTO vectors (namespace, id, vector, metadata, content)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT (namespace, id) DO UPDATE SET
                        vector = excluded.vector,
                        metadata = excluded.metadata,
                        content = excluded.content
                    "#,
                )
                .bind(namespace)
                .bind(&record.id)
                .bind(Self::serialize_embedding(&record.values))
                .bind(serde_json::to_string(&clean)?)
                .bind(content)
                .execute(&mut *tx)
                .await?;

                upserted += 1;
            }

            tx.commit().await?;
        }

        debug!("Upserted {} vectors into namespace {}", upserted, namespace);
        Ok(upserted)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&serde_json::Map<String, Value>>,
        namespace: &str,
    ) -> Result<Vec<VectorSearchResult>> {
        let rows = sqlx::query(
            "SELECT id, vector, metadata, content FROM vectors WHERE namespace = ?",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let bytes: Vec<u8> = row.get("vector");
            let metadata_text: String = row.get("metadata");
            let content: String = row.get("content");

            let metadata: serde_json::Map<String, Value> =
                serde_json::from_str(&metadata_text).unwrap_or_default();

            if let Some(filter) = filter {
                if !Self::matches_filter(&metadata, filter) {
                    continue;
                }
            }

            let vector = Self::deserialize_embedding(&bytes);
            let score = self.score(query_vector, &vector);

            results.push(VectorSearchResult {
                id,
                score,
                metadata,
                content,
                vector: None,
            });
        }

        // Score descending, then id ascending for rank stability
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete_ids(&self, ids: &[String], namespace: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM vectors WHERE namespace = ? AND id = ?")
                .bind(namespace)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!("Deleted {} vectors from namespace {}", ids.len(), namespace);
        Ok(())
    }

    async fn delete_by_filter(
        &self,
        filter: &serde_json::Map<String, Value>,
        namespace: &str,
    ) -> Result<()> {
        let rows = sqlx::query("SELECT id, metadata FROM vectors WHERE namespace = ?")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await?;

        let mut doomed = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let metadata_text: String = row.get("metadata");
            let metadata: serde_json::Map<String, Value> =
                serde_json::from_str(&metadata_text).unwrap_or_default();
            if Self::matches_filter(&metadata, filter) {
                doomed.push(id);
            }
        }

        self.delete_ids(&doomed, namespace).await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        info!("Deleted namespace {}", namespace);
        Ok(())
    }

    async fn stats(&self, namespace: Option<&str>) -> Result<VectorStoreStats> {
        let rows = sqlx::query("SELECT namespace, COUNT(*) AS n FROM vectors GROUP BY namespace")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = VectorStoreStats {
            dimensions: self.dimensions,
            ..Default::default()
        };

        for row in rows {
            let ns: String = row.get("namespace");
            let count: i64 = row.get("n");
            stats.namespaces.insert(ns, count as u64);
        }

        stats.total_vectors = match namespace {
            Some(ns) => stats.namespaces.get(ns).copied().unwrap_or(0),
            None => stats.namespaces.values().sum(),
        };

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteVectorStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SqliteVectorStore::new(pool, 4, DistanceMetric::Cosine);
        store.initialize(true).await.unwrap();
        store
    }

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        let mut metadata = serde_json::Map::new();
        metadata.insert("content".to_string(), json!(format!("chunk {}", id)));
        metadata.insert("document_id".to_string(), json!("doc-1"));
        VectorRecord {
            id: id.to_string(),
            values,
            metadata,
        }
    }

    #[test]
    fn test_sanitize_string_truncation() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("long".to_string(), json!("x".repeat(5000)));

        let clean = sanitize_metadata(&metadata);
        assert_eq!(clean["long"].as_str().unwrap().len(), 2000);
    }

    #[test]
    fn test_sanitize_list_cap_and_nulls() {
        let mut metadata = serde_json::Map::new();
        let list: Vec<Value> = (0..150).map(|i| json!(format!("v{}", i))).collect();
        metadata.insert("list".to_string(), Value::Array(list));
        metadata.insert("nothing".to_string(), Value::Null);

        let clean = sanitize_metadata(&metadata);
        assert_eq!(clean["list"].as_array().unwrap().len(), 100);
        assert!(!clean.contains_key("nothing"));
    }

    #[test]
    fn test_sanitize_flattens_small_maps() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("dims".to_string(), json!({"width": 300, "depth": 450}));

        let clean = sanitize_metadata(&metadata);
        assert_eq!(clean["dims_width"], json!(300));
        assert_eq!(clean["dims_depth"], json!(450));
        assert!(!clean.contains_key("dims"));
    }

    #[test]
    fn test_sanitize_serializes_large_maps() {
        let mut inner = serde_json::Map::new();
        for i in 0..8 {
            inner.insert(format!("k{}", i), json!(i));
        }
        let mut metadata = serde_json::Map::new();
        metadata.insert("big".to_string(), Value::Object(inner));

        let clean = sanitize_metadata(&metadata);
        assert!(clean["big"].is_string());
    }

    #[test]
    fn test_sanitize_mixed_list_serializes() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("mixed".to_string(), json!(["a", 1, true]));

        let clean = sanitize_metadata(&metadata);
        assert!(clean["mixed"].is_string());
    }

    #[tokio::test]
    async fn test_upsert_and_search() {
        let store = store().await;
        store
            .upsert(
                vec![
                    record("a", vec![1.0, 0.0, 0.0, 0.0]),
                    record("b", vec![0.0, 1.0, 0.0, 0.0]),
                ],
                "kb-1",
            )
            .await
            .unwrap();

        let results = store
            .search(&[1.0, 0.0, 0.0, 0.0], 5, None, "kb-1")
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_upsert_idempotent() {
        let store = store().await;
        let vectors = vec![record("a", vec![1.0, 0.0, 0.0, 0.0])];

        store.upsert(vectors.clone(), "kb-1").await.unwrap();
        store.upsert(vectors, "kb-1").await.unwrap();

        let stats = store.stats(Some("kb-1")).await.unwrap();
        assert_eq!(stats.total_vectors, 1);
    }

    #[tokio::test]
    async fn test_namespace_isolation() {
        let store = store().await;
        store
            .upsert(vec![record("a", vec![1.0, 0.0, 0.0, 0.0])], "kb-1")
            .await
            .unwrap();
        store
            .upsert(vec![record("b", vec![1.0, 0.0, 0.0, 0.0])], "kb-2")
            .await
            .unwrap();

        let results = store
            .search(&[1.0, 0.0, 0.0, 0.0], 5, None, "kb-1")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");

        store.delete_namespace("kb-1").await.unwrap();
        let stats = store.stats(None).await.unwrap();
        assert_eq!(stats.total_vectors, 1);
    }

    #[tokio::test]
    async fn test_search_rank_stability() {
        let store = store().await;
        store
            .upsert(
                vec![
                    record("b", vec![1.0, 0.0, 0.0, 0.0]),
                    record("a", vec![1.0, 0.0, 0.0, 0.0]),
                    record("c", vec![0.5, 0.5, 0.0, 0.0]),
                ],
                "kb-1",
            )
            .await
            .unwrap();

        let first = store
            .search(&[1.0, 0.0, 0.0, 0.0], 3, None, "kb-1")
            .await
            .unwrap();
        let second = store
            .search(&[1.0, 0.0, 0.0, 0.0], 3, None, "kb-1")
            .await
            .unwrap();

        let ids_first: Vec<_> = first.iter().map(|r| r.id.clone()).collect();
        let ids_second: Vec<_> = second.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids_first, ids_second);
        // Equal scores break ties by id
        assert_eq!(ids_first[0], "a");
        assert_eq!(ids_first[1], "b");
    }

    #[tokio::test]
    async fn test_filter_and_delete_by_filter() {
        let store = store().await;
        let mut other = record("x", vec![0.0, 0.0, 1.0, 0.0]);
        other
            .metadata
            .insert("document_id".to_string(), json!("doc-2"));

        store
            .upsert(
                vec![record("a", vec![1.0, 0.0, 0.0, 0.0]), other],
                "kb-1",
            )
            .await
            .unwrap();

        let mut filter = serde_json::Map::new();
        filter.insert("document_id".to_string(), json!("doc-2"));

        let results = store
            .search(&[0.0, 0.0, 1.0, 0.0], 5, Some(&filter), "kb-1")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "x");

        store.delete_by_filter(&filter, "kb-1").await.unwrap();
        let stats = store.stats(Some("kb-1")).await.unwrap();
        assert_eq!(stats.total_vectors, 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = store().await;
        let result = store
            .upsert(vec![record("bad", vec![1.0, 0.0])], "kb-1")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_initialize_without_create() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SqliteVectorStore::new(pool, 4, DistanceMetric::Cosine);
        assert!(store.initialize(false).await.is_err());
    }
}
