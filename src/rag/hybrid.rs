//! Hybrid search fusion and reranking
//!
//! Combines vector and keyword result lists by Reciprocal Rank Fusion or a
//! weighted score, then optionally reranks with metadata boosts.

use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// RRF constant
const RRF_K: f64 = 60.0;

/// A fusion candidate from either search arm
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub content: String,
    pub score: f64,
    pub metadata: serde_json::Map<String, Value>,
}

/// A fused, optionally reranked result
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub chunk_id: String,
    pub content: String,
    pub score: f64,
    pub original_score: f64,
    pub metadata: serde_json::Map<String, Value>,
    pub vector_score: Option<f64>,
    pub keyword_score: Option<f64>,
}

/// How to combine the two result lists
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionMethod {
    /// score(id) = sum of 1 / (k + rank) over both lists
    Rrf,
    /// score(id) = w_v * vector + w_k * keyword
    Weighted {
        vector_weight: f64,
        keyword_weight: f64,
    },
}

/// Hybrid search fusion
pub struct HybridSearch {
    method: FusionMethod,
}

impl Default for HybridSearch {
    fn default() -> Self {
        Self {
            method: FusionMethod::Rrf,
        }
    }
}

impl HybridSearch {
    pub fn new(method: FusionMethod) -> Self {
        Self { method }
    }

    /// Fuse the two ranked lists, best first
    pub fn fuse(
        &self,
        vector_results: &[SearchHit],
        keyword_results: &[SearchHit],
        top_k: usize,
    ) -> Vec<FusedHit> {
        let mut fused = match self.method {
            FusionMethod::Rrf => self.rrf(vector_results, keyword_results),
            FusionMethod::Weighted {
                vector_weight,
                keyword_weight,
            } => self.weighted(vector_results, keyword_results, vector_weight, keyword_weight),
        };
        fused.truncate(top_k);
        fused
    }

    fn rrf(&self, vector_results: &[SearchHit], keyword_results: &[SearchHit]) -> Vec<FusedHit> {
        struct Entry {
            hit: SearchHit,
            rrf_score: f64,
        }

        let mut scores: HashMap<String, Entry> = HashMap::new();

        for (rank, hit) in vector_results.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (rank + 1) as f64);
            scores
                .entry(hit.chunk_id.clone())
                .and_modify(|e| e.rrf_score += contribution)
                .or_insert(Entry {
                    hit: hit.clone(),
                    rrf_score: contribution,
                });
        }

        for (rank, hit) in keyword_results.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (rank + 1) as f64);
            scores
                .entry(hit.chunk_id.clone())
                .and_modify(|e| e.rrf_score += contribution)
                .or_insert(Entry {
                    hit: hit.clone(),
                    rrf_score: contribution,
                });
        }

        let mut entries: Vec<Entry> = scores.into_values().collect();
        entries.sort_by(|a, b| {
            b.rrf_score
                .partial_cmp(&a.rrf_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.hit.chunk_id.cmp(&b.hit.chunk_id))
        });

        entries
            .into_iter()
            .map(|e| FusedHit {
                chunk_id: e.hit.chunk_id,
                content: e.hit.content,
                score: e.rrf_score,
                original_score: e.rrf_score,
                metadata: e.hit.metadata,
                vector_score: None,
                keyword_score: None,
            })
            .collect()
    }

    fn weighted(
        &self,
        vector_results: &[SearchHit],
        keyword_results: &[SearchHit],
        vector_weight: f64,
        keyword_weight: f64,
    ) -> Vec<FusedHit> {
        struct Entry {
            hit: SearchHit,
            vector_score: f64,
            keyword_score: f64,
        }

        let mut scores: HashMap<String, Entry> = HashMap::new();

        for hit in vector_results {
            scores
                .entry(hit.chunk_id.clone())
                .and_modify(|e| e.vector_score = hit.score)
                .or_insert(Entry {
                    hit: hit.clone(),
                    vector_score: hit.score,
                    keyword_score: 0.0,
                });
        }

        for hit in keyword_results {
            scores
                .entry(hit.chunk_id.clone())
                .and_modify(|e| e.keyword_score = hit.score)
                .or_insert(Entry {
                    hit: hit.clone(),
                    vector_score: 0.0,
                    keyword_score: hit.score,
                });
        }

        let mut fused: Vec<FusedHit> = scores
            .into_values()
            .map(|e| {
                let score = vector_weight * e.vector_score + keyword_weight * e.keyword_score;
                FusedHit {
                    chunk_id: e.hit.chunk_id,
                    content: e.hit.content,
                    score,
                    original_score: score,
                    metadata: e.hit.metadata,
                    vector_score: Some(e.vector_score),
                    keyword_score: Some(e.keyword_score),
                }
            })
            .collect();

        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        fused
    }
}

/// Reranking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankStrategy {
    /// Metadata boosts: tables x1.2, metadata x1.1, long chunks x1.05
    Simple,
    CrossEncoder,
    Llm,
}

/// Reranks search results to improve relevance
pub struct Reranker {
    strategy: RerankStrategy,
}

impl Default for Reranker {
    fn default() -> Self {
        Self {
            strategy: RerankStrategy::Simple,
        }
    }
}

impl Reranker {
    pub fn new(strategy: RerankStrategy) -> Self {
        Self { strategy }
    }

    /// Rerank results, best first
    pub fn rerank(&self, results: Vec<FusedHit>, top_k: usize) -> Vec<FusedHit> {
        match self.strategy {
            RerankStrategy::Simple => self.simple_rerank(results, top_k),
            RerankStrategy::CrossEncoder => {
                warn!("Cross-encoder reranking not yet implemented, using simple");
                self.simple_rerank(results, top_k)
            }
            RerankStrategy::Llm => {
                warn!("LLM reranking not yet implemented, using simple");
                self.simple_rerank(results, top_k)
            }
        }
    }

    fn simple_rerank(&self, results: Vec<FusedHit>, top_k: usize) -> Vec<FusedHit> {
        let mut reranked: Vec<FusedHit> = results
            .into_iter()
            .map(|mut hit| {
                let mut score = hit.score;

                let chunk_type = hit
                    .metadata
                    .get("chunk_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("text");
                if chunk_type == "table" {
                    score *= 1.2;
                } else if chunk_type == "metadata" {
                    score *= 1.1;
                }

                let token_count = hit
                    .metadata
                    .get("token_count")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                if token_count > 500 {
                    score *= 1.05;
                }

                hit.original_score = hit.score;
                hit.score = score;
                hit
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        reranked.truncate(top_k);
        reranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str, score: f64) -> SearchHit {
        SearchHit {
            chunk_id: id.to_string(),
            content: format!("content {}", id),
            score,
            metadata: serde_json::Map::new(),
        }
    }

    fn hit_with_meta(id: &str, score: f64, chunk_type: &str, token_count: i64) -> FusedHit {
        let mut metadata = serde_json::Map::new();
        metadata.insert("chunk_type".to_string(), json!(chunk_type));
        metadata.insert("token_count".to_string(), json!(token_count));
        FusedHit {
            chunk_id: id.to_string(),
            content: format!("content {}", id),
            score,
            original_score: score,
            metadata,
            vector_score: None,
            keyword_score: None,
        }
    }

    #[test]
    fn test_rrf_fusion_exact_scores() {
        // Vector [a, b, c], keyword [b, d, a], k = 60
        let search = HybridSearch::new(FusionMethod::Rrf);
        let vector = vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)];
        let keyword = vec![hit("b", 3.0), hit("d", 2.0), hit("a", 1.0)];

        let fused = search.fuse(&vector, &keyword, 3);

        // b: 1/62 + 1/61, a: 1/61 + 1/63, c: 1/63 ... d: 1/62
        assert_eq!(fused[0].chunk_id, "b");
        assert!((fused[0].score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert_eq!(fused[1].chunk_id, "a");
        assert!((fused[1].score - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-12);
        // top_k = 3 keeps d (1/62) over c (1/63)
        assert_eq!(fused[2].chunk_id, "d");
    }

    #[test]
    fn test_rrf_single_list() {
        let search = HybridSearch::default();
        let vector = vec![hit("a", 0.9), hit("b", 0.8)];
        let fused = search.fuse(&vector, &[], 5);

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].chunk_id, "a");
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_fusion() {
        let search = HybridSearch::new(FusionMethod::Weighted {
            vector_weight: 0.7,
            keyword_weight: 0.3,
        });
        let vector = vec![hit("a", 1.0), hit("b", 0.5)];
        let keyword = vec![hit("b", 1.0)];

        let fused = search.fuse(&vector, &keyword, 5);

        // a: 0.7*1.0 = 0.7, b: 0.7*0.5 + 0.3*1.0 = 0.65
        assert_eq!(fused[0].chunk_id, "a");
        assert!((fused[0].score - 0.7).abs() < 1e-12);
        assert_eq!(fused[1].chunk_id, "b");
        assert!((fused[1].score - 0.65).abs() < 1e-12);
        assert_eq!(fused[1].vector_score, Some(0.5));
        assert_eq!(fused[1].keyword_score, Some(1.0));
    }

    #[test]
    fn test_simple_rerank_table_boost() {
        // text 0.80 vs table 0.70: the table boost flips the order
        let reranker = Reranker::default();
        let results = vec![
            hit_with_meta("text_chunk", 0.80, "text", 100),
            hit_with_meta("table_chunk", 0.70, "table", 100),
        ];

        let reranked = reranker.rerank(results, 5);
        assert_eq!(reranked[0].chunk_id, "table_chunk");
        assert!((reranked[0].score - 0.84).abs() < 1e-12);
        assert!((reranked[0].original_score - 0.70).abs() < 1e-12);
        assert_eq!(reranked[1].chunk_id, "text_chunk");
    }

    #[test]
    fn test_rerank_token_count_boost() {
        let reranker = Reranker::default();
        let results = vec![
            hit_with_meta("short", 0.80, "text", 100),
            hit_with_meta("long", 0.78, "text", 900),
        ];

        let reranked = reranker.rerank(results, 5);
        assert_eq!(reranked[0].chunk_id, "long");
        assert!((reranked[0].score - 0.78 * 1.05).abs() < 1e-12);
    }

    #[test]
    fn test_declared_strategies_fall_back() {
        let results = vec![hit_with_meta("a", 0.9, "text", 10)];
        let cross = Reranker::new(RerankStrategy::CrossEncoder).rerank(results.clone(), 5);
        assert_eq!(cross.len(), 1);
        let llm = Reranker::new(RerankStrategy::Llm).rerank(results, 5);
        assert_eq!(llm.len(), 1);
    }
}
