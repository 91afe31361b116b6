//! Configuration management for the takeoff engine

use serde::{Deserialize, Serialize};

/// Main configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Document store configuration
    pub storage: StorageConfig,

    /// Vector index configuration
    pub vector_index: VectorIndexConfig,

    /// Knowledge-base policy defaults
    #[serde(default)]
    pub knowledge_base: KnowledgeBasePolicy,

    /// Vision extraction configuration
    #[serde(default)]
    pub vision: VisionConfig,

    /// Chunked takeoff extraction configuration
    #[serde(default)]
    pub takeoff: TakeoffConfig,

    /// Vector-geometric detection configuration
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database URL
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    /// Index name
    pub index_name: String,

    /// Embedding dimension
    pub dimensions: usize,

    /// Distance metric ("cosine", "euclidean", "dot")
    pub metric: String,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            index_name: "takeoff-rag".to_string(),
            dimensions: 1536,
            metric: "cosine".to_string(),
        }
    }
}

/// Per-knowledge-base retrieval policy defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBasePolicy {
    /// Target chunk size in tokens
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunk overlap in tokens
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of results for similarity search
    #[serde(default = "default_top_k")]
    pub similarity_top_k: usize,

    /// MMR diversity bias in [0, 1]
    #[serde(default = "default_mmr_bias")]
    pub mmr_diversity_bias: f64,

    /// Retrieval strategy ("similarity", "mmr", "hybrid", "reranking")
    #[serde(default = "default_retrieval_strategy")]
    pub retrieval_strategy: String,

    /// Candidates retrieved before reranking
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    5
}

fn default_mmr_bias() -> f64 {
    0.3
}

fn default_retrieval_strategy() -> String {
    "similarity".to_string()
}

fn default_rerank_top_k() -> usize {
    20
}

impl Default for KnowledgeBasePolicy {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            similarity_top_k: default_top_k(),
            mmr_diversity_bias: default_mmr_bias(),
            retrieval_strategy: default_retrieval_strategy(),
            rerank_top_k: default_rerank_top_k(),
        }
    }
}

/// Vision extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Rendering DPI
    #[serde(default = "default_dpi")]
    pub dpi: u32,

    /// Maximum image width in pixels (strictest provider limit)
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,

    /// Maximum image height in pixels
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,

    /// JPEG quality
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Maximum pages per unified extraction
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Per-call output token budget
    #[serde(default = "default_vision_max_tokens")]
    pub max_tokens: u32,

    /// Per-LLM-call timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,
}

fn default_dpi() -> u32 {
    300
}

fn default_max_dimension() -> u32 {
    4000
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_max_pages() -> usize {
    10
}

fn default_vision_max_tokens() -> u32 {
    4000
}

fn default_llm_timeout() -> u64 {
    180
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
            max_pages: default_max_pages(),
            max_tokens: default_vision_max_tokens(),
            llm_timeout_secs: default_llm_timeout(),
        }
    }
}

/// Chunked takeoff extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeoffConfig {
    /// Output token budget per page
    #[serde(default = "default_takeoff_max_tokens")]
    pub max_output_tokens: u32,

    /// Delay between page requests, for rate-limit pacing
    #[serde(default = "default_page_delay")]
    pub page_delay_secs: u64,

    /// Maximum pages processed in one run
    #[serde(default = "default_max_chunks")]
    pub max_pages: usize,
}

fn default_takeoff_max_tokens() -> u32 {
    8000
}

fn default_page_delay() -> u64 {
    2
}

fn default_max_chunks() -> usize {
    50
}

impl Default for TakeoffConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: default_takeoff_max_tokens(),
            page_delay_secs: default_page_delay(),
            max_pages: default_max_chunks(),
        }
    }
}

/// Vector-geometric detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Deduplication tolerance for text instances in points
    #[serde(default = "default_dedup_tolerance")]
    pub dedup_tolerance: f64,

    /// Maximum distance for a "near" text association in millimeters
    #[serde(default = "default_near_threshold")]
    pub near_threshold_mm: f64,

    /// Minimum confidence to keep a detected element
    #[serde(default = "default_min_confidence")]
    pub min_element_confidence: f64,

    /// Minimum line stroke width in points
    #[serde(default = "default_min_stroke")]
    pub min_stroke_width: f64,

    /// Maximum line stroke width in points
    #[serde(default = "default_max_stroke")]
    pub max_stroke_width: f64,

    /// Include dashed and dotted strokes
    #[serde(default)]
    pub include_non_solid: bool,
}

fn default_dedup_tolerance() -> f64 {
    2.0
}

fn default_near_threshold() -> f64 {
    10.0
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_min_stroke() -> f64 {
    0.5
}

fn default_max_stroke() -> f64 {
    6.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            dedup_tolerance: default_dedup_tolerance(),
            near_threshold_mm: default_near_threshold(),
            min_element_confidence: default_min_confidence(),
            min_stroke_width: default_min_stroke(),
            max_stroke_width: default_max_stroke(),
            include_non_solid: false,
        }
    }
}

/// Retry behavior for transient failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per operation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in seconds; doubles per attempt
    #[serde(default = "default_backoff")]
    pub initial_backoff_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> u64 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_backoff(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.database_url.is_empty() {
            return Err(anyhow::anyhow!("Database URL cannot be empty"));
        }

        if self.vector_index.dimensions == 0 {
            return Err(anyhow::anyhow!("Vector dimensions must be greater than 0"));
        }

        if !["cosine", "euclidean", "dot"].contains(&self.vector_index.metric.as_str()) {
            return Err(anyhow::anyhow!(
                "Unknown distance metric: {}",
                self.vector_index.metric
            ));
        }

        if !(0.0..=1.0).contains(&self.knowledge_base.mmr_diversity_bias) {
            return Err(anyhow::anyhow!(
                "MMR diversity bias must be between 0.0 and 1.0"
            ));
        }

        if self.knowledge_base.chunk_overlap >= self.knowledge_base.chunk_size {
            return Err(anyhow::anyhow!("Chunk overlap must be below chunk size"));
        }

        if self.vision.jpeg_quality == 0 || self.vision.jpeg_quality > 100 {
            return Err(anyhow::anyhow!("JPEG quality must be in 1..=100"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.knowledge_base.chunk_size, 1000);
        assert_eq!(config.knowledge_base.chunk_overlap, 200);
        assert_eq!(config.knowledge_base.similarity_top_k, 5);
        assert_eq!(config.vision.dpi, 300);
        assert_eq!(config.vision.max_pages, 10);
        assert_eq!(config.takeoff.page_delay_secs, 2);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.vector_index.metric = "manhattan".to_string();
        assert!(config.validate().is_err());

        config = EngineConfig::default();
        config.knowledge_base.mmr_diversity_bias = 1.5;
        assert!(config.validate().is_err());

        config = EngineConfig::default();
        config.knowledge_base.chunk_overlap = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            restored.vector_index.dimensions,
            config.vector_index.dimensions
        );
    }
}
