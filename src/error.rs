//! Error handling for the takeoff engine

use thiserror::Error;

/// Result type alias for the takeoff engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for the takeoff engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),

    #[error("Cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Errors related to language model operations
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("No vision model available for extraction")]
    NoModelAvailable,

    #[error("No API key for provider: {0}")]
    NoCredentials(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Timeout: operation took too long")]
    Timeout,
}

/// Errors related to document and shape extraction
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Unsupported format: {0}")]
    InvalidFormat(String),

    #[error("Failed to parse page {page}: {reason}")]
    ParseFailure { page: u32, reason: String },

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Rasterization failed: {0}")]
    Rasterization(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),
}

/// Errors related to the relational document store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Store not initialized")]
    NotInitialized,

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Storage failed: {0}")]
    Failed(String),
}

/// Errors related to the vector index
#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Vector backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Index not initialized")]
    NotInitialized,

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Upsert failed: {0}")]
    UpsertFailed(String),

    #[error("Search failed: {0}")]
    SearchFailed(String),
}

/// Errors related to shape geometry
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
}

impl EngineError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Llm(e) => e.is_retryable(),
            EngineError::Storage(StorageError::Transient(_)) => true,
            EngineError::VectorStore(VectorStoreError::BackendUnavailable(_)) => true,
            EngineError::Http(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Llm(_) => "llm",
            EngineError::Extraction(_) => "extraction",
            EngineError::Storage(_) => "storage",
            EngineError::VectorStore(_) => "vector_store",
            EngineError::Geometry(_) => "geometry",
            EngineError::Config(_) => "config",
            EngineError::Io(_) => "io",
            EngineError::Serialization(_) => "serialization",
            EngineError::Http(_) => "http",
            EngineError::Database(_) => "database",
            EngineError::Generic(_) => "generic",
            EngineError::Cancelled => "cancelled",
            EngineError::NotFound(_) => "not_found",
        }
    }
}

impl LlmError {
    /// Transient provider failures are retried; authentication failures never are
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout
                | LlmError::ConnectionFailed(_)
                | LlmError::RateLimited
                | LlmError::ServerError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_error = EngineError::Llm(LlmError::Timeout);
        assert!(timeout_error.is_retryable());

        let auth_error = EngineError::Llm(LlmError::Unauthorized("bad key".to_string()));
        assert!(!auth_error.is_retryable());

        let config_error = EngineError::Config("invalid config".to_string());
        assert!(!config_error.is_retryable());

        let busy = EngineError::Storage(StorageError::Transient("database is locked".to_string()));
        assert!(busy.is_retryable());
    }

    #[test]
    fn test_error_category() {
        let llm_error = EngineError::Llm(LlmError::Timeout);
        assert_eq!(llm_error.category(), "llm");

        let storage_error = EngineError::Storage(StorageError::NotInitialized);
        assert_eq!(storage_error.category(), "storage");

        assert_eq!(EngineError::Cancelled.category(), "cancelled");
    }

    #[test]
    fn test_vector_backend_unavailable_display() {
        let err = EngineError::VectorStore(VectorStoreError::BackendUnavailable(
            "connection refused".to_string(),
        ));
        assert!(err.to_string().contains("Vector backend unavailable"));
    }
}
