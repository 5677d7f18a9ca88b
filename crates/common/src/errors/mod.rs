//! Error types for HybridRank
//!
//! Provides a typed error taxonomy with:
//! - Distinct variants per failure mode (backend, rerank, cache, job)
//! - Machine-readable error codes
//! - A degradation predicate used by the search pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Retrieval errors (2xxx)
    BackendUnavailable,
    RetrievalTimeout,
    RetrievalFailure,
    NoBackendAvailable,

    // Rerank errors (3xxx)
    RerankBatchFailure,

    // Cache / personalization (4xxx)
    CacheError,
    PersonalizationLookup,

    // Batch job errors (5xxx)
    PageRankJobFailure,
    JobAlreadyRunning,

    // Storage errors (7xxx)
    DatabaseError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    GenerationError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::BackendUnavailable => 2001,
            ErrorCode::RetrievalTimeout => 2002,
            ErrorCode::RetrievalFailure => 2003,
            ErrorCode::NoBackendAvailable => 2004,

            ErrorCode::RerankBatchFailure => 3001,

            ErrorCode::CacheError => 4001,
            ErrorCode::PersonalizationLookup => 4002,

            ErrorCode::PageRankJobFailure => 5001,
            ErrorCode::JobAlreadyRunning => 5002,

            ErrorCode::DatabaseError => 7001,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::GenerationError => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Stage of the link-authority batch job, carried by job failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Load,
    BuildGraph,
    Iterate,
    Persist,
    Integrate,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStage::Load => "load",
            JobStage::BuildGraph => "build_graph",
            JobStage::Iterate => "iterate",
            JobStage::Persist => "persist",
            JobStage::Integrate => "integrate",
        };
        f.write_str(name)
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Retrieval errors
    #[error("Backend unavailable: {backend}: {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Backend {backend} timed out after {timeout_ms}ms")]
    RetrievalTimeout { backend: String, timeout_ms: u64 },

    #[error("Backend {backend} failed: {message}")]
    RetrievalFailure { backend: String, message: String },

    #[error("No backend available for strategy {strategy}")]
    NoBackendAvailable { strategy: String },

    // Rerank errors
    #[error("Rerank batch {batch} failed: {message}")]
    RerankBatchFailure { batch: usize, message: String },

    // Cache / personalization
    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Personalization lookup failed: {message}")]
    PersonalizationLookup { message: String },

    // Batch job errors
    #[error("PageRank job failed at {stage}: {message}")]
    PageRankJob { stage: JobStage, message: String },

    #[error("A PageRank job is already running")]
    JobAlreadyRunning,

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Generation failed: {message}")]
    GenerationError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::BackendUnavailable { .. } => ErrorCode::BackendUnavailable,
            AppError::RetrievalTimeout { .. } => ErrorCode::RetrievalTimeout,
            AppError::RetrievalFailure { .. } => ErrorCode::RetrievalFailure,
            AppError::NoBackendAvailable { .. } => ErrorCode::NoBackendAvailable,
            AppError::RerankBatchFailure { .. } => ErrorCode::RerankBatchFailure,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::PersonalizationLookup { .. } => ErrorCode::PersonalizationLookup,
            AppError::PageRankJob { .. } => ErrorCode::PageRankJobFailure,
            AppError::JobAlreadyRunning => ErrorCode::JobAlreadyRunning,
            AppError::Database(_) | AppError::DatabaseConnection { .. } => ErrorCode::DatabaseError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::GenerationError { .. } => ErrorCode::GenerationError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Errors the search pipeline absorbs by degrading a single backend or
    /// feature instead of failing the request
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            AppError::BackendUnavailable { .. }
                | AppError::RetrievalTimeout { .. }
                | AppError::RetrievalFailure { .. }
                | AppError::EmbeddingError { .. }
                | AppError::RerankBatchFailure { .. }
                | AppError::CacheError { .. }
                | AppError::PersonalizationLookup { .. }
                | AppError::HttpClient(_)
        )
    }

    /// Build a retrieval failure for a named backend
    pub fn retrieval(backend: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AppError::RetrievalFailure {
            backend: backend.into(),
            message: err.to_string(),
        }
    }

    /// Wrap any error as a failure of a PageRank job stage
    pub fn job(stage: JobStage, err: impl std::fmt::Display) -> Self {
        AppError::PageRankJob {
            stage,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::NoBackendAvailable { strategy: "hybrid".into() };
        assert_eq!(err.code(), ErrorCode::NoBackendAvailable);
        assert_eq!(err.code().as_code(), 2004);
        assert!(!err.is_degradable());
    }

    #[test]
    fn test_backend_errors_degrade() {
        let timeout = AppError::RetrievalTimeout { backend: "vector".into(), timeout_ms: 3000 };
        assert!(timeout.is_degradable());
        assert!(AppError::retrieval("bm25", "index missing").is_degradable());
        assert!(AppError::CacheError { message: "down".into() }.is_degradable());
    }

    #[test]
    fn test_job_error_carries_stage() {
        let err = AppError::job(JobStage::Persist, "connection reset");
        assert_eq!(err.to_string(), "PageRank job failed at persist: connection reset");
        assert_eq!(err.code(), ErrorCode::PageRankJobFailure);
    }
}
