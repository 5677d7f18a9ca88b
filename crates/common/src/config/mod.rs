//! Configuration management for HybridRank
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use crate::errors::{AppError, Result};
use crate::strategy::{RerankStrategy, Strategy};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub bm25: Bm25Config,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub rerank: RerankConfig,

    #[serde(default)]
    pub pagerank: PageRankConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub personalization: PersonalizationConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Full-text engine endpoint; absent means no full-text backend
    #[serde(default)]
    pub fulltext: FullTextConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default = "default_top_n")]
    pub default_top_n: usize,

    /// Per-backend call timeout
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_ms: u64,

    #[serde(default = "default_strategy")]
    pub default_strategy: Strategy,

    #[serde(default = "default_rerank")]
    pub default_rerank: RerankStrategy,

    /// Retry once with sparse retrieval when the selected strategy yields no backend
    #[serde(default = "default_true")]
    pub fallback_to_sparse: bool,

    /// Deadline for the downstream answer generator
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bm25Config {
    #[serde(default = "default_k1")]
    pub k1: f64,

    #[serde(default = "default_b")]
    pub b: f64,

    /// Corpus size above which scoring moves to the blocking pool
    #[serde(default = "default_blocking_threshold")]
    pub blocking_threshold: usize,

    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,
}

/// List-merge algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Reciprocal rank fusion keyed by node id
    Rrf,
    /// Union deduplicated by content, sorted by native score
    ScoreUnion,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FusionConfig {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    #[serde(default = "default_fusion_mode")]
    pub mode: FusionMode,

    /// Weight of the authority score added to each RRF contribution
    #[serde(default)]
    pub authority_weight: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_batch")]
    pub batch_size: usize,

    /// Concurrent inference batches across all requests
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_ms: u64,

    /// Apply model rerankers to full-text results
    #[serde(default = "default_true")]
    pub rerank_fulltext: bool,

    #[serde(default = "default_true")]
    pub keep_retrieval_score: bool,

    /// Pairwise rerank endpoint; absent disables the model strategies
    pub endpoint: Option<String>,

    #[serde(default = "default_cross_encoder_model")]
    pub cross_encoder_model: String,

    #[serde(default = "default_sentence_encoder_model")]
    pub sentence_encoder_model: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageRankConfig {
    #[serde(default = "default_damping")]
    pub damping: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Rows per upsert statement during persist
    #[serde(default = "default_persist_batch")]
    pub persist_batch_size: usize,

    #[serde(default = "default_persist_retry_secs")]
    pub persist_max_retry_secs: u64,
}

/// Result cache storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,

    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonalizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_boost")]
    pub boost: f64,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FullTextConfig {
    /// Base URL of an Elasticsearch-compatible engine
    pub url: Option<String>,

    #[serde(default = "default_fulltext_index")]
    pub index: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_top_k() -> usize { 10 }
fn default_top_n() -> usize { 5 }
fn default_backend_timeout() -> u64 { 3000 }
fn default_generation_timeout() -> u64 { 30_000 }
fn default_strategy() -> Strategy { Strategy::Auto }
fn default_rerank() -> RerankStrategy { RerankStrategy::CrossEncoder }
fn default_k1() -> f64 { 1.5 }
fn default_b() -> f64 { 0.75 }
fn default_blocking_threshold() -> usize { 2048 }
fn default_stopwords() -> Vec<String> {
    ["的", "了", "和", "是", "在", "the", "a", "an", "of", "and", "or", "to", "in", "is"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_rrf_k() -> f64 { 60.0 }
fn default_fusion_mode() -> FusionMode { FusionMode::Rrf }
fn default_rerank_batch() -> usize { 16 }
fn default_pool_size() -> usize { 4 }
fn default_batch_timeout() -> u64 { 10_000 }
fn default_cross_encoder_model() -> String { "BAAI/bge-reranker-base".to_string() }
fn default_sentence_encoder_model() -> String { "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string() }
fn default_damping() -> f64 { 0.85 }
fn default_max_iterations() -> usize { 100 }
fn default_tolerance() -> f64 { 1e-6 }
fn default_persist_batch() -> usize { 1000 }
fn default_persist_retry_secs() -> u64 { 60 }
fn default_cache_ttl() -> u64 { 3600 }
fn default_cache_entries() -> usize { 1000 }
fn default_cache_backend() -> CacheBackend { CacheBackend::Memory }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_key_prefix() -> String { "hybridrank".to_string() }
fn default_boost() -> f64 { 0.1 }
fn default_history_limit() -> usize { 10 }
fn default_lookup_timeout() -> u64 { 500 }
fn default_database_url() -> String { "postgres://localhost/hybridrank".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 768 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_fulltext_index() -> String { "documents".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "hybridrank".to_string() }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            default_top_n: default_top_n(),
            backend_timeout_ms: default_backend_timeout(),
            default_strategy: default_strategy(),
            default_rerank: default_rerank(),
            fallback_to_sparse: true,
            generation_timeout_ms: default_generation_timeout(),
        }
    }
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            blocking_threshold: default_blocking_threshold(),
            stopwords: default_stopwords(),
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            mode: default_fusion_mode(),
            authority_weight: 0.0,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            batch_size: default_rerank_batch(),
            pool_size: default_pool_size(),
            batch_timeout_ms: default_batch_timeout(),
            rerank_fulltext: true,
            keep_retrieval_score: true,
            endpoint: None,
            cross_encoder_model: default_cross_encoder_model(),
            sentence_encoder_model: default_sentence_encoder_model(),
        }
    }
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: default_damping(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            persist_batch_size: default_persist_batch(),
            persist_max_retry_secs: default_persist_retry_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
            backend: default_cache_backend(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            boost: default_boost(),
            history_limit: default_history_limit(),
            lookup_timeout_ms: default_lookup_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            bm25: Bm25Config::default(),
            fusion: FusionConfig::default(),
            rerank: RerankConfig::default(),
            pagerank: PageRankConfig::default(),
            cache: CacheConfig::default(),
            personalization: PersonalizationConfig::default(),
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            fulltext: FullTextConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__PAGERANK__DAMPING=0.9
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject values the ranking algorithms cannot work with
    pub fn validate(&self) -> Result<()> {
        let damping = self.pagerank.damping;
        if !(damping > 0.0 && damping < 1.0) {
            return Err(invalid("pagerank.damping", format!("must be in (0, 1), got {damping}")));
        }
        if !(self.pagerank.tolerance > 0.0) {
            return Err(invalid("pagerank.tolerance", "must be positive"));
        }
        if self.pagerank.max_iterations == 0 {
            return Err(invalid("pagerank.max_iterations", "must be at least 1"));
        }
        if !(self.bm25.k1 >= 0.0) {
            return Err(invalid("bm25.k1", format!("must be non-negative, got {}", self.bm25.k1)));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(invalid("bm25.b", format!("must be in [0, 1], got {}", self.bm25.b)));
        }
        if !(self.fusion.rrf_k >= 0.0) {
            return Err(invalid("fusion.rrf_k", "must be non-negative"));
        }
        if self.rerank.batch_size == 0 {
            return Err(invalid("rerank.batch_size", "must be at least 1"));
        }
        if self.rerank.pool_size == 0 {
            return Err(invalid("rerank.pool_size", "must be at least 1"));
        }
        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", "must be at least 1"));
        }
        if !self.personalization.boost.is_finite() {
            return Err(invalid("personalization.boost", "must be finite"));
        }
        Ok(())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval.backend_timeout_ms)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

fn invalid(field: &str, message: impl Into<String>) -> AppError {
    AppError::Validation {
        message: format!("{}: {}", field, message.into()),
        field: Some(field.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pagerank.damping, 0.85);
        assert_eq!(config.fusion.rrf_k, 60.0);
        assert_eq!(config.rerank.batch_size, 16);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.retrieval.default_strategy, Strategy::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_damping() {
        let mut config = AppConfig::default();
        config.pagerank.damping = 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pagerank.damping"));

        let mut config = AppConfig::default();
        config.bm25.b = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rerank.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_sections_deserialize() {
        let json = r#"{"pagerank": {"damping": 0.9}, "cache": {"backend": "redis"}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pagerank.damping, 0.9);
        assert_eq!(config.pagerank.max_iterations, 100);
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.fusion.mode, FusionMode::Rrf);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/hybridrank");
    }
}
