//! HybridRank Common Library
//!
//! Shared code for the search engine and the authority worker:
//! - Domain types and strategy selectors
//! - Error types and handling
//! - Configuration management
//! - Store interfaces with Postgres implementations
//! - Query embedding abstraction
//! - Result cache backends
//! - Metrics

pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod stores;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::EmbeddingProvider;
pub use errors::{AppError, ErrorCode, JobStage, Result};
pub use stores::{LinkGraphStore, NodeMetadataStore, SearchHistoryStore};
pub use strategy::{Backend, BackendSet, RerankStrategy, Strategy};
pub use types::{AuthorityScore, LinkEdge, Node, NodeId, NodeMetadata, ScoredNode, SearchHistoryEntry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
