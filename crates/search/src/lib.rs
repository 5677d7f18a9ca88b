//! HybridRank search engine
//!
//! Provides:
//! - Dense, BM25 and full-text retrieval over a shared node store
//! - Reciprocal rank fusion for hybrid retrieval
//! - Per-query strategy routing
//! - Reranking with a bounded inference pool and personalization
//! - PageRank link authority as an offline job
//! - The search pipeline tying these together behind a result cache

pub mod pagerank;
pub mod personalization;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
pub mod router;
pub mod store;

pub use pagerank::{AuthorityJob, JobReport, LinkGraph, PageRank};
pub use personalization::PersonalizationFeed;
pub use pipeline::{AnswerOutcome, Generation, SearchOutcome, SearchPipeline, SearchRequest, StrategyCatalog};
pub use rerank::{InferencePool, PairScorer, RerankOutcome, Reranker};
pub use retrieval::{MetadataFilter, RetrievalRequest, Retriever, RetrieverRegistry};
pub use router::select_strategy;
pub use store::NodeStore;
