//! Multi-backend retrieval
//!
//! Provides four retrieval paths:
//! - Dense search (vector similarity via an external store)
//! - Sparse search (in-process BM25 over a corpus snapshot)
//! - Full-text search (wildcard/boolean syntax via an external engine)
//! - Hybrid search (rank fusion of dense + sparse)

mod bm25;
mod fulltext;
mod fusion;
mod hybrid;
mod registry;
mod vector;

pub use bm25::{Bm25Index, Bm25Params, Bm25Retriever, Tokenizer, UnicodeTokenizer, EMPTY_DOC_TOKEN};
pub use fulltext::{ElasticsearchClient, FullTextClient, FullTextHit, FullTextQuery, FullTextRetriever};
pub use fusion::Fusion;
pub use hybrid::HybridRetriever;
pub use registry::{RetrieverRegistry, RetrieverRegistryBuilder};
pub use vector::{DenseRetriever, PgVectorStore, VectorStoreClient};

use hybridrank_common::errors::{AppError, Result};
use hybridrank_common::metrics;
use hybridrank_common::types::{NodeMetadata, ScoredNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Equality constraints on node metadata attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(pub BTreeMap<String, String>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every constraint must match; a missing attribute never matches
    pub fn matches(&self, metadata: &NodeMetadata) -> bool {
        self.0
            .iter()
            .all(|(key, value)| metadata.attr(key) == Some(value.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl std::fmt::Display for MetadataFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&parts.join("&"))
    }
}

/// Parameters for a single retrieval call
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<MetadataFilter>) -> Self {
        self.filter = filter.filter(|f| !f.is_empty());
        self
    }

    pub(crate) fn admits(&self, metadata: &NodeMetadata) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(metadata))
    }
}

/// Retrieval results plus whether part of a composite backend dropped out
#[derive(Debug, Clone, Default)]
pub struct Retrieved {
    pub results: Vec<ScoredNode>,
    pub degraded: bool,
}

/// Common trait for all retrievers
///
/// Results are ordered by descending score with 1-based ranks assigned and
/// at most `top_k` long.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ScoredNode>>;

    /// Composite retrievers override this to flag a partial result
    async fn retrieve_reporting(&self, request: &RetrievalRequest) -> Result<Retrieved> {
        Ok(Retrieved {
            results: self.retrieve(request).await?,
            degraded: false,
        })
    }

    /// Name used in logs, metrics and errors
    fn name(&self) -> &'static str;
}

/// Run one backend under a deadline
///
/// Timeouts and failures are logged and counted here; the caller decides
/// whether to degrade or surface them.
pub async fn retrieve_with_timeout(
    retriever: &dyn Retriever,
    request: &RetrievalRequest,
    timeout: Duration,
) -> Result<Retrieved> {
    let name = retriever.name();
    match tokio::time::timeout(timeout, retriever.retrieve_reporting(request)).await {
        Ok(Ok(retrieved)) => Ok(retrieved),
        Ok(Err(e)) => {
            warn!(backend = name, error = %e, "Retrieval backend failed");
            metrics::record_backend_failure(name, "error");
            Err(e)
        }
        Err(_) => {
            warn!(backend = name, timeout_ms = timeout.as_millis() as u64, "Retrieval backend timed out");
            metrics::record_backend_failure(name, "timeout");
            Err(AppError::RetrievalTimeout {
                backend: name.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}
