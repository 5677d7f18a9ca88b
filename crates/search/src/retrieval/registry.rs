//! Retriever registry
//!
//! Backends that fail to initialise are left out and logged; the set of
//! those that succeeded drives strategy routing.

use super::{
    Bm25Retriever, DenseRetriever, ElasticsearchClient, FullTextRetriever, Fusion, HybridRetriever, PgVectorStore,
    Retriever,
};
use crate::store::NodeStore;
use hybridrank_common::config::AppConfig;
use hybridrank_common::db::DbPool;
use hybridrank_common::embeddings::create_embedder;
use hybridrank_common::errors::{AppError, Result};
use hybridrank_common::strategy::{Backend, BackendSet, Strategy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Initialised retrieval backends
pub struct RetrieverRegistry {
    dense: Option<Arc<dyn Retriever>>,
    sparse: Option<Arc<dyn Retriever>>,
    bm25: Option<Arc<Bm25Retriever>>,
    full_text: Option<Arc<dyn Retriever>>,
    hybrid: Option<Arc<dyn Retriever>>,
    nodes: Arc<NodeStore>,
    timeout: Duration,
}

impl RetrieverRegistry {
    pub fn builder(nodes: Arc<NodeStore>) -> RetrieverRegistryBuilder {
        RetrieverRegistryBuilder {
            nodes,
            dense: None,
            sparse: None,
            bm25: None,
            full_text: None,
            fusion: Fusion::default(),
            timeout: Duration::from_millis(3000),
        }
    }

    /// Initialise every configured backend, skipping the ones that fail
    pub async fn from_config(config: &AppConfig, nodes: Arc<NodeStore>, db: Option<DbPool>) -> Self {
        let timeout = config.backend_timeout();
        let mut builder = Self::builder(nodes.clone())
            .fusion(Fusion::from(&config.fusion))
            .timeout(timeout);

        match Bm25Retriever::from_config(nodes.snapshot(), &config.bm25).await {
            Ok(bm25) => builder = builder.bm25(Arc::new(bm25.with_store(nodes.clone()))),
            Err(e) => log_unavailable(Backend::Sparse, &e),
        }

        match db {
            Some(db) => match create_embedder(&config.embedding) {
                Ok(embedder) => {
                    let store = Arc::new(PgVectorStore::new(db));
                    builder = builder.dense(Arc::new(DenseRetriever::new(embedder, store, nodes.clone())));
                }
                Err(e) => log_unavailable(Backend::Dense, &e),
            },
            None => log_unavailable(
                Backend::Dense,
                &AppError::BackendUnavailable {
                    backend: Backend::Dense.to_string(),
                    message: "no database configured".to_string(),
                },
            ),
        }

        if config.fulltext.url.is_some() {
            match connect_full_text(config, timeout).await {
                Ok(client) => {
                    builder = builder.full_text(Arc::new(FullTextRetriever::new(Arc::new(client), nodes.clone())));
                }
                Err(e) => log_unavailable(Backend::FullText, &e),
            }
        }

        let registry = builder.build();
        info!(backends = %registry.available().fingerprint(), "Retriever registry ready");
        registry
    }

    /// Backends that initialised successfully
    pub fn available(&self) -> BackendSet {
        BackendSet {
            dense: self.dense.is_some(),
            sparse: self.sparse.is_some(),
            full_text: self.full_text.is_some(),
        }
    }

    /// Retriever for a concrete strategy; `Auto` must be resolved first
    pub fn for_strategy(&self, strategy: Strategy) -> Option<Arc<dyn Retriever>> {
        match strategy {
            Strategy::Vector => self.dense.clone(),
            Strategy::Sparse => self.sparse.clone(),
            Strategy::Hybrid => self.hybrid.clone(),
            Strategy::FullText => self.full_text.clone(),
            Strategy::Auto => None,
        }
    }

    pub fn nodes(&self) -> &Arc<NodeStore> {
        &self.nodes
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Rebuild the BM25 snapshot from the node store
    ///
    /// Returns the number of indexed documents, or `None` when sparse
    /// retrieval is not BM25-backed.
    pub async fn refresh_sparse(&self) -> Result<Option<usize>> {
        let Some(bm25) = &self.bm25 else {
            return Ok(None);
        };
        let docs = self.nodes.snapshot();
        let count = docs.len();
        bm25.rebuild(docs).await?;
        Ok(Some(count))
    }
}

async fn connect_full_text(config: &AppConfig, timeout: Duration) -> Result<ElasticsearchClient> {
    let client = ElasticsearchClient::from_config(&config.fulltext, timeout)?;
    client.ping().await?;
    Ok(client)
}

fn log_unavailable(backend: Backend, error: &AppError) {
    warn!(backend = %backend, error = %error, "Retrieval backend unavailable, continuing without it");
}

/// Builder for explicit wiring
pub struct RetrieverRegistryBuilder {
    nodes: Arc<NodeStore>,
    dense: Option<Arc<dyn Retriever>>,
    sparse: Option<Arc<dyn Retriever>>,
    bm25: Option<Arc<Bm25Retriever>>,
    full_text: Option<Arc<dyn Retriever>>,
    fusion: Fusion,
    timeout: Duration,
}

impl RetrieverRegistryBuilder {
    pub fn dense(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.dense = Some(retriever);
        self
    }

    pub fn sparse(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.sparse = Some(retriever);
        self
    }

    /// BM25 as the sparse backend, refreshable from the node store
    pub fn bm25(mut self, retriever: Arc<Bm25Retriever>) -> Self {
        self.sparse = Some(retriever.clone() as Arc<dyn Retriever>);
        self.bm25 = Some(retriever);
        self
    }

    pub fn full_text(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.full_text = Some(retriever);
        self
    }

    pub fn fusion(mut self, fusion: Fusion) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Hybrid is composed automatically when dense and sparse are both present
    pub fn build(self) -> RetrieverRegistry {
        let hybrid = match (&self.dense, &self.sparse) {
            (Some(dense), Some(sparse)) => Some(Arc::new(HybridRetriever::new(
                dense.clone(),
                sparse.clone(),
                self.fusion,
                self.timeout,
            )) as Arc<dyn Retriever>),
            _ => None,
        };

        RetrieverRegistry {
            dense: self.dense,
            sparse: self.sparse,
            bm25: self.bm25,
            full_text: self.full_text,
            hybrid,
            nodes: self.nodes,
            timeout: self.timeout,
        }
    }
}
