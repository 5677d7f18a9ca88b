//! Hybrid retrieval: dense and sparse run concurrently and are fused
//!
//! A backend that fails or times out drops out of the fusion; the request
//! only fails when both do.

use super::{retrieve_with_timeout, Fusion, RetrievalRequest, Retrieved, Retriever};
use async_trait::async_trait;
use hybridrank_common::errors::{AppError, Result};
use hybridrank_common::types::ScoredNode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Candidate multiplier applied to each sub-retriever before fusion
const CANDIDATE_FACTOR: usize = 2;

pub struct HybridRetriever {
    dense: Arc<dyn Retriever>,
    sparse: Arc<dyn Retriever>,
    fusion: Fusion,
    timeout: Duration,
}

impl HybridRetriever {
    pub fn new(dense: Arc<dyn Retriever>, sparse: Arc<dyn Retriever>, fusion: Fusion, timeout: Duration) -> Self {
        Self {
            dense,
            sparse,
            fusion,
            timeout,
        }
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ScoredNode>> {
        Ok(self.retrieve_reporting(request).await?.results)
    }

    async fn retrieve_reporting(&self, request: &RetrievalRequest) -> Result<Retrieved> {
        if request.top_k == 0 {
            return Ok(Retrieved::default());
        }

        let expanded = RetrievalRequest {
            top_k: request.top_k.saturating_mul(CANDIDATE_FACTOR),
            ..request.clone()
        };

        let (dense, sparse) = tokio::join!(
            retrieve_with_timeout(self.dense.as_ref(), &expanded, self.timeout),
            retrieve_with_timeout(self.sparse.as_ref(), &expanded, self.timeout),
        );

        let (lists, degraded) = match (dense, sparse) {
            (Ok(d), Ok(s)) => {
                debug!(dense = d.results.len(), sparse = s.results.len(), "Fusing hybrid candidates");
                let degraded = d.degraded || s.degraded;
                (vec![d.results, s.results], degraded)
            }
            (Ok(d), Err(e)) => {
                warn!(error = %e, "Hybrid degraded to dense only");
                (vec![d.results], true)
            }
            (Err(e), Ok(s)) => {
                warn!(error = %e, "Hybrid degraded to sparse only");
                (vec![s.results], true)
            }
            (Err(dense_err), Err(sparse_err)) => {
                return Err(AppError::RetrievalFailure {
                    backend: self.name().to_string(),
                    message: format!("dense: {dense_err}; sparse: {sparse_err}"),
                });
            }
        };

        Ok(Retrieved {
            results: self.fusion.fuse(lists, request.top_k),
            degraded,
        })
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}
