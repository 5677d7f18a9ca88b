//! Bounded inference pool shared by all requests

use super::scorer::PairScorer;
use hybridrank_common::errors::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Limits concurrent model batches across the whole process
pub struct InferencePool {
    semaphore: Arc<Semaphore>,
    size: usize,
    batch_timeout: Duration,
}

impl InferencePool {
    pub fn new(size: usize, batch_timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
            batch_timeout,
        }
    }

    /// Score one batch once a slot is free
    ///
    /// The timeout covers model execution only, not the wait for a slot.
    pub async fn run_batch(
        &self,
        batch: usize,
        scorer: Arc<dyn PairScorer>,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<f32>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| AppError::RerankBatchFailure {
                batch,
                message: format!("inference pool closed: {e}"),
            })?;

        let scores = tokio::time::timeout(self.batch_timeout, scorer.score(query, documents))
            .await
            .map_err(|_| AppError::RerankBatchFailure {
                batch,
                message: format!("timed out after {}ms", self.batch_timeout.as_millis()),
            })?
            .map_err(|e| AppError::RerankBatchFailure {
                batch,
                message: e.to_string(),
            })?;

        if scores.len() != documents.len() {
            return Err(AppError::RerankBatchFailure {
                batch,
                message: format!("model returned {} scores for {} documents", scores.len(), documents.len()),
            });
        }
        Ok(scores)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
