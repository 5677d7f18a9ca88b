//! Pairwise relevance models
//!
//! A scorer takes one query and a batch of documents and returns one score
//! per document, in input order.

use async_trait::async_trait;
use hybridrank_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Scores (query, document) pairs
#[async_trait]
pub trait PairScorer: Send + Sync {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}

/// Remote rerank endpoint
///
/// Request: `{"model", "query", "documents"}`.
/// Response: `{"results": [{"index", "relevance_score"}]}`.
pub struct HttpPairScorer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    #[serde(alias = "score")]
    relevance_score: f32,
}

impl HttpPairScorer {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }
}

/// Place scores by their reported index
///
/// Every document must be scored exactly by an in-range index.
fn align_scores(results: Vec<RerankResult>, len: usize) -> Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; len];
    for result in results {
        let slot = scores.get_mut(result.index).ok_or_else(|| AppError::Internal {
            message: format!("rerank endpoint returned index {} for {} documents", result.index, len),
        })?;
        *slot = Some(result.relevance_score);
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| {
            score.ok_or_else(|| AppError::Internal {
                message: format!("rerank endpoint did not score document {}", index),
            })
        })
        .collect()
}

#[async_trait]
impl PairScorer for HttpPairScorer {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal {
                message: format!("rerank endpoint error {}: {}", status, text),
            });
        }

        let parsed: RerankResponse = response.json().await?;
        align_scores(parsed.results, documents.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

type ScoreFn = dyn Fn(&str, &[String]) -> Result<Vec<f32>> + Send + Sync;

/// Runs a synchronous local model on the blocking thread pool
pub struct BlockingScorer {
    model: String,
    score_fn: Arc<ScoreFn>,
}

impl BlockingScorer {
    pub fn new<F>(model: impl Into<String>, score_fn: F) -> Self
    where
        F: Fn(&str, &[String]) -> Result<Vec<f32>> + Send + Sync + 'static,
    {
        Self {
            model: model.into(),
            score_fn: Arc::new(score_fn),
        }
    }
}

#[async_trait]
impl PairScorer for BlockingScorer {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let score_fn = self.score_fn.clone();
        let query = query.to_string();
        let documents = documents.to_vec();
        tokio::task::spawn_blocking(move || score_fn(&query, &documents))
            .await
            .map_err(|e| AppError::Internal {
                message: format!("scoring task panicked: {}", e),
            })?
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, relevance_score: f32) -> RerankResult {
        RerankResult { index, relevance_score }
    }

    #[test]
    fn test_align_scores_by_index() {
        let results = vec![result(2, 0.9), result(0, 0.1), result(1, 0.4)];
        assert_eq!(align_scores(results, 3).unwrap(), vec![0.1, 0.4, 0.9]);
    }

    #[test]
    fn test_align_scores_rejects_missing_or_out_of_range() {
        let missing = align_scores(vec![result(2, 0.9), result(0, 0.1)], 3);
        assert!(matches!(missing, Err(AppError::Internal { .. })));

        let out_of_range = align_scores(vec![result(0, 0.1), result(1, 0.2), result(7, 1.0)], 2);
        assert!(out_of_range.is_err());
    }

    #[test]
    fn test_response_accepts_score_alias() {
        let parsed: RerankResponse = serde_json::from_str(r#"{"results": [{"index": 0, "score": 0.5}]}"#).unwrap();
        assert_eq!(parsed.results[0].relevance_score, 0.5);
    }

    #[tokio::test]
    async fn test_blocking_scorer_runs_closure() {
        let scorer = BlockingScorer::new("len", |_q: &str, docs: &[String]| {
            Ok(docs.iter().map(|d| d.len() as f32).collect())
        });
        let scores = scorer.score("q", &["ab".to_string(), "abcd".to_string()]).await.unwrap();
        assert_eq!(scores, vec![2.0, 4.0]);
        assert_eq!(scorer.model_name(), "len");
    }
}
