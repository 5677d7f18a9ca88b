//! Candidate reranking
//!
//! Strategies:
//! - NoRerank: stable sort by the retrieval score
//! - PageRankOnly: score becomes the node's authority
//! - Personalized: history matches get a fixed boost
//! - CrossEncoder / SentenceEncoder: pairwise model scores, batched through
//!   a bounded pool, plus the personalization boost
//!
//! A failed model batch scores 0.0 for its candidates and the request
//! continues.

mod personalize;
mod pool;
mod scorer;

pub use personalize::history_boosts;
pub use pool::InferencePool;
pub use scorer::{BlockingScorer, HttpPairScorer, PairScorer};

use futures::future::join_all;
use hybridrank_common::config::{PersonalizationConfig, RerankConfig};
use hybridrank_common::errors::Result;
use hybridrank_common::metrics;
use hybridrank_common::strategy::{RerankStrategy, Strategy};
use hybridrank_common::types::{sort_and_rank, ScoredNode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of one rerank call
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub results: Vec<ScoredNode>,
    /// Strategy actually applied after downgrades
    pub strategy: RerankStrategy,
    pub failed_batches: usize,
}

pub struct Reranker {
    pool: Arc<InferencePool>,
    cross_encoder: Option<Arc<dyn PairScorer>>,
    sentence_encoder: Option<Arc<dyn PairScorer>>,
    batch_size: usize,
    boost: f64,
    rerank_fulltext: bool,
    keep_retrieval_score: bool,
}

impl Reranker {
    /// Reranker without models; model strategies fall back to NoRerank
    pub fn new(config: &RerankConfig, boost: f64) -> Self {
        Self {
            pool: Arc::new(InferencePool::new(
                config.pool_size,
                Duration::from_millis(config.batch_timeout_ms),
            )),
            cross_encoder: None,
            sentence_encoder: None,
            batch_size: config.batch_size.max(1),
            boost,
            rerank_fulltext: config.rerank_fulltext,
            keep_retrieval_score: config.keep_retrieval_score,
        }
    }

    /// Wire HTTP scorers when a rerank endpoint is configured
    pub fn from_config(config: &RerankConfig, personalization: &PersonalizationConfig) -> Result<Self> {
        let mut reranker = Self::new(config, personalization.boost);
        if let Some(endpoint) = &config.endpoint {
            let timeout = Duration::from_millis(config.batch_timeout_ms);
            reranker.cross_encoder = Some(Arc::new(HttpPairScorer::new(
                endpoint.clone(),
                config.cross_encoder_model.clone(),
                timeout,
            )?));
            reranker.sentence_encoder = Some(Arc::new(HttpPairScorer::new(
                endpoint.clone(),
                config.sentence_encoder_model.clone(),
                timeout,
            )?));
        }
        Ok(reranker)
    }

    pub fn with_cross_encoder(mut self, scorer: Arc<dyn PairScorer>) -> Self {
        self.cross_encoder = Some(scorer);
        self
    }

    pub fn with_sentence_encoder(mut self, scorer: Arc<dyn PairScorer>) -> Self {
        self.sentence_encoder = Some(scorer);
        self
    }

    /// Share one inference pool between rerankers
    pub fn with_pool(mut self, pool: Arc<InferencePool>) -> Self {
        self.pool = pool;
        self
    }

    fn scorer(&self, strategy: RerankStrategy) -> Option<&Arc<dyn PairScorer>> {
        match strategy {
            RerankStrategy::CrossEncoder => self.cross_encoder.as_ref(),
            RerankStrategy::SentenceEncoder => self.sentence_encoder.as_ref(),
            _ => None,
        }
    }

    /// Strategy that will actually run for a request
    pub fn effective_strategy(&self, requested: RerankStrategy, retrieval: Strategy) -> RerankStrategy {
        if !requested.uses_model() {
            return requested;
        }
        if retrieval == Strategy::FullText && !self.rerank_fulltext {
            return RerankStrategy::Personalized;
        }
        if self.scorer(requested).is_none() {
            return RerankStrategy::NoRerank;
        }
        requested
    }

    /// Reorder candidates and keep the best `top_n`
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<ScoredNode>,
        top_n: usize,
        history: &[String],
        requested: RerankStrategy,
        retrieval: Strategy,
    ) -> RerankOutcome {
        let strategy = self.effective_strategy(requested, retrieval);
        if strategy != requested {
            debug!(requested = %requested, applied = %strategy, "Rerank strategy downgraded");
        }

        if candidates.is_empty() || top_n == 0 {
            return RerankOutcome {
                results: Vec::new(),
                strategy,
                failed_batches: 0,
            };
        }

        let started = Instant::now();
        if self.keep_retrieval_score {
            for candidate in candidates.iter_mut() {
                candidate.retrieval_score = Some(candidate.score);
            }
        }

        // a model strategy that fell back still honours history
        let personalize = match strategy {
            RerankStrategy::PageRankOnly => false,
            RerankStrategy::NoRerank => requested.uses_model(),
            _ => true,
        };
        let boosts = if personalize {
            history_boosts(&candidates, history, self.boost)
        } else {
            vec![0.0; candidates.len()]
        };

        let mut failed_batches = 0;
        match strategy {
            RerankStrategy::NoRerank | RerankStrategy::Personalized => {
                for (candidate, boost) in candidates.iter_mut().zip(&boosts) {
                    let score = candidate.score + boost;
                    candidate.set_score(score);
                }
            }
            RerankStrategy::PageRankOnly => {
                for candidate in candidates.iter_mut() {
                    let authority = candidate.node.metadata.authority_score;
                    candidate.set_score(authority);
                }
            }
            RerankStrategy::CrossEncoder | RerankStrategy::SentenceEncoder => {
                let (scores, failed) = match self.scorer(strategy) {
                    Some(scorer) => self.model_scores(scorer.clone(), query, &candidates).await,
                    None => (vec![0.0; candidates.len()], 0),
                };
                failed_batches = failed;
                for ((candidate, boost), score) in candidates.iter_mut().zip(&boosts).zip(scores) {
                    candidate.set_score(score as f64 + boost);
                }
            }
        }

        sort_and_rank(&mut candidates);
        candidates.truncate(top_n);

        metrics::record_rerank(started.elapsed().as_secs_f64(), strategy.as_str(), failed_batches);
        RerankOutcome {
            results: candidates,
            strategy,
            failed_batches,
        }
    }

    /// Model score per candidate, in candidate order
    async fn model_scores(
        &self,
        scorer: Arc<dyn PairScorer>,
        query: &str,
        candidates: &[ScoredNode],
    ) -> (Vec<f32>, usize) {
        let texts: Vec<String> = candidates.iter().map(|c| c.text().to_string()).collect();

        let batches = texts.chunks(self.batch_size).enumerate().map(|(i, chunk)| {
            let scorer = scorer.clone();
            async move { (chunk.len(), self.pool.run_batch(i, scorer, query, chunk).await) }
        });

        let mut scores = Vec::with_capacity(texts.len());
        let mut failed = 0;
        for (len, result) in join_all(batches).await {
            match result {
                Ok(batch_scores) => scores.extend(batch_scores),
                Err(e) => {
                    warn!(model = scorer.model_name(), error = %e, "Rerank batch failed, scoring 0.0");
                    failed += 1;
                    scores.extend(std::iter::repeat(0.0).take(len));
                }
            }
        }
        (scores, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hybridrank_common::errors::AppError;
    use hybridrank_common::types::Node;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidates(texts: &[(&str, f64)]) -> Vec<ScoredNode> {
        texts
            .iter()
            .enumerate()
            .map(|(i, (text, score))| ScoredNode::new(Arc::new(Node::new(i as u64, *text)), *score))
            .collect()
    }

    fn ids(outcome: &RerankOutcome) -> Vec<String> {
        outcome.results.iter().map(|r| r.id().to_string()).collect()
    }

    /// Scores by text length; fails any batch containing "poison"
    struct LengthModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PairScorer for LengthModel {
        async fn score(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if documents.iter().any(|d| d.contains("poison")) {
                return Err(AppError::Internal {
                    message: "model crashed".into(),
                });
            }
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }

        fn model_name(&self) -> &str {
            "length"
        }
    }

    fn reranker(batch_size: usize) -> (Reranker, Arc<LengthModel>) {
        let model = Arc::new(LengthModel {
            calls: AtomicUsize::new(0),
        });
        let config = RerankConfig {
            batch_size,
            ..RerankConfig::default()
        };
        (Reranker::new(&config, 0.1).with_cross_encoder(model.clone()), model)
    }

    #[tokio::test]
    async fn test_no_rerank_is_stable_sort() {
        let (reranker, _) = reranker(16);
        let outcome = reranker
            .rerank("q", candidates(&[("a", 0.2), ("b", 0.9), ("c", 0.2)]), 10, &[], RerankStrategy::NoRerank, Strategy::Sparse)
            .await;
        assert_eq!(ids(&outcome), vec!["1", "0", "2"]);
        assert_eq!(outcome.results[0].retrieval_score, Some(0.9));
    }

    #[tokio::test]
    async fn test_pagerank_only_uses_authority() {
        let (reranker, _) = reranker(16);
        let mut input = candidates(&[("a", 0.9), ("b", 0.1)]);
        input[1] = ScoredNode::new(Arc::new(Node::new(1u64, "b").with_authority(0.4)), 0.1);
        let outcome = reranker
            .rerank("q", input, 10, &[], RerankStrategy::PageRankOnly, Strategy::Hybrid)
            .await;
        assert_eq!(ids(&outcome), vec!["1", "0"]);
        assert_eq!(outcome.results[0].score, 0.4);
        assert_eq!(outcome.results[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_personalized_adds_exact_boost() {
        let (reranker, _) = reranker(16);
        let history = vec!["Library".to_string()];
        let outcome = reranker
            .rerank(
                "q",
                candidates(&[("campus news", 0.5), ("the library opens", 0.45)]),
                10,
                &history,
                RerankStrategy::Personalized,
                Strategy::Hybrid,
            )
            .await;
        assert_eq!(ids(&outcome), vec!["1", "0"]);
        assert!((outcome.results[0].score - 0.55).abs() < 1e-12);
        assert_eq!(outcome.results[1].score, 0.5);
    }

    #[tokio::test]
    async fn test_model_batches_and_truncates() {
        let (reranker, model) = reranker(2);
        let outcome = reranker
            .rerank(
                "q",
                candidates(&[("a", 0.9), ("bbbb", 0.1), ("cc", 0.5), ("ddd", 0.3), ("e", 0.2)]),
                3,
                &[],
                RerankStrategy::CrossEncoder,
                Strategy::Hybrid,
            )
            .await;
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        assert_eq!(ids(&outcome), vec!["1", "3", "2"]);
        assert_eq!(outcome.results[0].score, 4.0);
        assert_eq!(outcome.results[0].retrieval_score, Some(0.1));
        assert_eq!(outcome.failed_batches, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_scores_zero_and_continues() {
        let (reranker, _) = reranker(2);
        let outcome = reranker
            .rerank(
                "q",
                candidates(&[("poison", 0.9), ("x", 0.8), ("yyy", 0.1)]),
                10,
                &[],
                RerankStrategy::CrossEncoder,
                Strategy::Hybrid,
            )
            .await;
        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(ids(&outcome), vec!["2", "0", "1"]);
        assert_eq!(outcome.results[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_model_score_plus_history_boost() {
        let (reranker, _) = reranker(16);
        let history = vec!["ab".to_string()];
        let outcome = reranker
            .rerank(
                "q",
                candidates(&[("abc", 0.0), ("xyz", 0.0)]),
                10,
                &history,
                RerankStrategy::CrossEncoder,
                Strategy::Hybrid,
            )
            .await;
        assert!((outcome.results[0].score - 3.1).abs() < 1e-6);
        assert_eq!(outcome.results[1].score, 3.0);
    }

    #[tokio::test]
    async fn test_missing_model_falls_back_with_personalization() {
        let reranker = Reranker::new(&RerankConfig::default(), 0.1);
        let history = vec!["news".to_string()];
        let outcome = reranker
            .rerank(
                "q",
                candidates(&[("weather", 0.5), ("news", 0.45)]),
                10,
                &history,
                RerankStrategy::SentenceEncoder,
                Strategy::Vector,
            )
            .await;
        assert_eq!(outcome.strategy, RerankStrategy::NoRerank);
        assert_eq!(ids(&outcome), vec!["1", "0"]);
    }

    #[tokio::test]
    async fn test_full_text_bypass_downgrades_model() {
        let model = Arc::new(LengthModel {
            calls: AtomicUsize::new(0),
        });
        let config = RerankConfig {
            rerank_fulltext: false,
            ..RerankConfig::default()
        };
        let reranker = Reranker::new(&config, 0.1).with_cross_encoder(model.clone());
        let outcome = reranker
            .rerank("q", candidates(&[("a", 1.0)]), 5, &[], RerankStrategy::CrossEncoder, Strategy::FullText)
            .await;
        assert_eq!(outcome.strategy, RerankStrategy::Personalized);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let (reranker, _) = reranker(16);
        let outcome = reranker
            .rerank("q", Vec::new(), 5, &[], RerankStrategy::CrossEncoder, Strategy::Hybrid)
            .await;
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn test_from_config_without_endpoint_skips_models() {
        let reranker = Reranker::from_config(&RerankConfig::default(), &PersonalizationConfig::default()).unwrap();
        assert_eq!(
            reranker.effective_strategy(RerankStrategy::CrossEncoder, Strategy::Sparse),
            RerankStrategy::NoRerank
        );
        assert_eq!(
            reranker.effective_strategy(RerankStrategy::SentenceEncoder, Strategy::Vector),
            RerankStrategy::NoRerank
        );
        assert_eq!(
            reranker.effective_strategy(RerankStrategy::Personalized, Strategy::Sparse),
            RerankStrategy::Personalized
        );
    }

    #[tokio::test]
    async fn test_from_config_wires_endpoint_scorers() {
        let config = RerankConfig {
            endpoint: Some("http://127.0.0.1:1/rerank".into()),
            batch_timeout_ms: 500,
            ..RerankConfig::default()
        };
        let personalization = PersonalizationConfig {
            boost: 0.25,
            ..PersonalizationConfig::default()
        };
        let reranker = Reranker::from_config(&config, &personalization).unwrap();
        assert_eq!(
            reranker.effective_strategy(RerankStrategy::CrossEncoder, Strategy::Sparse),
            RerankStrategy::CrossEncoder
        );
        assert_eq!(
            reranker.effective_strategy(RerankStrategy::SentenceEncoder, Strategy::Hybrid),
            RerankStrategy::SentenceEncoder
        );

        // Nothing listens on the endpoint: the batch fails and scores zero
        let outcome = reranker
            .rerank("q", candidates(&[("a", 1.0)]), 5, &[], RerankStrategy::CrossEncoder, Strategy::Sparse)
            .await;
        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(outcome.results.len(), 1);

        let history = vec!["a".to_string()];
        let outcome = reranker
            .rerank("q", candidates(&[("a", 1.0), ("b", 2.0)]), 5, &history, RerankStrategy::Personalized, Strategy::Sparse)
            .await;
        let boosted = outcome.results.iter().find(|r| r.id().as_str() == "0").unwrap();
        assert_eq!(boosted.score, 1.25);
    }
}
