//! Search orchestration
//!
//! Route -> cache lookup -> retrieve (with per-backend deadlines) ->
//! personalize + rerank -> cache store. Answer generation runs strictly
//! after the ranked result exists and never invalidates it.

use crate::personalization::PersonalizationFeed;
use crate::rerank::Reranker;
use crate::retrieval::{retrieve_with_timeout, MetadataFilter, RetrievalRequest, Retrieved, RetrieverRegistry};
use crate::router::select_strategy;
use crate::store::NodeStore;
use async_trait::async_trait;
use hybridrank_common::cache::{create_cache, CacheKey, ResultCache};
use hybridrank_common::config::{AppConfig, RetrievalConfig};
use hybridrank_common::db::{DbPool, PgStore};
use hybridrank_common::errors::{AppError, Result};
use hybridrank_common::metrics::{self, SearchTimer};
use hybridrank_common::stores::SearchHistoryStore;
use hybridrank_common::strategy::{RerankStrategy, Strategy};
use hybridrank_common::types::ScoredNode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Content characters per source in the generation prompt
const PROMPT_CONTENT_CHARS: usize = 200;

/// Characters of the source listing reused as a fallback answer
const FALLBACK_ANSWER_CHARS: usize = 300;

/// Downstream answer generator
#[async_trait]
pub trait Generation: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Search request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 1000))]
    pub query: String,

    /// Retrieval strategy; the configured default when absent
    #[serde(default)]
    pub strategy: Option<Strategy>,

    #[serde(default)]
    pub rerank: Option<RerankStrategy>,

    /// Candidates to retrieve
    #[validate(range(min = 1, max = 1000))]
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Results to return after reranking
    #[validate(range(min = 1, max = 1000))]
    #[serde(default)]
    pub top_n: Option<usize>,

    #[serde(default)]
    pub filter: Option<MetadataFilter>,

    /// Enables personalization and scopes the cache entry
    #[serde(default)]
    pub user_id: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_rerank(mut self, rerank: RerankStrategy) -> Self {
        self.rerank = Some(rerank);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Ranked result of one search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<ScoredNode>,
    pub strategy_used: Strategy,
    pub rerank_used: RerankStrategy,
    pub cached: bool,
}

/// Generated answer plus the contexts it was built from
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub answer: String,
    pub contexts: Vec<ScoredNode>,
    pub strategy_used: Strategy,
    pub rerank_used: RerankStrategy,
    /// False when the fallback message was substituted
    pub generated: bool,
}

/// Strategies usable right now
#[derive(Debug, Clone, Serialize)]
pub struct StrategyCatalog {
    pub retrieval: Vec<Strategy>,
    pub rerank: Vec<RerankStrategy>,
    pub default_retrieval: Strategy,
    pub default_rerank: RerankStrategy,
}

pub struct SearchPipeline {
    registry: Arc<RetrieverRegistry>,
    reranker: Arc<Reranker>,
    feed: PersonalizationFeed,
    cache: Option<Arc<dyn ResultCache<SearchOutcome>>>,
    generation: Option<Arc<dyn Generation>>,
    config: RetrievalConfig,
}

impl SearchPipeline {
    pub fn new(registry: Arc<RetrieverRegistry>, reranker: Arc<Reranker>, config: RetrievalConfig) -> Self {
        Self {
            registry,
            reranker,
            feed: PersonalizationFeed::disabled(),
            cache: None,
            generation: None,
            config,
        }
    }

    /// Wire every component from configuration
    ///
    /// Backends and the result cache that fail to initialise are logged and
    /// left out; only an invalid rerank setup is an error.
    pub async fn from_config(config: &AppConfig, nodes: Arc<NodeStore>, db: Option<DbPool>) -> Result<Self> {
        let registry = RetrieverRegistry::from_config(config, nodes, db.clone()).await;
        let reranker = Reranker::from_config(&config.rerank, &config.personalization)?;
        let history = db.map(|pool| Arc::new(PgStore::new(pool)) as Arc<dyn SearchHistoryStore>);

        let mut pipeline = Self::new(Arc::new(registry), Arc::new(reranker), config.retrieval.clone())
            .with_personalization(PersonalizationFeed::new(history, &config.personalization));

        match create_cache::<SearchOutcome>(&config.cache).await {
            Ok(Some(cache)) => {
                info!(cache = cache.name(), ttl_secs = config.cache.ttl_secs, "Result cache enabled");
                pipeline = pipeline.with_cache(cache);
            }
            Ok(None) => info!("Result cache disabled"),
            Err(e) => warn!(error = %e, "Result cache unavailable, caching disabled"),
        }
        Ok(pipeline)
    }

    pub fn with_personalization(mut self, feed: PersonalizationFeed) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache<SearchOutcome>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_generation(mut self, generation: Arc<dyn Generation>) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn registry(&self) -> &Arc<RetrieverRegistry> {
        &self.registry
    }

    /// Rank the corpus for one request
    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let timer = SearchTimer::start();
        request.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;
        if request.query.trim().is_empty() {
            return Err(AppError::Validation {
                message: "query must not be blank".to_string(),
                field: Some("query".to_string()),
            });
        }

        let top_k = request.top_k.unwrap_or(self.config.default_top_k);
        let top_n = request.top_n.unwrap_or(self.config.default_top_n);
        let rerank = request.rerank.unwrap_or(self.config.default_rerank);
        let strategy = self.resolve_strategy(request)?;

        let key = self.cache_key(request, strategy, rerank, top_k, top_n);
        if let Some(mut hit) = self.cache_get(&key).await {
            hit.cached = true;
            info!(strategy = %hit.strategy_used, results = hit.results.len(), "Search served from cache");
            timer.finish(hit.strategy_used.as_str(), hit.results.len(), true);
            return Ok(hit);
        }

        let retrieval_request = RetrievalRequest::new(request.query.clone(), top_k).with_filter(request.filter.clone());
        let wants_history = rerank == RerankStrategy::Personalized || rerank.uses_model();
        let (retrieved, history) = tokio::join!(
            self.retrieve(strategy, &retrieval_request),
            async {
                if wants_history {
                    self.feed.history(request.user_id.as_deref()).await
                } else {
                    Vec::new()
                }
            }
        );
        let (retrieved, strategy_used) = retrieved?;
        let candidate_count = retrieved.results.len();
        let degraded = retrieved.degraded;

        let reranked = self
            .reranker
            .rerank(&request.query, retrieved.results, top_n, &history, rerank, strategy_used)
            .await;

        let outcome = SearchOutcome {
            results: reranked.results,
            strategy_used,
            rerank_used: reranked.strategy,
            cached: false,
        };

        // degraded results are served but not cached
        if strategy_used == strategy && !degraded && reranked.failed_batches == 0 {
            self.cache_put(&key, outcome.clone()).await;
        }

        info!(
            strategy = %strategy_used,
            rerank = %outcome.rerank_used,
            candidates = candidate_count,
            results = outcome.results.len(),
            "Search completed"
        );
        timer.finish(strategy_used.as_str(), outcome.results.len(), false);
        Ok(outcome)
    }

    /// Search, then generate an answer from the ranked contexts
    pub async fn answer(&self, request: &SearchRequest) -> Result<AnswerOutcome> {
        let outcome = self.search(request).await?;
        let prompt = build_prompt(&request.query, &outcome.results);

        let deadline = Duration::from_millis(self.config.generation_timeout_ms);
        let (answer, generated) = match &self.generation {
            Some(generation) => match tokio::time::timeout(deadline, generation.generate(&prompt)).await {
                Ok(Ok(text)) => match clean_answer(&text) {
                    Some(answer) => (answer, true),
                    None => (fallback_answer(&outcome.results), false),
                },
                Ok(Err(e)) => {
                    warn!(error = %e, "Answer generation failed, using fallback");
                    (fallback_answer(&outcome.results), false)
                }
                Err(_) => {
                    warn!(timeout_ms = deadline.as_millis() as u64, "Answer generation timed out, using fallback");
                    (fallback_answer(&outcome.results), false)
                }
            },
            None => (fallback_answer(&outcome.results), false),
        };

        Ok(AnswerOutcome {
            answer,
            contexts: outcome.results,
            strategy_used: outcome.strategy_used,
            rerank_used: outcome.rerank_used,
            generated,
        })
    }

    /// Retrieval strategies the current backends support, plus every rerank strategy
    pub fn available_strategies(&self) -> StrategyCatalog {
        let available = self.registry.available();
        let mut retrieval: Vec<Strategy> = [Strategy::Vector, Strategy::Sparse, Strategy::Hybrid, Strategy::FullText]
            .into_iter()
            .filter(|s| available.supports(*s))
            .collect();
        if !retrieval.is_empty() {
            retrieval.push(Strategy::Auto);
        }

        StrategyCatalog {
            retrieval,
            rerank: RerankStrategy::ALL.to_vec(),
            default_retrieval: self.config.default_strategy,
            default_rerank: self.config.default_rerank,
        }
    }

    /// Rebuild the sparse index after the node store changed
    pub async fn refresh_corpus(&self) -> Result<Option<usize>> {
        self.registry.refresh_sparse().await
    }

    fn resolve_strategy(&self, request: &SearchRequest) -> Result<Strategy> {
        let available = self.registry.available();
        match request.strategy.unwrap_or(self.config.default_strategy) {
            Strategy::Auto => {
                let selected = select_strategy(&request.query, available).ok_or_else(|| AppError::NoBackendAvailable {
                    strategy: Strategy::Auto.to_string(),
                })?;
                debug!(strategy = %selected, "Router selected strategy");
                Ok(selected)
            }
            pinned => Ok(pinned),
        }
    }

    fn cache_key(
        &self,
        request: &SearchRequest,
        strategy: Strategy,
        rerank: RerankStrategy,
        top_k: usize,
        top_n: usize,
    ) -> CacheKey {
        CacheKey::builder(&request.query)
            .part("strategy", strategy)
            .part("rerank", rerank)
            .part("backends", self.registry.available().fingerprint())
            .part("top_k", top_k)
            .part("top_n", top_n)
            .part("filter", request.filter.as_ref().map(|f| f.to_string()).unwrap_or_default())
            .part("user", request.user_id.as_deref().unwrap_or(""))
            .build()
    }

    async fn cache_get(&self, key: &CacheKey) -> Option<SearchOutcome> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(hit)) => {
                metrics::record_cache(true, cache.name());
                Some(hit)
            }
            Ok(None) => {
                metrics::record_cache(false, cache.name());
                None
            }
            Err(e) => {
                warn!(cache = cache.name(), error = %e, "Cache read failed, treating as miss");
                metrics::record_cache(false, cache.name());
                None
            }
        }
    }

    async fn cache_put(&self, key: &CacheKey, outcome: SearchOutcome) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.put(key, outcome).await {
            warn!(cache = cache.name(), error = %e, "Cache write failed");
        }
    }

    /// Run the strategy's retriever, falling back to sparse once if enabled
    async fn retrieve(&self, strategy: Strategy, request: &RetrievalRequest) -> Result<(Retrieved, Strategy)> {
        let primary = match self.registry.for_strategy(strategy) {
            Some(retriever) => retrieve_with_timeout(retriever.as_ref(), request, self.deadline(strategy)).await,
            None => Err(AppError::BackendUnavailable {
                backend: strategy.to_string(),
                message: "strategy not supported by initialised backends".to_string(),
            }),
        };

        let error = match primary {
            Ok(results) => return Ok((results, strategy)),
            Err(e) if !e.is_degradable() => return Err(e),
            Err(e) => e,
        };

        if self.config.fallback_to_sparse && strategy != Strategy::Sparse {
            if let Some(sparse) = self.registry.for_strategy(Strategy::Sparse) {
                warn!(strategy = %strategy, error = %error, "Retrying with sparse retrieval");
                if let Ok(results) =
                    retrieve_with_timeout(sparse.as_ref(), request, self.deadline(Strategy::Sparse)).await
                {
                    return Ok((results, Strategy::Sparse));
                }
            }
        }

        Err(AppError::NoBackendAvailable {
            strategy: strategy.to_string(),
        })
    }

    /// Hybrid applies the per-backend deadline internally; the outer one
    /// only bounds the whole fan-out
    fn deadline(&self, strategy: Strategy) -> Duration {
        let timeout = self.registry.timeout();
        match strategy {
            Strategy::Hybrid => timeout * 2,
            _ => timeout,
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "unknown"
    } else {
        value
    }
}

fn sources_text(results: &[ScoredNode]) -> String {
    let mut sources = String::new();
    for (i, result) in results.iter().enumerate() {
        let metadata = &result.node.metadata;
        let (content, cut) = truncate_chars(result.text(), PROMPT_CONTENT_CHARS);
        sources.push_str(&format!(
            "[{}] Title: {}\nSource: {}\nContent: {}{}\n\n",
            i + 1,
            or_unknown(&metadata.title),
            or_unknown(&metadata.platform),
            content,
            if cut { "..." } else { "" }
        ));
    }
    sources
}

/// Numbered source listing followed by the user question
pub fn build_prompt(query: &str, results: &[ScoredNode]) -> String {
    format!("Question: {}\n\nSources:\n{}", query, sources_text(results))
}

fn clean_answer(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let trimmed = ["Answer:", "回答：", "回答:"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
        .trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn fallback_answer(results: &[ScoredNode]) -> String {
    if results.is_empty() {
        return "Sorry, no relevant sources were found to answer this question.".to_string();
    }
    let sources = sources_text(results);
    let (head, _) = truncate_chars(&sources, FALLBACK_ANSWER_CHARS);
    format!("Based on the retrieved sources: {}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridrank_common::types::Node;

    fn scored(title: &str, text: &str) -> ScoredNode {
        ScoredNode::new(Arc::new(Node::new(title, text).with_title(title).with_platform("website")), 1.0)
    }

    #[test]
    fn test_prompt_numbers_sources_and_truncates() {
        let long = "字".repeat(250);
        let prompt = build_prompt("q", &[scored("A", "short"), scored("B", &long)]);
        assert!(prompt.starts_with("Question: q"));
        assert!(prompt.contains("[1] Title: A\nSource: website\nContent: short\n"));
        assert!(prompt.contains(&format!("[2] Title: B\nSource: website\nContent: {}...", "字".repeat(200))));
    }

    #[test]
    fn test_fallback_answer() {
        assert!(fallback_answer(&[]).starts_with("Sorry"));
        let answer = fallback_answer(&[scored("A", "x")]);
        assert!(answer.starts_with("Based on the retrieved sources: [1] Title: A"));
    }

    #[test]
    fn test_clean_answer_strips_prefix() {
        assert_eq!(clean_answer("回答：天津").as_deref(), Some("天津"));
        assert_eq!(clean_answer("  "), None);
    }

    #[test]
    fn test_request_validation() {
        assert!(SearchRequest::new("").validate().is_err());
        assert!(SearchRequest::new("q").with_top_k(0).validate().is_err());
        assert!(SearchRequest::new("q").with_top_k(5).validate().is_ok());
    }
}
