//! Authority batch job
//!
//! Load -> BuildGraph -> Iterate -> Persist -> Integrate. Any stage failure
//! aborts the run with the stage attached. Persist is a full-replace upsert,
//! so a rerun after a failure is safe.

use super::{LinkGraph, PageRank};
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use hybridrank_common::config::PageRankConfig;
use hybridrank_common::errors::{AppError, JobStage, Result};
use hybridrank_common::metrics;
use hybridrank_common::stores::{LinkGraphStore, NodeMetadataStore};
use hybridrank_common::types::{AuthorityScore, LinkEdge};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub nodes: usize,
    pub edges: usize,
    pub iterations: usize,
    pub converged: bool,
    pub persisted: usize,
    pub integrated: u64,
    pub elapsed_ms: u64,
}

pub struct AuthorityJob {
    links: Arc<dyn LinkGraphStore>,
    nodes: Arc<dyn NodeMetadataStore>,
    pagerank: PageRank,
    persist_batch_size: usize,
    persist_max_retry: Duration,
    running: Mutex<()>,
}

impl AuthorityJob {
    pub fn new(links: Arc<dyn LinkGraphStore>, nodes: Arc<dyn NodeMetadataStore>, config: &PageRankConfig) -> Self {
        Self {
            links,
            nodes,
            pagerank: PageRank::from(config),
            persist_batch_size: config.persist_batch_size.max(1),
            persist_max_retry: Duration::from_secs(config.persist_max_retry_secs),
            running: Mutex::new(()),
        }
    }

    /// Run all stages once
    ///
    /// A second call while one is in flight fails with `JobAlreadyRunning`.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<JobReport> {
        let _running = self.running.try_lock().map_err(|_| AppError::JobAlreadyRunning)?;
        let started = Instant::now();

        let edges = self.load().await?;
        let graph = Self::build_graph(&edges);
        info!(
            stage = %JobStage::BuildGraph,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Link graph built"
        );

        let (graph, result) = self.iterate(graph).await?;
        let computed_at = Utc::now();
        let scores: Vec<AuthorityScore> = graph
            .urls()
            .iter()
            .zip(&result.scores)
            .map(|(url, score)| AuthorityScore {
                url: url.clone(),
                score: *score,
                computed_at,
            })
            .collect();

        self.persist(&scores).await?;
        let integrated = self.integrate(&scores).await?;

        let elapsed = started.elapsed();
        metrics::record_pagerank(elapsed.as_secs_f64(), result.iterations, result.converged);

        let report = JobReport {
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            iterations: result.iterations,
            converged: result.converged,
            persisted: scores.len(),
            integrated,
            elapsed_ms: elapsed.as_millis() as u64,
        };
        info!(?report, "Authority job finished");
        Ok(report)
    }

    #[instrument(skip(self))]
    async fn load(&self) -> Result<Vec<LinkEdge>> {
        let edges = self
            .links
            .load_edges()
            .await
            .map_err(|e| AppError::job(JobStage::Load, e))?;
        info!(stage = %JobStage::Load, edges = edges.len(), "Link edges loaded");
        Ok(edges)
    }

    fn build_graph(edges: &[LinkEdge]) -> LinkGraph {
        LinkGraph::from_edges(edges)
    }

    #[instrument(skip(self, graph), fields(nodes = graph.node_count()))]
    async fn iterate(&self, graph: LinkGraph) -> Result<(LinkGraph, super::PageRankResult)> {
        let pagerank = self.pagerank;
        let (graph, result) = tokio::task::spawn_blocking(move || {
            let result = pagerank.compute(&graph);
            (graph, result)
        })
        .await
        .map_err(|e| AppError::job(JobStage::Iterate, e))?;

        if !result.converged && !graph.is_empty() {
            warn!(
                stage = %JobStage::Iterate,
                iterations = result.iterations,
                delta = result.delta,
                "PageRank stopped at max iterations before converging"
            );
        } else {
            info!(stage = %JobStage::Iterate, iterations = result.iterations, "PageRank converged");
        }
        Ok((graph, result))
    }

    #[instrument(skip(self, scores), fields(scores = scores.len()))]
    async fn persist(&self, scores: &[AuthorityScore]) -> Result<()> {
        for chunk in scores.chunks(self.persist_batch_size) {
            let policy = ExponentialBackoffBuilder::new()
                .with_max_elapsed_time(Some(self.persist_max_retry))
                .build();

            retry(policy, move || async move {
                self.links.upsert_authority_batch(chunk).await.map_err(|e| {
                    if is_transient(&e) {
                        warn!(stage = %JobStage::Persist, error = %e, "Authority upsert failed, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            })
            .await
            .map_err(|e| AppError::job(JobStage::Persist, e))?;
        }
        info!(stage = %JobStage::Persist, scores = scores.len(), "Authority scores persisted");
        Ok(())
    }

    #[instrument(skip(self, scores), fields(scores = scores.len()))]
    async fn integrate(&self, scores: &[AuthorityScore]) -> Result<u64> {
        let touched = self
            .nodes
            .integrate_authority(scores)
            .await
            .map_err(|e| AppError::job(JobStage::Integrate, e))?;
        info!(stage = %JobStage::Integrate, nodes = touched, "Authority integrated into node metadata");
        Ok(touched)
    }
}

fn is_transient(error: &AppError) -> bool {
    matches!(
        error,
        AppError::Database(_) | AppError::DatabaseConnection { .. } | AppError::HttpClient(_)
    )
}
