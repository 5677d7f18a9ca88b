//! HybridRank Authority Worker
//!
//! Offline link-authority job:
//! - Loads the link graph from Postgres
//! - Runs PageRank to convergence
//! - Persists per-url scores and copies them onto node metadata
//!
//! Runs once and exits; schedule it externally.

use anyhow::Context;
use hybridrank_common::{config::AppConfig, db::{DbPool, PgStore}, metrics, VERSION};
use hybridrank_search::AuthorityJob;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting HybridRank authority worker v{}", VERSION);
    config.validate().context("invalid configuration")?;

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        let addr: SocketAddr = ([0, 0, 0, 0], config.observability.metrics_port).into();
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Metrics exporter listening");
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let store = Arc::new(PgStore::new(db));
    store.ping().await?;

    let job = AuthorityJob::new(store.clone(), store, &config.pagerank);
    match job.run().await {
        Ok(report) => {
            info!(
                nodes = report.nodes,
                edges = report.edges,
                iterations = report.iterations,
                converged = report.converged,
                persisted = report.persisted,
                integrated = report.integrated,
                elapsed_ms = report.elapsed_ms,
                "Authority job complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Authority job failed");
            Err(e.into())
        }
    }
}
