//! Narrow interfaces to the stores the engine reads and the authority job writes
//!
//! Postgres implementations live in [`crate::db::PgStore`]; the search crate
//! ships in-memory ones.

use crate::errors::Result;
use crate::types::{AuthorityScore, LinkEdge, Node, NodeId};
use async_trait::async_trait;

/// Source of hyperlink edges and sink for computed authority
#[async_trait]
pub trait LinkGraphStore: Send + Sync {
    /// Snapshot of every edge
    async fn load_edges(&self) -> Result<Vec<LinkEdge>>;

    /// Replace the stored score for one url
    async fn upsert_authority(&self, url: &str, score: f64) -> Result<()>;

    /// Replace the stored scores for many urls
    async fn upsert_authority_batch(&self, scores: &[AuthorityScore]) -> Result<()> {
        for s in scores {
            self.upsert_authority(&s.url, s.score).await?;
        }
        Ok(())
    }
}

/// Read access to per-user query history
#[async_trait]
pub trait SearchHistoryStore: Send + Sync {
    /// Up to `limit` most recent distinct queries, newest first
    async fn recent_queries(&self, user_id: &str, limit: usize) -> Result<Vec<String>>;
}

/// Document metadata lookup and authority integration
#[async_trait]
pub trait NodeMetadataStore: Send + Sync {
    async fn get(&self, id: &NodeId) -> Result<Option<Node>>;

    /// Set the authority of every node with this url; returns rows touched
    async fn update_authority(&self, url: &str, score: f64) -> Result<u64>;

    /// Join a full set of scores into node metadata by url
    async fn integrate_authority(&self, scores: &[AuthorityScore]) -> Result<u64> {
        let mut touched = 0;
        for s in scores {
            touched += self.update_authority(&s.url, s.score).await?;
        }
        Ok(touched)
    }
}
