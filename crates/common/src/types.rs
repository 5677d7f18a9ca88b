//! Core domain types shared by the search engine and the authority job
//!
//! - Nodes (documents) and their metadata
//! - Transient scored nodes produced per request
//! - Link edges and authority scores for the PageRank job
//! - Search history entries used for personalization

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable document identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Document metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub title: String,
    pub url: String,
    pub platform: String,
    /// Link authority, written only by PageRank integration
    #[serde(default)]
    pub authority_score: f64,
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl NodeMetadata {
    /// Look up a metadata attribute by key, built-in fields first
    pub fn attr(&self, key: &str) -> Option<&str> {
        match key {
            "title" => Some(&self.title),
            "url" => Some(&self.url),
            "platform" => Some(&self.platform),
            _ => self.custom.get(key).map(String::as_str),
        }
    }
}

/// A document in the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub text: String,
    pub metadata: NodeMetadata,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: NodeMetadata::default(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.url = url.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = title.into();
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.metadata.platform = platform.into();
        self
    }

    pub fn with_authority(mut self, score: f64) -> Self {
        self.metadata.authority_score = sanitize_score(score);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.custom.insert(key.into(), value.into());
        self
    }
}

/// Replace NaN and infinities with 0.0
pub fn sanitize_score(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// A node with a request-scoped relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: Arc<Node>,
    pub score: f64,
    /// 1-based position in the list this node was produced in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    /// Score before reranking, kept when configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_score: Option<f64>,
}

impl ScoredNode {
    pub fn new(node: Arc<Node>, score: f64) -> Self {
        Self {
            node,
            score: sanitize_score(score),
            rank: None,
            retrieval_score: None,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.node.id
    }

    pub fn text(&self) -> &str {
        &self.node.text
    }

    pub fn set_score(&mut self, score: f64) {
        self.score = sanitize_score(score);
    }
}

/// Descending score order; NaN-free by construction
pub fn by_score_desc(a: &ScoredNode, b: &ScoredNode) -> Ordering {
    b.score.total_cmp(&a.score)
}

/// Stable sort by descending score, then assign 1-based ranks
pub fn sort_and_rank(nodes: &mut [ScoredNode]) {
    nodes.sort_by(by_score_desc);
    for (i, node) in nodes.iter_mut().enumerate() {
        node.rank = Some(i + 1);
    }
}

/// Directed hyperlink between two pages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkEdge {
    pub source_url: String,
    pub target_url: String,
}

impl LinkEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_url: source.into(),
            target_url: target.into(),
        }
    }
}

/// Persisted link authority for a url
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityScore {
    pub url: String,
    pub score: f64,
    pub computed_at: DateTime<Utc>,
}

/// A past query issued by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub user_id: String,
    pub query_text: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_score() {
        assert_eq!(sanitize_score(f64::NAN), 0.0);
        assert_eq!(sanitize_score(f64::INFINITY), 0.0);
        assert_eq!(sanitize_score(f64::NEG_INFINITY), 0.0);
        assert_eq!(sanitize_score(0.25), 0.25);
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let nodes: Vec<Arc<Node>> = (0..4u64).map(|i| Arc::new(Node::new(i, "t"))).collect();
        let mut scored = vec![
            ScoredNode::new(nodes[0].clone(), 0.5),
            ScoredNode::new(nodes[1].clone(), 0.9),
            ScoredNode::new(nodes[2].clone(), 0.5),
            ScoredNode::new(nodes[3].clone(), f64::NAN),
        ];
        sort_and_rank(&mut scored);

        let ids: Vec<&str> = scored.iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, vec!["1", "0", "2", "3"]);
        assert_eq!(scored[0].rank, Some(1));
        assert_eq!(scored[3].score, 0.0);
    }

    #[test]
    fn test_metadata_attr_lookup() {
        let node = Node::new("a", "text")
            .with_platform("wechat")
            .with_attr("college", "cs");
        assert_eq!(node.metadata.attr("platform"), Some("wechat"));
        assert_eq!(node.metadata.attr("college"), Some("cs"));
        assert_eq!(node.metadata.attr("missing"), None);
    }
}
