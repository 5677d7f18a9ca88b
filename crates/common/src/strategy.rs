//! Retrieval and rerank strategy selectors
//!
//! Closed enums dispatched with exhaustive matches; adding a backend is a
//! compile-time checked change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Dense vector similarity only
    Vector,
    /// In-process BM25 only
    Sparse,
    /// Dense + sparse fused
    Hybrid,
    /// External full-text engine (wildcards, boolean syntax)
    FullText,
    /// Let the router decide per query
    Auto,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Vector => "vector",
            Strategy::Sparse => "sparse",
            Strategy::Hybrid => "hybrid",
            Strategy::FullText => "full_text",
            Strategy::Auto => "auto",
        }
    }

    /// Backends a strategy needs; Auto needs none until resolved
    pub fn backends(&self) -> &'static [Backend] {
        match self {
            Strategy::Vector => &[Backend::Dense],
            Strategy::Sparse => &[Backend::Sparse],
            Strategy::Hybrid => &[Backend::Dense, Backend::Sparse],
            Strategy::FullText => &[Backend::FullText],
            Strategy::Auto => &[],
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" | "vector_only" | "dense" => Ok(Strategy::Vector),
            "sparse" | "bm25" | "bm25_only" => Ok(Strategy::Sparse),
            "hybrid" => Ok(Strategy::Hybrid),
            "full_text" | "fulltext" | "es_only" => Ok(Strategy::FullText),
            "auto" => Ok(Strategy::Auto),
            other => Err(format!("unknown retrieval strategy: {other}")),
        }
    }
}

/// Rerank strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankStrategy {
    /// Stable sort by the retrieval score
    NoRerank,
    /// Replace the score with the node's authority score
    PageRankOnly,
    /// Boost candidates matching the user's recent queries
    Personalized,
    /// Pairwise cross-encoder model
    CrossEncoder,
    /// Pairwise sentence-encoder model
    SentenceEncoder,
}

impl RerankStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankStrategy::NoRerank => "no_rerank",
            RerankStrategy::PageRankOnly => "pagerank_only",
            RerankStrategy::Personalized => "personalized",
            RerankStrategy::CrossEncoder => "cross_encoder",
            RerankStrategy::SentenceEncoder => "sentence_encoder",
        }
    }

    pub fn uses_model(&self) -> bool {
        matches!(self, RerankStrategy::CrossEncoder | RerankStrategy::SentenceEncoder)
    }

    pub const ALL: [RerankStrategy; 5] = [
        RerankStrategy::NoRerank,
        RerankStrategy::PageRankOnly,
        RerankStrategy::Personalized,
        RerankStrategy::CrossEncoder,
        RerankStrategy::SentenceEncoder,
    ];
}

impl fmt::Display for RerankStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RerankStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no_rerank" | "none" => Ok(RerankStrategy::NoRerank),
            "pagerank_only" | "pagerank" => Ok(RerankStrategy::PageRankOnly),
            "personalized" => Ok(RerankStrategy::Personalized),
            "cross_encoder" | "bge_reranker" => Ok(RerankStrategy::CrossEncoder),
            "sentence_encoder" | "st_reranker" => Ok(RerankStrategy::SentenceEncoder),
            other => Err(format!("unknown rerank strategy: {other}")),
        }
    }
}

/// A concrete retrieval backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Dense,
    Sparse,
    FullText,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Dense => "dense",
            Backend::Sparse => "sparse",
            Backend::FullText => "full_text",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of successfully initialized backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendSet {
    pub dense: bool,
    pub sparse: bool,
    pub full_text: bool,
}

impl BackendSet {
    pub fn contains(&self, backend: Backend) -> bool {
        match backend {
            Backend::Dense => self.dense,
            Backend::Sparse => self.sparse,
            Backend::FullText => self.full_text,
        }
    }

    pub fn insert(&mut self, backend: Backend) {
        match backend {
            Backend::Dense => self.dense = true,
            Backend::Sparse => self.sparse = true,
            Backend::FullText => self.full_text = true,
        }
    }

    /// Whether every backend a strategy needs is present
    pub fn supports(&self, strategy: Strategy) -> bool {
        match strategy {
            Strategy::Auto => !self.is_empty(),
            other => other.backends().iter().all(|b| self.contains(*b)),
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.dense || self.sparse || self.full_text)
    }

    /// Compact identifier used in cache keys, e.g. `dense+sparse`
    pub fn fingerprint(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if self.dense {
            parts.push(Backend::Dense.as_str());
        }
        if self.sparse {
            parts.push(Backend::Sparse.as_str());
        }
        if self.full_text {
            parts.push(Backend::FullText.as_str());
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join("+")
        }
    }
}

impl FromIterator<Backend> for BackendSet {
    fn from_iter<I: IntoIterator<Item = Backend>>(iter: I) -> Self {
        let mut set = BackendSet::default();
        for backend in iter {
            set.insert(backend);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing_accepts_legacy_names() {
        assert_eq!("es_only".parse::<Strategy>().unwrap(), Strategy::FullText);
        assert_eq!("BM25".parse::<Strategy>().unwrap(), Strategy::Sparse);
        assert_eq!("bge_reranker".parse::<RerankStrategy>().unwrap(), RerankStrategy::CrossEncoder);
        assert!("semantic".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_backend_set_supports() {
        let set: BackendSet = [Backend::Dense, Backend::Sparse].into_iter().collect();
        assert!(set.supports(Strategy::Hybrid));
        assert!(!set.supports(Strategy::FullText));
        assert_eq!(set.fingerprint(), "dense+sparse");
        assert_eq!(BackendSet::default().fingerprint(), "none");
    }
}
