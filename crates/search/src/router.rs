//! Per-query strategy selection
//!
//! A pure function of the query text and the backends that initialised.

use hybridrank_common::strategy::{BackendSet, Strategy};

/// Queries longer than this (in characters) are treated as natural language
const LONG_QUERY_CHARS: usize = 20;

/// Queries at most this long go to sparse retrieval when it is available
const SHORT_QUERY_CHARS: usize = 10;

const INTERROGATIVE_MARKERS: [&str; 6] = ["？", "?", "如何", "什么", "为什么", "怎么"];

/// Pick a strategy for `query`, or `None` if no backend is available
pub fn select_strategy(query: &str, available: BackendSet) -> Option<Strategy> {
    let query = query.trim();
    let chars = query.chars().count();

    if (query.contains('*') || query.contains('?')) && available.full_text {
        return Some(Strategy::FullText);
    }

    if chars > LONG_QUERY_CHARS || INTERROGATIVE_MARKERS.iter().any(|m| query.contains(m)) {
        if let Some(strategy) = first_supported(&[Strategy::Hybrid, Strategy::Vector], available) {
            return Some(strategy);
        }
    }

    if chars <= SHORT_QUERY_CHARS && available.sparse {
        return Some(Strategy::Sparse);
    }

    first_supported(
        &[Strategy::Hybrid, Strategy::Vector, Strategy::Sparse, Strategy::FullText],
        available,
    )
}

fn first_supported(candidates: &[Strategy], available: BackendSet) -> Option<Strategy> {
    candidates.iter().copied().find(|s| available.supports(*s))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: BackendSet = BackendSet {
        dense: true,
        sparse: true,
        full_text: true,
    };

    #[test]
    fn test_wildcard_goes_to_full_text() {
        assert_eq!(select_strategy("南开*", ALL), Some(Strategy::FullText));
        assert_eq!(select_strategy("nan?ai", ALL), Some(Strategy::FullText));
    }

    #[test]
    fn test_wildcard_without_full_text_falls_through() {
        let no_es = BackendSet {
            full_text: false,
            ..ALL
        };
        // a trailing '?' is also an interrogative marker
        assert_eq!(select_strategy("南开?", no_es), Some(Strategy::Hybrid));
        assert_eq!(select_strategy("南开*", no_es), Some(Strategy::Sparse));
    }

    #[test]
    fn test_short_query_prefers_sparse() {
        let set = BackendSet {
            dense: true,
            sparse: true,
            full_text: false,
        };
        assert_eq!(select_strategy("南开大学图书馆", set), Some(Strategy::Sparse));
    }

    #[test]
    fn test_long_or_interrogative_prefers_hybrid() {
        assert_eq!(
            select_strategy("how do I apply for the scholarship this year", ALL),
            Some(Strategy::Hybrid)
        );
        assert_eq!(select_strategy("如何申请", ALL), Some(Strategy::Hybrid));

        let dense_only = BackendSet {
            dense: true,
            ..BackendSet::default()
        };
        assert_eq!(select_strategy("为什么", dense_only), Some(Strategy::Vector));
    }

    #[test]
    fn test_interrogative_with_sparse_only() {
        let sparse_only = BackendSet {
            sparse: true,
            ..BackendSet::default()
        };
        assert_eq!(select_strategy("什么", sparse_only), Some(Strategy::Sparse));
    }

    #[test]
    fn test_medium_query_default_precedence() {
        let query = "campus library hours";
        assert_eq!(select_strategy(query, ALL), Some(Strategy::Hybrid));

        let es_only = BackendSet {
            full_text: true,
            ..BackendSet::default()
        };
        assert_eq!(select_strategy(query, es_only), Some(Strategy::FullText));
    }

    #[test]
    fn test_no_backends() {
        assert_eq!(select_strategy("anything", BackendSet::default()), None);
    }
}
