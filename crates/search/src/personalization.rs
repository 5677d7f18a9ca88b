//! Personalization feed
//!
//! Best-effort read of a user's recent queries. Any failure yields an empty
//! history so the request proceeds unpersonalized.

use hybridrank_common::config::PersonalizationConfig;
use hybridrank_common::errors::AppError;
use hybridrank_common::stores::SearchHistoryStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct PersonalizationFeed {
    store: Option<Arc<dyn SearchHistoryStore>>,
    enabled: bool,
    limit: usize,
    timeout: Duration,
}

impl PersonalizationFeed {
    pub fn new(store: Option<Arc<dyn SearchHistoryStore>>, config: &PersonalizationConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            limit: config.history_limit,
            timeout: Duration::from_millis(config.lookup_timeout_ms),
        }
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            enabled: false,
            limit: 0,
            timeout: Duration::ZERO,
        }
    }

    /// Up to `history_limit` distinct recent queries, newest first
    pub async fn history(&self, user_id: Option<&str>) -> Vec<String> {
        let (Some(store), Some(user_id)) = (&self.store, user_id) else {
            return Vec::new();
        };
        if !self.enabled || self.limit == 0 {
            return Vec::new();
        }

        match tokio::time::timeout(self.timeout, store.recent_queries(user_id, self.limit)).await {
            Ok(Ok(mut queries)) => {
                queries.truncate(self.limit);
                debug!(user_id, terms = queries.len(), "Loaded search history");
                queries
            }
            Ok(Err(e)) => {
                let error = AppError::PersonalizationLookup { message: e.to_string() };
                warn!(user_id, error = %error, "Personalization disabled for request");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    user_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Search history lookup timed out, personalization disabled for request"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hybridrank_common::errors::Result;

    struct Fixed(Vec<String>);

    #[async_trait]
    impl SearchHistoryStore for Fixed {
        async fn recent_queries(&self, _user_id: &str, limit: usize) -> Result<Vec<String>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl SearchHistoryStore for Broken {
        async fn recent_queries(&self, _user_id: &str, _limit: usize) -> Result<Vec<String>> {
            Err(AppError::Internal {
                message: "db down".into(),
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl SearchHistoryStore for Slow {
        async fn recent_queries(&self, _user_id: &str, _limit: usize) -> Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec!["late".into()])
        }
    }

    fn config(limit: usize) -> PersonalizationConfig {
        PersonalizationConfig {
            history_limit: limit,
            lookup_timeout_ms: 50,
            ..PersonalizationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_history_is_limited() {
        let store = Arc::new(Fixed(vec!["a".into(), "b".into(), "c".into()]));
        let feed = PersonalizationFeed::new(Some(store), &config(2));
        assert_eq!(feed.history(Some("u1")).await, vec!["a", "b"]);
        assert!(feed.history(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_failures_yield_empty_history() {
        let broken = PersonalizationFeed::new(Some(Arc::new(Broken)), &config(10));
        assert!(broken.history(Some("u1")).await.is_empty());

        let slow = PersonalizationFeed::new(Some(Arc::new(Slow)), &config(10));
        assert!(slow.history(Some("u1")).await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_feed() {
        let store = Arc::new(Fixed(vec!["a".into()]));
        let feed = PersonalizationFeed::new(
            Some(store),
            &PersonalizationConfig {
                enabled: false,
                ..config(10)
            },
        );
        assert!(feed.history(Some("u1")).await.is_empty());
        assert!(PersonalizationFeed::disabled().history(Some("u1")).await.is_empty());
    }
}
