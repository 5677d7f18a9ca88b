//! Full-text retrieval through an external search engine
//!
//! Wildcard and boolean syntax is passed through. Scores are the engine's
//! own relevance and are not comparable with other backends.

use super::{MetadataFilter, RetrievalRequest, Retriever};
use crate::store::NodeStore;
use async_trait::async_trait;
use hybridrank_common::config::FullTextConfig;
use hybridrank_common::errors::{AppError, Result};
use hybridrank_common::types::{sort_and_rank, Node, NodeId, NodeMetadata, ScoredNode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shape of a `*` pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardShape {
    /// `南开*`
    Prefix(String),
    /// `*大学`
    Suffix(String),
    /// `南开*大学`
    Infix { prefix: String, suffix: String },
    /// Anything else, left to the engine's wildcard matcher
    Pattern,
}

/// Query analysed for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullTextQuery {
    /// No wildcard characters: title-boosted match
    Match { text: String, filter: Option<MetadataFilter> },
    Wildcard {
        pattern: String,
        shape: WildcardShape,
        /// `?` queries also try a fuzzy match on the literal remainder
        fuzzy: Option<String>,
        filter: Option<MetadataFilter>,
    },
}

impl FullTextQuery {
    pub fn parse(query: &str) -> Self {
        let query = query.trim();
        if !query.contains('*') && !query.contains('?') {
            return FullTextQuery::Match {
                text: query.to_string(),
                filter: None,
            };
        }

        let stars = query.matches('*').count();
        let shape = if stars == 1 && query.ends_with('*') && query.len() > 1 {
            WildcardShape::Prefix(query[..query.len() - 1].to_string())
        } else if stars == 1 && query.starts_with('*') && query.len() > 1 {
            WildcardShape::Suffix(query[1..].to_string())
        } else if stars == 1 {
            match query.split_once('*') {
                Some((prefix, suffix)) if !prefix.is_empty() && !suffix.is_empty() => WildcardShape::Infix {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                },
                _ => WildcardShape::Pattern,
            }
        } else {
            WildcardShape::Pattern
        };

        let fuzzy = if query.contains('?') {
            let literal: String = query.chars().filter(|c| *c != '?' && *c != '*').collect();
            (!literal.is_empty()).then_some(literal)
        } else {
            None
        };

        FullTextQuery::Wildcard {
            pattern: query.to_string(),
            shape,
            fuzzy,
            filter: None,
        }
    }

    pub fn with_filter(mut self, new_filter: Option<MetadataFilter>) -> Self {
        match &mut self {
            FullTextQuery::Match { filter, .. } | FullTextQuery::Wildcard { filter, .. } => *filter = new_filter,
        }
        self
    }

    fn filter(&self) -> Option<&MetadataFilter> {
        match self {
            FullTextQuery::Match { filter, .. } | FullTextQuery::Wildcard { filter, .. } => filter.as_ref(),
        }
    }

    /// Render as an Elasticsearch `_search` body
    pub fn to_search_body(&self, size: usize) -> Value {
        let should: Vec<Value> = match self {
            FullTextQuery::Match { text, .. } => vec![
                json!({"match": {"title": {"query": text, "boost": 2.0}}}),
                json!({"match": {"content": {"query": text, "boost": 1.0}}}),
            ],
            FullTextQuery::Wildcard { pattern, shape, fuzzy, .. } => {
                let mut clauses = Vec::new();
                for field in ["title.keyword", "content.keyword", "title", "content"] {
                    clauses.push(wildcard(field, pattern));
                }
                match shape {
                    WildcardShape::Prefix(prefix) => {
                        clauses.push(prefix_clause("title", prefix));
                        clauses.push(prefix_clause("content", prefix));
                    }
                    WildcardShape::Suffix(suffix) => {
                        clauses.push(wildcard("title", &format!("*{suffix}")));
                        clauses.push(wildcard("content", &format!("*{suffix}")));
                    }
                    WildcardShape::Infix { prefix, suffix } => {
                        for field in ["title", "content"] {
                            clauses.push(json!({"bool": {"must": [
                                prefix_clause(field, prefix),
                                wildcard(field, &format!("*{suffix}")),
                            ]}}));
                        }
                    }
                    WildcardShape::Pattern => {}
                }
                if let Some(literal) = fuzzy {
                    clauses.push(json!({"match": {"title": {"query": literal, "fuzziness": "AUTO"}}}));
                    clauses.push(json!({"match": {"content": {"query": literal, "fuzziness": "AUTO"}}}));
                }
                clauses.push(json!({"query_string": {
                    "query": pattern,
                    "fields": ["title", "content"],
                    "allow_leading_wildcard": true,
                    "analyze_wildcard": true,
                    "lenient": true,
                }}));
                clauses
            }
        };

        let mut bool_query = json!({"should": should, "minimum_should_match": 1});
        if let Some(filter) = self.filter() {
            let terms: Vec<Value> = filter.iter().map(|(k, v)| json!({"term": {k: v}})).collect();
            bool_query["filter"] = Value::Array(terms);
        }

        json!({"size": size, "query": {"bool": bool_query}})
    }
}

fn wildcard(field: &str, value: &str) -> Value {
    json!({"wildcard": {field: {"value": value, "case_insensitive": true}}})
}

fn prefix_clause(field: &str, value: &str) -> Value {
    json!({"prefix": {field: {"value": value, "case_insensitive": true}}})
}

/// A hit from the engine, optionally carrying the stored document
#[derive(Debug, Clone)]
pub struct FullTextHit {
    pub id: NodeId,
    pub score: f32,
    pub document: Option<Node>,
}

/// Search capability of an external full-text engine
#[async_trait]
pub trait FullTextClient: Send + Sync {
    async fn search(&self, query: &FullTextQuery, size: usize) -> Result<Vec<FullTextHit>>;
}

/// Elasticsearch-compatible HTTP client
pub struct ElasticsearchClient {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: Option<HitSource>,
}

#[derive(Deserialize, Default)]
struct HitSource {
    #[serde(default)]
    content: String,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "original_url")]
    url: String,
    #[serde(default)]
    platform: String,
    #[serde(default, alias = "pagerank_score")]
    authority_score: f64,
}

impl ElasticsearchClient {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
        })
    }

    pub fn from_config(config: &FullTextConfig, timeout: Duration) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| AppError::BackendUnavailable {
            backend: "full_text".to_string(),
            message: "fulltext.url is not configured".to_string(),
        })?;
        Self::new(url, config.index.clone(), timeout)
    }

    /// Check the engine answers at all
    pub async fn ping(&self) -> Result<()> {
        let response = self.client.get(&self.base_url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::BackendUnavailable {
                backend: "full_text".to_string(),
                message: format!("engine returned {}", response.status()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FullTextClient for ElasticsearchClient {
    async fn search(&self, query: &FullTextQuery, size: usize) -> Result<Vec<FullTextHit>> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let body = query.to_search_body(size);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::retrieval("full_text", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::retrieval("full_text", format!("engine error {}: {}", status, text)));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::retrieval("full_text", e))?;

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let id = NodeId(hit.id);
                let document = hit.source.map(|src| Node {
                    id: id.clone(),
                    text: src.content,
                    metadata: NodeMetadata {
                        title: src.title,
                        url: src.url,
                        platform: src.platform,
                        authority_score: src.authority_score,
                        ..NodeMetadata::default()
                    },
                });
                FullTextHit {
                    id,
                    score: hit.score.unwrap_or(0.0),
                    document,
                }
            })
            .collect())
    }
}

/// Full-text retriever
pub struct FullTextRetriever {
    client: Arc<dyn FullTextClient>,
    nodes: Arc<NodeStore>,
}

impl FullTextRetriever {
    pub fn new(client: Arc<dyn FullTextClient>, nodes: Arc<NodeStore>) -> Self {
        Self { client, nodes }
    }
}

#[async_trait]
impl Retriever for FullTextRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ScoredNode>> {
        if request.query.trim().is_empty() || request.top_k == 0 {
            return Ok(Vec::new());
        }

        let query = FullTextQuery::parse(&request.query).with_filter(request.filter.clone());
        let hits = self.client.search(&query, request.top_k).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let node = match self.nodes.get(&hit.id) {
                Some(node) => node,
                None => match hit.document {
                    Some(doc) => Arc::new(doc),
                    None => {
                        debug!(id = %hit.id, "Full-text hit without document");
                        continue;
                    }
                },
            };
            if request.admits(&node.metadata) {
                results.push(ScoredNode::new(node, hit.score as f64));
            }
        }

        sort_and_rank(&mut results);
        results.truncate(request.top_k);
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "full_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shapes() {
        assert!(matches!(FullTextQuery::parse("南开大学"), FullTextQuery::Match { .. }));

        match FullTextQuery::parse("南开*") {
            FullTextQuery::Wildcard { shape, fuzzy, .. } => {
                assert_eq!(shape, WildcardShape::Prefix("南开".into()));
                assert_eq!(fuzzy, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        match FullTextQuery::parse("*大学") {
            FullTextQuery::Wildcard { shape, .. } => assert_eq!(shape, WildcardShape::Suffix("大学".into())),
            other => panic!("unexpected {other:?}"),
        }
        match FullTextQuery::parse("南开*大学") {
            FullTextQuery::Wildcard { shape, .. } => assert_eq!(
                shape,
                WildcardShape::Infix { prefix: "南开".into(), suffix: "大学".into() }
            ),
            other => panic!("unexpected {other:?}"),
        }
        match FullTextQuery::parse("南?大学") {
            FullTextQuery::Wildcard { shape, fuzzy, .. } => {
                assert_eq!(shape, WildcardShape::Pattern);
                assert_eq!(fuzzy.as_deref(), Some("南大学"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_match_body_boosts_title() {
        let body = FullTextQuery::parse("library").to_search_body(7);
        assert_eq!(body["size"], 7);
        assert_eq!(body["query"]["bool"]["should"][0]["match"]["title"]["boost"], 2.0);
        assert!(body["query"]["bool"].get("filter").is_none());
    }

    #[test]
    fn test_wildcard_body_has_query_string_fallback_and_filter() {
        let body = FullTextQuery::parse("南开*")
            .with_filter(Some(MetadataFilter::new().with("platform", "wechat")))
            .to_search_body(5);
        let should = body["query"]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.last().unwrap()["query_string"]["query"], "南开*");
        assert!(should.iter().any(|c| c["prefix"]["title"]["value"] == "南开"));
        assert_eq!(body["query"]["bool"]["filter"][0]["term"]["platform"], "wechat");
    }

    #[test]
    fn test_hit_source_aliases() {
        let raw = r#"{"hits": {"hits": [{"_id": "9", "_score": 3.5,
            "_source": {"content": "c", "title": "t", "original_url": "u", "pagerank_score": 0.2}}]}}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        let src = parsed.hits.hits[0].source.as_ref().unwrap();
        assert_eq!(src.url, "u");
        assert_eq!(src.authority_score, 0.2);
    }
}
