//! Dense retrieval over an external vector store
//!
//! The query is embedded, the store returns node ids with similarity
//! scores, and ids are resolved against the node store.

use super::{MetadataFilter, RetrievalRequest, Retriever};
use crate::store::NodeStore;
use async_trait::async_trait;
use hybridrank_common::db::DbPool;
use hybridrank_common::embeddings::EmbeddingProvider;
use hybridrank_common::errors::{AppError, Result};
use hybridrank_common::types::{sort_and_rank, NodeId, ScoredNode};
use sea_orm::{ConnectionTrait, DbBackend, Statement, Value};
use std::sync::Arc;
use tracing::debug;

/// Similarity search capability of a vector database
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    /// Ids with native similarity, best first
    async fn similarity_search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(NodeId, f32)>>;

    /// Whether `filter` is evaluated by the store itself
    fn supports_filter(&self) -> bool {
        false
    }
}

/// pgvector cosine similarity over the `documents` table
pub struct PgVectorStore {
    db: DbPool,
}

impl PgVectorStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Build the similarity query; filter constraints become bound parameters
    fn build_query(embedding: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> (String, Vec<Value>) {
        let embedding_str = format!(
            "[{}]",
            embedding
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        let mut sql = format!(
            r#"
            SELECT d.id, 1 - (d.embedding <=> '{embedding}'::vector) AS score
            FROM documents d
            WHERE d.embedding IS NOT NULL
            "#,
            embedding = embedding_str
        );

        let mut values: Vec<Value> = Vec::new();
        for (key, value) in filter.into_iter().flat_map(|f| f.iter()) {
            match key.as_str() {
                "title" | "url" | "platform" => {
                    values.push(value.clone().into());
                    sql.push_str(&format!(" AND d.{} = ${}", key, values.len()));
                }
                _ => {
                    values.push(key.clone().into());
                    values.push(value.clone().into());
                    sql.push_str(&format!(
                        " AND d.metadata ->> ${} = ${}",
                        values.len() - 1,
                        values.len()
                    ));
                }
            }
        }

        values.push((top_k as i64).into());
        sql.push_str(&format!(
            " ORDER BY d.embedding <=> '{}'::vector LIMIT ${}",
            embedding_str,
            values.len()
        ));

        (sql, values)
    }
}

#[async_trait]
impl VectorStoreClient for PgVectorStore {
    async fn similarity_search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(NodeId, f32)>> {
        let (sql, values) = Self::build_query(embedding, top_k, filter);
        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(DbBackend::Postgres, &sql, values))
            .await
            .map_err(|e| AppError::retrieval("dense", e))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("", "id").map_err(|e| AppError::retrieval("dense", e))?;
            let score: f64 = row.try_get("", "score").map_err(|e| AppError::retrieval("dense", e))?;
            hits.push((NodeId(id), score as f32));
        }
        Ok(hits)
    }

    fn supports_filter(&self) -> bool {
        true
    }
}

/// Dense retriever
pub struct DenseRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreClient>,
    nodes: Arc<NodeStore>,
}

impl DenseRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreClient>,
        nodes: Arc<NodeStore>,
    ) -> Self {
        Self { embedder, store, nodes }
    }
}

#[async_trait]
impl Retriever for DenseRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ScoredNode>> {
        if request.query.trim().is_empty() || request.top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed_query(&request.query).await?;
        let pushed_down = self.store.supports_filter();
        let hits = self
            .store
            .similarity_search(&embedding, request.top_k, request.filter.as_ref())
            .await?;

        let mut results = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            let Some(node) = self.nodes.get(&id) else {
                debug!(id = %id, "Vector hit not present in node store");
                continue;
            };
            if !pushed_down && !request.admits(&node.metadata) {
                continue;
            }
            results.push(ScoredNode::new(node, score as f64));
        }

        sort_and_rank(&mut results);
        results.truncate(request.top_k);
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridrank_common::embeddings::MockEmbedder;
    use hybridrank_common::types::Node;

    struct FixedStore(Vec<(NodeId, f32)>);

    #[async_trait]
    impl VectorStoreClient for FixedStore {
        async fn similarity_search(
            &self,
            _embedding: &[f32],
            top_k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<(NodeId, f32)>> {
            Ok(self.0.iter().take(top_k).cloned().collect())
        }
    }

    #[test]
    fn test_query_binds_filter_values() {
        let filter = MetadataFilter::new().with("college", "cs").with("platform", "wechat");
        let (sql, values) = PgVectorStore::build_query(&[0.1, 0.2], 5, Some(&filter));
        assert!(sql.contains("'[0.1,0.2]'::vector"));
        assert!(sql.contains("d.metadata ->> $1 = $2"));
        assert!(sql.contains("d.platform = $3"));
        assert!(sql.contains("LIMIT $4"));
        assert_eq!(values.len(), 4);
    }

    #[tokio::test]
    async fn test_dense_resolves_ids_and_filters_post_hoc() {
        let nodes = Arc::new(NodeStore::from_nodes([
            Node::new("a", "alpha").with_platform("wechat"),
            Node::new("b", "beta").with_platform("website"),
        ]));
        let store = FixedStore(vec![
            (NodeId::from("b"), 0.9),
            (NodeId::from("ghost"), 0.8),
            (NodeId::from("a"), 0.7),
        ]);
        let retriever = DenseRetriever::new(Arc::new(MockEmbedder::new(8)), Arc::new(store), nodes);

        let all = retriever.retrieve(&RetrievalRequest::new("q", 10)).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.id().as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let request = RetrievalRequest::new("q", 10)
            .with_filter(Some(MetadataFilter::new().with("platform", "wechat")));
        let filtered = retriever.retrieve(&request).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id().as_str(), "a");
    }
}
