//! Postgres-backed stores
//!
//! One handle implements every store interface over the shared pool.
//! Reads go to the replica when configured, writes to the primary.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use crate::stores::{LinkGraphStore, NodeMetadataStore, SearchHistoryStore};
use crate::types::{AuthorityScore, LinkEdge, Node, NodeId};
use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter, Set,
    Statement,
};
use tracing::debug;

/// Postgres implementation of the store interfaces
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// Load every document, for building the in-memory corpus
    pub async fn load_documents(&self) -> Result<Vec<Node>> {
        let rows = DocumentEntity::find().all(self.read_conn()).await?;
        Ok(rows.into_iter().map(Node::from).collect())
    }
}

#[async_trait]
impl LinkGraphStore for PgStore {
    async fn load_edges(&self) -> Result<Vec<LinkEdge>> {
        let rows = LinkEdgeEntity::find().all(self.read_conn()).await?;
        debug!(edges = rows.len(), "Loaded link graph");
        Ok(rows.into_iter().map(LinkEdge::from).collect())
    }

    async fn upsert_authority(&self, url: &str, score: f64) -> Result<()> {
        let score = AuthorityScore {
            url: url.to_string(),
            score,
            computed_at: chrono::Utc::now(),
        };
        self.upsert_authority_batch(std::slice::from_ref(&score)).await
    }

    async fn upsert_authority_batch(&self, scores: &[AuthorityScore]) -> Result<()> {
        if scores.is_empty() {
            return Ok(());
        }

        let rows = scores.iter().map(|s| AuthorityScoreActiveModel {
            url: Set(s.url.clone()),
            score: Set(s.score),
            computed_at: Set(s.computed_at.into()),
        });

        AuthorityScoreEntity::insert_many(rows)
            .on_conflict(
                OnConflict::column(AuthorityScoreColumn::Url)
                    .update_columns([AuthorityScoreColumn::Score, AuthorityScoreColumn::ComputedAt])
                    .to_owned(),
            )
            .exec(self.write_conn())
            .await?;

        debug!(rows = scores.len(), "Upserted authority scores");
        Ok(())
    }
}

#[async_trait]
impl SearchHistoryStore for PgStore {
    async fn recent_queries(&self, user_id: &str, limit: usize) -> Result<Vec<String>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT query_text
            FROM search_history
            WHERE user_id = $1
            GROUP BY query_text
            ORDER BY MAX(created_at) DESC
            LIMIT $2
            "#,
            [user_id.into(), (limit as i64).into()],
        );

        let rows = self.read_conn().query_all(stmt).await?;
        let mut queries = Vec::with_capacity(rows.len());
        for row in rows {
            queries.push(row.try_get::<String>("", "query_text")?);
        }
        Ok(queries)
    }
}

#[async_trait]
impl NodeMetadataStore for PgStore {
    async fn get(&self, id: &NodeId) -> Result<Option<Node>> {
        let row = DocumentEntity::find_by_id(id.as_str().to_string())
            .one(self.read_conn())
            .await?;
        Ok(row.map(Node::from))
    }

    async fn update_authority(&self, url: &str, score: f64) -> Result<u64> {
        let result = DocumentEntity::update_many()
            .col_expr(DocumentColumn::AuthorityScore, Expr::value(score))
            .filter(DocumentColumn::Url.eq(url))
            .exec(self.write_conn())
            .await?;
        Ok(result.rows_affected)
    }

    /// Single joined update against the persisted scores
    async fn integrate_authority(&self, scores: &[AuthorityScore]) -> Result<u64> {
        if scores.is_empty() {
            return Ok(0);
        }

        let stmt = Statement::from_string(
            DbBackend::Postgres,
            r#"
            UPDATE documents d
            SET authority_score = a.score, updated_at = NOW()
            FROM authority_scores a
            WHERE d.url = a.url
            "#,
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected())
    }
}
