//! Indexed document entity

use crate::types::{Node, NodeId, NodeMetadata};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub url: String,

    #[sea_orm(column_type = "Text")]
    pub platform: String,

    /// Written only by the authority job
    #[sea_orm(column_type = "Double")]
    pub authority_score: f64,

    /// Free-form string attributes as JSONB
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Node {
    fn from(model: Model) -> Self {
        let custom: BTreeMap<String, String> = match model.metadata {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        Node {
            id: NodeId(model.id),
            text: model.content,
            metadata: NodeMetadata {
                title: model.title,
                url: model.url,
                platform: model.platform,
                authority_score: crate::types::sanitize_score(model.authority_score),
                custom,
            },
        }
    }
}
