//! Link graph edge entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "link_graph")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Page containing the hyperlink
    #[sea_orm(column_type = "Text")]
    pub source_url: String,

    /// Page the hyperlink points at
    #[sea_orm(column_type = "Text")]
    pub target_url: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::types::LinkEdge {
    fn from(model: Model) -> Self {
        crate::types::LinkEdge::new(model.source_url, model.target_url)
    }
}
