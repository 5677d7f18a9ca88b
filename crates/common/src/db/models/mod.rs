//! SeaORM entity models

mod authority_score;
mod document;
mod link_edge;
mod search_history;

pub use link_edge::{
    Entity as LinkEdgeEntity,
    Model as LinkEdgeRow,
    ActiveModel as LinkEdgeActiveModel,
    Column as LinkEdgeColumn,
};

pub use authority_score::{
    Entity as AuthorityScoreEntity,
    Model as AuthorityScoreRow,
    ActiveModel as AuthorityScoreActiveModel,
    Column as AuthorityScoreColumn,
};

pub use search_history::{
    Entity as SearchHistoryEntity,
    Model as SearchHistoryRow,
    ActiveModel as SearchHistoryActiveModel,
    Column as SearchHistoryColumn,
};

pub use document::{
    Entity as DocumentEntity,
    Model as DocumentRow,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
};
