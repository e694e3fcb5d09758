//! Revision snapshots
//!
//! `(node, revision)` is unique; concurrent generators rely on that index.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tb_config_versioned")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub bk_biz_id: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub namespace: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub conf_type: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub conf_file: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub level_name: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub level_value: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub revision: String,
    /// JSON list of merged items
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub content_md5: String,
    pub is_published: i8,
    pub pre_revision: String,
    pub rows_affected: i32,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
