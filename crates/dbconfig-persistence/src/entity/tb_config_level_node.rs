//! Level registry
//!
//! Records the module/cluster parents of module, cluster and instance nodes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tb_config_level_node")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub bk_biz_id: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub level_name: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub level_value: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub module: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub cluster: String,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
