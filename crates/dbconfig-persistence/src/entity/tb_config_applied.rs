//! Applied revision per node

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tb_config_applied")]
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
    pub revision_applied: String,
    pub applied_by: String,
    pub applied_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
