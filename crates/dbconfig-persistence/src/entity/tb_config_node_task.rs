//! Per-item apply tasks of the published revision

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tb_config_node_task")]
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
    #[sea_orm(column_type = "String(StringLen::N(128))")]
    pub conf_name: String,
    #[sea_orm(column_type = "Text")]
    pub value_before: String,
    #[sea_orm(column_type = "Text")]
    pub value_after: String,
    /// add, update or remove
    pub op_type: String,
    pub need_restart: i8,
    /// 0 pending, 1 applied
    pub stage: i32,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
