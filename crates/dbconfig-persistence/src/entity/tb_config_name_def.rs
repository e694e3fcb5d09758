//! Conf name definitions
//!
//! Rows with `flag_status >= 1` double as the platform-level items of their
//! conf file: `value_default` is the plat value and `flag_locked` the plat lock.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tb_config_name_def")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub namespace: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub conf_type: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub conf_file: String,
    #[sea_orm(column_type = "String(StringLen::N(128))")]
    pub conf_name: String,
    pub value_type: String,
    pub value_type_sub: String,
    #[sea_orm(column_type = "Text")]
    pub value_allowed: String,
    #[sea_orm(column_type = "Text")]
    pub value_default: String,
    pub need_restart: i8,
    pub flag_locked: i8,
    /// 1 visible, 2 visible read-only, 0 hidden, -1 deleted
    pub flag_status: i32,
    pub flag_encrypt: i8,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub updated_by: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
