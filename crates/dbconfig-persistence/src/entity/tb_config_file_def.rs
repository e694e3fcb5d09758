//! Conf file definitions
//!
//! One row per (namespace, conf_type, conf_file).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tb_config_file_def")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub namespace: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub conf_type: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub conf_file: String,
    pub conf_type_lc: String,
    pub conf_file_lc: String,
    /// Comma separated levels allowed to hold items
    pub level_names: String,
    /// Level at which revisions are generated; empty for unversioned files
    pub level_versioned: String,
    pub conf_name_validate: i8,
    pub value_type_strict: i8,
    pub version_keep_limit: i32,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub updated_by: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
