//! Table bootstrap for the external database
//!
//! Creates the dbconfig tables and their unique keys when missing. Existing
//! tables are left untouched.

use sea_orm::{ConnectionTrait, DatabaseConnection, Schema, sea_query::Index};
use tracing::info;

use crate::entity::{
    tb_config_applied, tb_config_file_def, tb_config_level_node, tb_config_name_def,
    tb_config_node, tb_config_node_task, tb_config_versioned,
};

pub async fn ensure_schema(db: &DatabaseConnection) -> anyhow::Result<()> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = vec![
        schema
            .create_table_from_entity(tb_config_file_def::Entity)
            .if_not_exists()
            .index(
                Index::create()
                    .name("uk_file")
                    .col(tb_config_file_def::Column::Namespace)
                    .col(tb_config_file_def::Column::ConfType)
                    .col(tb_config_file_def::Column::ConfFile)
                    .unique(),
            )
            .to_owned(),
        schema
            .create_table_from_entity(tb_config_name_def::Entity)
            .if_not_exists()
            .index(
                Index::create()
                    .name("uk_file_name")
                    .col(tb_config_name_def::Column::Namespace)
                    .col(tb_config_name_def::Column::ConfType)
                    .col(tb_config_name_def::Column::ConfFile)
                    .col(tb_config_name_def::Column::ConfName)
                    .unique(),
            )
            .to_owned(),
        schema
            .create_table_from_entity(tb_config_node::Entity)
            .if_not_exists()
            .index(
                Index::create()
                    .name("uk_node_name")
                    .col(tb_config_node::Column::BkBizId)
                    .col(tb_config_node::Column::Namespace)
                    .col(tb_config_node::Column::ConfType)
                    .col(tb_config_node::Column::ConfFile)
                    .col(tb_config_node::Column::LevelName)
                    .col(tb_config_node::Column::LevelValue)
                    .col(tb_config_node::Column::ConfName)
                    .unique(),
            )
            .to_owned(),
        schema
            .create_table_from_entity(tb_config_versioned::Entity)
            .if_not_exists()
            .index(
                Index::create()
                    .name("uk_node_revision")
                    .col(tb_config_versioned::Column::BkBizId)
                    .col(tb_config_versioned::Column::Namespace)
                    .col(tb_config_versioned::Column::ConfType)
                    .col(tb_config_versioned::Column::ConfFile)
                    .col(tb_config_versioned::Column::LevelName)
                    .col(tb_config_versioned::Column::LevelValue)
                    .col(tb_config_versioned::Column::Revision)
                    .unique(),
            )
            .to_owned(),
        schema
            .create_table_from_entity(tb_config_applied::Entity)
            .if_not_exists()
            .index(
                Index::create()
                    .name("uk_node")
                    .col(tb_config_applied::Column::BkBizId)
                    .col(tb_config_applied::Column::Namespace)
                    .col(tb_config_applied::Column::ConfType)
                    .col(tb_config_applied::Column::ConfFile)
                    .col(tb_config_applied::Column::LevelName)
                    .col(tb_config_applied::Column::LevelValue)
                    .unique(),
            )
            .to_owned(),
        schema
            .create_table_from_entity(tb_config_node_task::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(tb_config_level_node::Entity)
            .if_not_exists()
            .index(
                Index::create()
                    .name("uk_level_node")
                    .col(tb_config_level_node::Column::BkBizId)
                    .col(tb_config_level_node::Column::LevelName)
                    .col(tb_config_level_node::Column::LevelValue)
                    .col(tb_config_level_node::Column::Module)
                    .col(tb_config_level_node::Column::Cluster)
                    .unique(),
            )
            .to_owned(),
    ];

    for statement in &statements {
        db.execute(backend.build(statement)).await.map_err(super::store_failure)?;
    }

    info!("Database schema ensured ({} tables)", statements.len());
    Ok(())
}
