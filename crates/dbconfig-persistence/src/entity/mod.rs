//! `SeaORM` Entity definitions for the dbconfig tables

pub mod prelude;

pub mod tb_config_applied;
pub mod tb_config_file_def;
pub mod tb_config_level_node;
pub mod tb_config_name_def;
pub mod tb_config_node;
pub mod tb_config_node_task;
pub mod tb_config_versioned;
