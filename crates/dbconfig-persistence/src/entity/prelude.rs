pub use super::tb_config_applied::Entity as TbConfigApplied;
pub use super::tb_config_file_def::Entity as TbConfigFileDef;
pub use super::tb_config_level_node::Entity as TbConfigLevelNode;
pub use super::tb_config_name_def::Entity as TbConfigNameDef;
pub use super::tb_config_node::Entity as TbConfigNode;
pub use super::tb_config_node_task::Entity as TbConfigNodeTask;
pub use super::tb_config_versioned::Entity as TbConfigVersioned;
