//! Conf file and conf name definition persistence

use async_trait::async_trait;

use crate::model::{ConfigFileDefData, ConfigNameDefData, FileKey};

#[async_trait]
pub trait DefinitionPersistence: Send + Sync {
    /// Find a conf file definition
    async fn file_def_find(&self, file: &FileKey) -> anyhow::Result<Option<ConfigFileDefData>>;

    /// List conf file definitions of a namespace, optionally narrowed to a conf_type.
    /// An empty namespace lists every namespace.
    async fn file_def_list(
        &self,
        namespace: &str,
        conf_type: Option<&str>,
    ) -> anyhow::Result<Vec<ConfigFileDefData>>;

    /// Create or update a file definition together with its name definitions
    async fn file_def_upsert(
        &self,
        def: &ConfigFileDefData,
        names: &[ConfigNameDefData],
    ) -> anyhow::Result<()>;

    /// List name definitions of a file; deleted names only when asked
    async fn name_def_list(
        &self,
        file: &FileKey,
        include_deleted: bool,
    ) -> anyhow::Result<Vec<ConfigNameDefData>>;

    /// Create or update name definitions, all in one transaction
    async fn name_def_upsert(&self, names: &[ConfigNameDefData]) -> anyhow::Result<()>;
}
