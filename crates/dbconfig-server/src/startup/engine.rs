//! Store and engine construction from the configuration

use std::sync::Arc;

use tracing::info;

use dbconfig_common::ValueCodec;
use dbconfig_engine::ConfigEngine;
use dbconfig_persistence::{ConfigStore, MemoryConfigStore, SqlConfigStore, StorageMode, ensure_schema};

use crate::model::Configuration;

/// Open the configured backing store, creating missing tables
pub async fn init_store(configuration: &Configuration) -> anyhow::Result<Arc<dyn ConfigStore>> {
    let mode = configuration.storage_mode()?;
    info!("Persistence mode: {}", mode);

    match mode {
        StorageMode::ExternalDb => {
            let db = configuration.database_connection().await?;
            ensure_schema(&db).await?;
            Ok(Arc::new(SqlConfigStore::new(db)))
        }
        StorageMode::Memory => Ok(Arc::new(MemoryConfigStore::new())),
    }
}

/// Engine over `store` using the configured codec and version policy
pub fn build_engine(configuration: &Configuration, store: Arc<dyn ConfigStore>) -> ConfigEngine {
    build_engine_with_codec(configuration, store, configuration.value_codec())
}

pub fn build_engine_with_codec(
    configuration: &Configuration,
    store: Arc<dyn ConfigStore>,
    codec: ValueCodec,
) -> ConfigEngine {
    ConfigEngine::builder(store)
        .codec(codec)
        .policy(configuration.version_policy())
        .build()
}
