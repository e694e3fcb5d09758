//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use dbconfig_common::{DbConfigError, ValueCodec};
use dbconfig_engine::{ConfigEngine, ConfigNode, LevelName, VersionPolicy};
use dbconfig_persistence::{
    ConfigFileDefData, ConfigNameDefData, ConfigStore, FileKey, MemoryConfigStore,
};

pub const OPERATOR: &str = "tester";
pub const KEY_PREFIX: &str = "test-prefix";
pub const BIZ: &str = "3";

/// Conf file edited with `save`
pub const PLAIN_FILE: &str = "MySQL-5.7";
/// Conf file versioned at the cluster level
pub const VERSIONED_FILE: &str = "MySQL-8.0";

pub fn store() -> Arc<dyn ConfigStore> {
    Arc::new(MemoryConfigStore::new())
}

pub fn engine_with(store: Arc<dyn ConfigStore>, key_prefix: &str) -> ConfigEngine {
    ConfigEngine::builder(store)
        .codec(ValueCodec::new(key_prefix, false))
        .policy(VersionPolicy::new(Duration::ZERO, Duration::from_secs(10)))
        .build()
}

pub fn engine() -> ConfigEngine {
    engine_with(store(), KEY_PREFIX)
}

pub fn file(conf_file: &str) -> FileKey {
    FileKey::new("tendbha", "dbconf", conf_file)
}

pub fn node(conf_file: &str, level: LevelName, value: &str) -> ConfigNode {
    match level {
        LevelName::Plat => ConfigNode::plat(file(conf_file)),
        _ => ConfigNode::new(BIZ, file(conf_file), level, value).unwrap(),
    }
}

fn name(conf_name: &str, value_type: &str, sub: &str, allowed: &str, default: &str) -> ConfigNameDefData {
    ConfigNameDefData {
        conf_name: conf_name.to_string(),
        value_type: value_type.to_string(),
        value_type_sub: sub.to_string(),
        value_allowed: allowed.to_string(),
        value_default: default.to_string(),
        flag_status: 1,
        ..Default::default()
    }
}

/// Register a conf file with a small MySQL-like schema
pub async fn setup_file(engine: &ConfigEngine, conf_file: &str, level_versioned: &str) {
    let def = ConfigFileDefData {
        namespace: "tendbha".to_string(),
        conf_type: "dbconf".to_string(),
        conf_file: conf_file.to_string(),
        level_names: "plat,app,module,cluster,instance".to_string(),
        level_versioned: level_versioned.to_string(),
        conf_name_validate: true,
        value_type_strict: true,
        version_keep_limit: 5,
        ..Default::default()
    };

    let mut password = name("mysqld.admin_password", "STRING", "", "", "");
    password.flag_encrypt = true;
    let mut port = name("mysqld.port", "INT", "RANGE", "[1025,65535]", "3306");
    port.need_restart = true;
    let names = vec![
        port,
        name(
            "mysqld.character_set_server",
            "STRING",
            "ENUM",
            "utf8|utf8mb4|latin1",
            "utf8",
        ),
        name(
            "mysqld.innodb_buffer_pool_size",
            "STRING",
            "BYTES",
            "(0,2048m]",
            "128m",
        ),
        password,
    ];

    engine.files().add(def, names, OPERATOR).await.unwrap();
}

/// Unwrap the domain error carried by an engine failure
pub fn domain_err(err: anyhow::Error) -> DbConfigError {
    err.downcast::<DbConfigError>()
        .expect("engine error should carry a DbConfigError")
}
