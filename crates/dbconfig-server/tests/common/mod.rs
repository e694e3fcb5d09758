//! Shared fixtures for HTTP API tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use dbconfig_common::ValueCodec;
use dbconfig_engine::{ConfigEngine, VersionPolicy};
use dbconfig_persistence::MemoryConfigStore;
use dbconfig_server::model::{AppState, Configuration};

pub const API: &str = "/bkconfig/v1";
pub const AUTH: &str = r#"{"bk_app_code":"dbm","bk_username":"tester"}"#;
pub const BIZ: &str = "3";

/// Conf file edited with `save`
pub const PLAIN_FILE: &str = "MySQL-5.7";
/// Conf file versioned at the cluster level
pub const VERSIONED_FILE: &str = "MySQL-8.0";

/// Server state over an in-memory store without generate jitter
pub fn state() -> Arc<AppState> {
    let engine = ConfigEngine::builder(Arc::new(MemoryConfigStore::new()))
        .codec(ValueCodec::new("test-prefix", false))
        .policy(VersionPolicy::new(Duration::ZERO, Duration::from_secs(10)))
        .build();
    Arc::new(AppState::new(Configuration::default(), engine))
}

pub fn url(path: &str) -> String {
    format!("{}{}", API, path)
}

pub fn conf_file_body(conf_file: &str, level_versioned: &str) -> Value {
    json!({
        "conf_file_info": {
            "namespace": "tendbha",
            "conf_type": "dbconf",
            "conf_file": conf_file,
            "level_names": "plat,app,module,cluster",
            "level_versioned": level_versioned,
            "version_keep_limit": 5
        },
        "conf_names": [
            {
                "conf_name": "mysqld.port",
                "value_type": "INT",
                "value_type_sub": "RANGE",
                "value_allowed": "[1025,65535]",
                "value_default": "3306",
                "need_restart": true
            },
            {
                "conf_name": "mysqld.character_set_server",
                "value_type": "STRING",
                "value_type_sub": "ENUM",
                "value_allowed": "utf8|utf8mb4|latin1",
                "value_default": "utf8"
            }
        ]
    })
}

pub fn node_body(conf_file: &str, level_name: &str, level_value: &str) -> Value {
    json!({
        "bk_biz_id": BIZ,
        "namespace": "tendbha",
        "conf_type": "dbconf",
        "conf_file": conf_file,
        "level_name": level_name,
        "level_value": level_value,
        "level_info": {"module": "m1"}
    })
}

/// Query string addressing one node
pub fn node_query(conf_file: &str, level_name: &str, level_value: &str) -> String {
    format!(
        "bk_biz_id={}&namespace=tendbha&conf_type=dbconf&conf_file={}&level_name={}&level_value={}",
        BIZ, conf_file, level_name, level_value
    )
}

/// Merge `extra` into a JSON object body
pub fn with(mut body: Value, extra: Value) -> Value {
    if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), extra) {
        target.extend(extra);
    }
    body
}
