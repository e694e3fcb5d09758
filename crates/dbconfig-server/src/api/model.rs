//! Request and response models of the HTTP API

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use validator::{Validate, ValidationError};

use dbconfig_common::DbConfigError;
use dbconfig_engine::{
    ConfigItemOp, ConfigNode, GenerateMethod, LevelInfo, LevelName, OutputFormat, ReqType,
};
use dbconfig_persistence::{ConfigFileDefData, ConfigNameDefData, FileKey};

pub const MAX_NAME_LENGTH: u64 = 128;
pub const MAX_CONF_VALUE_LENGTH: u64 = 60000;

fn validate_level_name(level_name: &str) -> Result<(), ValidationError> {
    LevelName::parse(level_name)
        .map(|_| ())
        .map_err(|_| ValidationError::new("level_name_invalid"))
}

fn validate_level_names(level_names: &str) -> Result<(), ValidationError> {
    level_names
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .try_for_each(validate_level_name)
}

// =============================================================================
// Node addressing
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FileParam {
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub namespace: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_type: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_file: String,
}

impl FileParam {
    pub fn key(&self) -> FileKey {
        FileKey::new(&self.namespace, &self.conf_type, &self.conf_file)
    }
}

/// One node of a conf file
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NodeParam {
    #[validate(length(min = 1, max = 32))]
    pub bk_biz_id: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub namespace: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_type: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_file: String,
    #[validate(custom(function = "validate_level_name"))]
    pub level_name: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub level_value: String,
    #[serde(default)]
    pub level_info: LevelInfo,
}

impl NodeParam {
    pub fn file(&self) -> FileKey {
        FileKey::new(&self.namespace, &self.conf_type, &self.conf_file)
    }

    pub fn node(&self) -> Result<ConfigNode, DbConfigError> {
        ConfigNode::parse(
            &self.bk_biz_id,
            self.file(),
            &self.level_name,
            &self.level_value,
        )
    }
}

// =============================================================================
// Config items
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QueryParam {
    #[serde(flatten)]
    #[validate(nested)]
    pub node: NodeParam,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub decrypt: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub bk_biz_id: String,
    pub conf_file: String,
    pub level_name: String,
    pub level_value: String,
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BatchGetParam {
    #[validate(length(min = 1, max = 32))]
    pub bk_biz_id: String,
    #[serde(flatten)]
    #[validate(nested)]
    pub file: FileParam,
    #[validate(custom(function = "validate_level_name"))]
    pub level_name: String,
    #[validate(length(min = 1))]
    pub level_values: Vec<String>,
    #[serde(default)]
    pub level_info: LevelInfo,
    #[serde(default)]
    pub conf_names: Vec<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveParam {
    #[serde(flatten)]
    #[validate(nested)]
    pub node: NodeParam,
    #[validate(length(min = 1))]
    pub conf_items: Vec<ConfigItemOp>,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub description: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertParam {
    #[serde(flatten)]
    #[validate(nested)]
    pub save: SaveParam,
    #[serde_as(as = "DisplayFromStr")]
    pub req_type: ReqType,
}

// =============================================================================
// Versions
// =============================================================================

#[serde_as]
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateParam {
    #[serde(flatten)]
    #[validate(nested)]
    pub node: NodeParam,
    #[serde_as(as = "DisplayFromStr")]
    pub method: GenerateMethod,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RevisionParam {
    #[serde(flatten)]
    #[validate(nested)]
    pub node: NodeParam,
    #[validate(length(min = 1, max = 64))]
    pub revision: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApplyItemParam {
    #[serde(flatten)]
    #[validate(nested)]
    pub node: NodeParam,
    #[validate(length(min = 1, max = 64))]
    pub revision: String,
    #[validate(length(min = 1))]
    pub conf_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyItemResponse {
    pub marked: u64,
    pub pending: u64,
    pub is_applied: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApplyLevelParam {
    #[serde(flatten)]
    #[validate(nested)]
    pub node: NodeParam,
    /// Child level values that get a published revision
    #[serde(default)]
    pub publish_values: Vec<String>,
}

/// Query string of the read-only version endpoints
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VersionQueryParam {
    #[validate(length(min = 1, max = 32))]
    pub bk_biz_id: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub namespace: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_type: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_file: String,
    #[validate(custom(function = "validate_level_name"))]
    pub level_name: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub level_value: String,
    #[serde(default)]
    pub revision: String,
    /// 0 lists every revision
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub decrypt: bool,
}

impl VersionQueryParam {
    pub fn node(&self) -> Result<ConfigNode, DbConfigError> {
        ConfigNode::parse(
            &self.bk_biz_id,
            FileKey::new(&self.namespace, &self.conf_type, &self.conf_file),
            &self.level_name,
            &self.level_value,
        )
    }
}

// =============================================================================
// Conf file definitions
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfFileInfo {
    #[serde(flatten)]
    #[validate(nested)]
    pub file: FileParam,
    #[serde(default)]
    pub conf_type_lc: String,
    #[serde(default)]
    pub conf_file_lc: String,
    #[validate(custom(function = "validate_level_names"))]
    pub level_names: String,
    #[serde(default)]
    pub level_versioned: String,
    #[serde(default)]
    pub conf_name_validate: bool,
    #[serde(default)]
    pub value_type_strict: bool,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub version_keep_limit: i32,
    #[serde(default)]
    pub description: String,
}

impl From<ConfFileInfo> for ConfigFileDefData {
    fn from(info: ConfFileInfo) -> Self {
        ConfigFileDefData {
            namespace: info.file.namespace,
            conf_type: info.file.conf_type,
            conf_file: info.file.conf_file,
            conf_type_lc: info.conf_type_lc,
            conf_file_lc: info.conf_file_lc,
            level_names: info.level_names,
            level_versioned: info.level_versioned,
            conf_name_validate: info.conf_name_validate,
            value_type_strict: info.value_type_strict,
            version_keep_limit: info.version_keep_limit,
            description: info.description,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfNameDef {
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_name: String,
    #[serde(default)]
    pub value_type: String,
    #[serde(default)]
    pub value_type_sub: String,
    #[serde(default)]
    pub value_allowed: String,
    #[serde(default)]
    #[validate(length(max = MAX_CONF_VALUE_LENGTH))]
    pub value_default: String,
    #[serde(default)]
    pub need_restart: bool,
    #[serde(default)]
    pub flag_locked: bool,
    #[serde(default = "default_flag_status")]
    pub flag_status: i32,
    #[serde(default)]
    pub flag_encrypt: bool,
    #[serde(default)]
    pub description: String,
}

fn default_flag_status() -> i32 {
    1
}

impl From<ConfNameDef> for ConfigNameDefData {
    fn from(def: ConfNameDef) -> Self {
        ConfigNameDefData {
            conf_name: def.conf_name,
            value_type: def.value_type,
            value_type_sub: def.value_type_sub,
            value_allowed: def.value_allowed,
            value_default: def.value_default,
            need_restart: def.need_restart,
            flag_locked: def.flag_locked,
            flag_status: def.flag_status,
            flag_encrypt: def.flag_encrypt,
            description: def.description,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfFileParam {
    #[validate(nested)]
    pub conf_file_info: ConfFileInfo,
    #[serde(default)]
    #[validate(nested)]
    pub conf_names: Vec<ConfNameDef>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfFileListParam {
    #[serde(default)]
    #[validate(length(max = MAX_NAME_LENGTH))]
    pub namespace: String,
    pub conf_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfNameListParam {
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub namespace: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_type: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub conf_file: String,
    /// Substring filter on conf_name
    pub conf_name: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl ConfNameListParam {
    pub fn file(&self) -> FileKey {
        FileKey::new(&self.namespace, &self.conf_type, &self.conf_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_json() -> serde_json::Value {
        json!({
            "bk_biz_id": "3",
            "namespace": "tendbha",
            "conf_type": "dbconf",
            "conf_file": "MySQL-5.7",
            "level_name": "cluster",
            "level_value": "c1",
            "level_info": {"module": "m1"}
        })
    }

    #[test]
    fn test_node_param_builds_node() {
        let param: NodeParam = serde_json::from_value(node_json()).unwrap();
        assert!(param.validate().is_ok());
        let node = param.node().unwrap();
        assert_eq!(node.level_name, LevelName::Cluster);
        assert_eq!(param.level_info.module, "m1");
    }

    #[test]
    fn test_invalid_level_name_rejected() {
        let mut value = node_json();
        value["level_name"] = json!("region");
        let param: NodeParam = serde_json::from_value(value).unwrap();
        assert!(param.validate().is_err());
    }

    #[test]
    fn test_generate_param_method() {
        let mut value = node_json();
        value["method"] = json!("GenerateAndPublish");
        let param: GenerateParam = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(param.method, GenerateMethod::GenerateAndPublish);

        value["method"] = json!("Publish");
        assert!(serde_json::from_value::<GenerateParam>(value).is_err());
    }

    #[test]
    fn test_upsert_param_nested_validation() {
        let mut value = node_json();
        value["req_type"] = json!("SaveAndPublish");
        value["conf_items"] = json!([]);
        let param: UpsertParam = serde_json::from_value(value).unwrap();
        assert_eq!(param.req_type, ReqType::SaveAndPublish);
        assert!(param.validate().is_err());
    }

    #[test]
    fn test_conf_file_param_conversion() {
        let param: ConfFileParam = serde_json::from_value(json!({
            "conf_file_info": {
                "namespace": "tendbha",
                "conf_type": "dbconf",
                "conf_file": "MySQL-8.0",
                "level_names": "plat,app,module,cluster",
                "level_versioned": "cluster",
                "version_keep_limit": 5
            },
            "conf_names": [{"conf_name": "mysqld.port", "value_type": "INT"}]
        }))
        .unwrap();
        assert!(param.validate().is_ok());

        let def = ConfigFileDefData::from(param.conf_file_info);
        assert_eq!(def.key(), FileKey::new("tendbha", "dbconf", "MySQL-8.0"));
        assert_eq!(def.version_keep_limit, 5);

        let name = ConfigNameDefData::from(param.conf_names[0].clone());
        assert_eq!(name.flag_status, 1);
    }
}
