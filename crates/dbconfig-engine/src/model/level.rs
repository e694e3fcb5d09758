//! Level hierarchy types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use dbconfig_common::{DbConfigError, PLAT_BIZ_ID, PLAT_LEVEL_VALUE};
use dbconfig_persistence::{FileKey, NodeKey};

/// Level of a configuration node, ordered general to specific
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelName {
    Plat,
    App,
    Module,
    Cluster,
    Instance,
}

impl LevelName {
    pub const ALL: [LevelName; 5] = [
        LevelName::Plat,
        LevelName::App,
        LevelName::Module,
        LevelName::Cluster,
        LevelName::Instance,
    ];

    pub fn parse(s: &str) -> Result<Self, DbConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plat" => Ok(LevelName::Plat),
            "app" => Ok(LevelName::App),
            "module" => Ok(LevelName::Module),
            "cluster" => Ok(LevelName::Cluster),
            "instance" => Ok(LevelName::Instance),
            _ => Err(DbConfigError::InputValidation(format!(
                "illegal level_name {}",
                s
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LevelName::Plat => "plat",
            LevelName::App => "app",
            LevelName::Module => "module",
            LevelName::Cluster => "cluster",
            LevelName::Instance => "instance",
        }
    }

    /// Next more specific level
    pub fn child(&self) -> Option<LevelName> {
        match self {
            LevelName::Plat => Some(LevelName::App),
            LevelName::App => Some(LevelName::Module),
            LevelName::Module => Some(LevelName::Cluster),
            LevelName::Cluster => Some(LevelName::Instance),
            LevelName::Instance => None,
        }
    }

    /// Next more general level
    pub fn parent(&self) -> Option<LevelName> {
        match self {
            LevelName::Plat => None,
            LevelName::App => Some(LevelName::Plat),
            LevelName::Module => Some(LevelName::App),
            LevelName::Cluster => Some(LevelName::Module),
            LevelName::Instance => Some(LevelName::Cluster),
        }
    }
}

impl fmt::Display for LevelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LevelName {
    type Err = DbConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LevelName::parse(s)
    }
}

/// Parent disambiguation for cluster and instance nodes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub cluster: String,
}

impl LevelInfo {
    pub fn module(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            cluster: String::new(),
        }
    }

    pub fn cluster(module: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            cluster: cluster.into(),
        }
    }
}

/// A validated configuration node
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConfigNode {
    pub bk_biz_id: String,
    pub file: FileKey,
    pub level_name: LevelName,
    pub level_value: String,
}

impl ConfigNode {
    /// Build a node, enforcing the identity invariants:
    /// the platform business id iff level plat, and app value == business id.
    pub fn new(
        bk_biz_id: &str,
        file: FileKey,
        level_name: LevelName,
        level_value: &str,
    ) -> Result<Self, DbConfigError> {
        if bk_biz_id.trim().is_empty() {
            return Err(DbConfigError::InputValidation(
                "bk_biz_id is required".to_string(),
            ));
        }
        if file.namespace.is_empty() || file.conf_type.is_empty() || file.conf_file.is_empty() {
            return Err(DbConfigError::InputValidation(
                "namespace, conf_type and conf_file are required".to_string(),
            ));
        }

        let is_plat_biz = bk_biz_id == PLAT_BIZ_ID;
        match (level_name, is_plat_biz) {
            (LevelName::Plat, false) => {
                return Err(DbConfigError::InputValidation(format!(
                    "level plat requires bk_biz_id={}, got {}",
                    PLAT_BIZ_ID, bk_biz_id
                )));
            }
            (LevelName::Plat, true) => {
                return Ok(Self::plat(file));
            }
            (_, true) => {
                return Err(DbConfigError::InputValidation(format!(
                    "bk_biz_id={} is reserved for level plat, got level {}",
                    PLAT_BIZ_ID, level_name
                )));
            }
            _ => {}
        }

        if level_value.trim().is_empty() {
            return Err(DbConfigError::InputValidation(
                "level_value is required".to_string(),
            ));
        }
        if level_name == LevelName::App && level_value != bk_biz_id {
            return Err(DbConfigError::InputValidation(format!(
                "level app requires level_value equal to bk_biz_id {}, got {}",
                bk_biz_id, level_value
            )));
        }

        Ok(Self {
            bk_biz_id: bk_biz_id.to_string(),
            file,
            level_name,
            level_value: level_value.to_string(),
        })
    }

    pub fn plat(file: FileKey) -> Self {
        Self {
            bk_biz_id: PLAT_BIZ_ID.to_string(),
            file,
            level_name: LevelName::Plat,
            level_value: PLAT_LEVEL_VALUE.to_string(),
        }
    }

    /// Parse the string form used by request payloads
    pub fn parse(
        bk_biz_id: &str,
        file: FileKey,
        level_name: &str,
        level_value: &str,
    ) -> Result<Self, DbConfigError> {
        Self::new(bk_biz_id, file, LevelName::parse(level_name)?, level_value)
    }

    pub fn from_key(key: &NodeKey) -> Result<Self, DbConfigError> {
        Self::parse(&key.bk_biz_id, key.file(), &key.level_name, &key.level_value)
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(
            &self.bk_biz_id,
            &self.file,
            self.level_name.as_str(),
            &self.level_value,
        )
    }

    /// Node one level below with the given value
    pub fn child(&self, level_value: &str) -> Result<Self, DbConfigError> {
        let level = self.level_name.child().ok_or_else(|| {
            DbConfigError::InputValidation("level instance has no children".to_string())
        })?;
        let bk_biz_id = if self.level_name == LevelName::Plat {
            level_value
        } else {
            self.bk_biz_id.as_str()
        };
        Self::new(bk_biz_id, self.file.clone(), level, level_value)
    }
}

impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}={}",
            self.bk_biz_id, self.file, self.level_name, self.level_value
        )
    }
}
