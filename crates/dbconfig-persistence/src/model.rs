//! Domain model types for the persistence abstraction layer
//!
//! These types are used as arguments and return values of the persistence
//! traits, decoupled from specific storage backends. Level names travel as
//! plain strings here; the engine owns the typed hierarchy.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use dbconfig_common::{PLAT_BIZ_ID, PLAT_LEVEL_VALUE};

/// Level name of the platform node
pub const LEVEL_PLAT: &str = "plat";

/// NodeTask stage values
pub const TASK_STAGE_PENDING: i32 = 0;
pub const TASK_STAGE_APPLIED: i32 = 1;

/// Name definition status marking a deleted/hidden name
pub const NAME_STATUS_DELETED: i32 = -1;

/// Address of a conf file shared by every node
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    pub namespace: String,
    pub conf_type: String,
    pub conf_file: String,
}

impl FileKey {
    pub fn new(
        namespace: impl Into<String>,
        conf_type: impl Into<String>,
        conf_file: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            conf_type: conf_type.into(),
            conf_file: conf_file.into(),
        }
    }
}

impl std::fmt::Display for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.conf_type, self.conf_file)
    }
}

/// Full address of a configuration node
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub bk_biz_id: String,
    pub namespace: String,
    pub conf_type: String,
    pub conf_file: String,
    pub level_name: String,
    pub level_value: String,
}

impl NodeKey {
    pub fn new(
        bk_biz_id: impl Into<String>,
        file: &FileKey,
        level_name: impl Into<String>,
        level_value: impl Into<String>,
    ) -> Self {
        Self {
            bk_biz_id: bk_biz_id.into(),
            namespace: file.namespace.clone(),
            conf_type: file.conf_type.clone(),
            conf_file: file.conf_file.clone(),
            level_name: level_name.into(),
            level_value: level_value.into(),
        }
    }

    /// The platform node of a conf file
    pub fn plat(file: &FileKey) -> Self {
        Self::new(PLAT_BIZ_ID, file, LEVEL_PLAT, PLAT_LEVEL_VALUE)
    }

    pub fn file(&self) -> FileKey {
        FileKey {
            namespace: self.namespace.clone(),
            conf_type: self.conf_type.clone(),
            conf_file: self.conf_file.clone(),
        }
    }

    pub fn is_plat(&self) -> bool {
        self.level_name == LEVEL_PLAT
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}:{}={}",
            self.bk_biz_id,
            self.namespace,
            self.conf_type,
            self.conf_file,
            self.level_name,
            self.level_value
        )
    }
}

/// Platform definition of a conf file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFileDefData {
    pub namespace: String,
    pub conf_type: String,
    pub conf_file: String,
    pub conf_type_lc: String,
    pub conf_file_lc: String,
    /// Comma separated level names allowed to hold items
    pub level_names: String,
    /// Level at which revisions are consumed; empty when unversioned
    pub level_versioned: String,
    pub conf_name_validate: bool,
    pub value_type_strict: bool,
    pub version_keep_limit: i32,
    pub description: String,
    pub updated_by: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl ConfigFileDefData {
    pub fn key(&self) -> FileKey {
        FileKey::new(&self.namespace, &self.conf_type, &self.conf_file)
    }
}

/// Platform schema entry for one conf_name
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigNameDefData {
    pub namespace: String,
    pub conf_type: String,
    pub conf_file: String,
    pub conf_name: String,
    pub value_type: String,
    pub value_type_sub: String,
    pub value_allowed: String,
    pub value_default: String,
    pub need_restart: bool,
    pub flag_locked: bool,
    pub flag_status: i32,
    pub flag_encrypt: bool,
    pub description: String,
    pub updated_by: String,
}

/// Item stored at a single node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItemData {
    pub conf_name: String,
    pub conf_value: String,
    pub flag_locked: bool,
    pub flag_disable: bool,
    pub description: String,
    pub updated_by: String,
}

/// One mutation of a node's item set
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemChange {
    Upsert(ConfigItemData),
    Remove(String),
}

/// Registry row linking module/cluster/instance nodes to their parents
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelNodeData {
    pub bk_biz_id: String,
    pub level_name: String,
    pub level_value: String,
    pub module: String,
    pub cluster: String,
}

/// Filter for level registry lookups; `None` matches anything
#[derive(Clone, Debug, Default)]
pub struct LevelNodeFilter {
    pub level_name: Option<String>,
    pub module: Option<String>,
    pub cluster: Option<String>,
}

/// Immutable revision snapshot of a node
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionData {
    pub node: NodeKey,
    pub revision: String,
    pub content: String,
    pub content_md5: String,
    pub is_published: bool,
    pub pre_revision: String,
    pub rows_affected: i32,
    pub description: String,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

/// Consumer-confirmed revision of a node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedData {
    pub node: NodeKey,
    pub revision: String,
    pub applied_by: String,
    pub applied_at: NaiveDateTime,
}

/// Per-item apply tracking row of a published revision
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTaskData {
    pub node: NodeKey,
    pub revision: String,
    pub conf_name: String,
    pub value_before: String,
    pub value_after: String,
    pub op_type: String,
    pub need_restart: bool,
    pub stage: i32,
}

/// Result of marking tasks applied
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskApplyOutcome {
    pub marked: u64,
    pub pending: u64,
    /// Whether the node's applied revision was advanced
    pub applied: bool,
}

/// Rows rewritten by a re-key batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyCount {
    pub name_defs: u64,
    pub items: u64,
    pub revisions: u64,
}

impl RekeyCount {
    pub fn total(&self) -> u64 {
        self.name_defs + self.items + self.revisions
    }
}

/// Storage mode for the persistence layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    /// External database (MySQL/PostgreSQL via SeaORM)
    ExternalDb,
    /// In-process tables, lost on restart
    Memory,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::ExternalDb => write!(f, "external_db"),
            StorageMode::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "external_db" => Ok(StorageMode::ExternalDb),
            "memory" => Ok(StorageMode::Memory),
            _ => Err(format!("Invalid storage mode: {}", s)),
        }
    }
}
