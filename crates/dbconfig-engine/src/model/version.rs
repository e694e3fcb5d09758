//! Revision and publish/apply types

use chrono::NaiveDateTime;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use dbconfig_common::DbConfigError;
use dbconfig_persistence::{NodeTaskData, RevisionData};

use super::item::MergedItem;

/// Virtual alias for the published revision; never stored
pub const REVISION_LATEST: &str = "v_latest";

const REVISION_PREFIX: &str = "v_";
const REVISION_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Revision id for a snapshot created at `created_at`
pub fn revision_id(created_at: &NaiveDateTime) -> String {
    format!(
        "{}{}",
        REVISION_PREFIX,
        created_at.format(REVISION_TIME_FORMAT)
    )
}

pub fn content_md5(content: &str) -> String {
    const_hex::encode(Md5::digest(content.as_bytes()))
}

pub fn encode_content(items: &[MergedItem]) -> anyhow::Result<String> {
    Ok(serde_json::to_string(items)?)
}

pub fn decode_content(content: &str) -> anyhow::Result<Vec<MergedItem>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(content)?)
}

/// How a generate call stores the snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerateMethod {
    GenerateAndSave,
    GenerateAndPublish,
}

impl GenerateMethod {
    pub fn publishes(&self) -> bool {
        matches!(self, GenerateMethod::GenerateAndPublish)
    }
}

impl std::str::FromStr for GenerateMethod {
    type Err = DbConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GenerateAndSave" => Ok(GenerateMethod::GenerateAndSave),
            "GenerateAndPublish" => Ok(GenerateMethod::GenerateAndPublish),
            _ => Err(DbConfigError::InputValidation(format!(
                "illegal method {}, expect GenerateAndSave or GenerateAndPublish",
                s
            ))),
        }
    }
}

/// Request type of an upsert call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReqType {
    /// Deprecated: save items and generate an unpublished revision
    SaveOnly,
    SaveAndPublish,
}

impl std::str::FromStr for ReqType {
    type Err = DbConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SaveOnly" => Ok(ReqType::SaveOnly),
            "SaveAndPublish" => Ok(ReqType::SaveAndPublish),
            _ => Err(DbConfigError::InputValidation(format!(
                "illegal req_type {}, expect SaveOnly or SaveAndPublish",
                s
            ))),
        }
    }
}

/// Revision as returned to callers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub bk_biz_id: String,
    pub conf_file: String,
    pub level_name: String,
    pub level_value: String,
    pub revision: String,
    pub pre_revision: String,
    pub rows_affected: i32,
    pub is_published: bool,
    pub is_applied: bool,
    pub content_md5: String,
    pub description: String,
    pub created_by: String,
    pub created_at: String,
}

impl RevisionInfo {
    pub fn from_data(rev: &RevisionData, applied: Option<&str>) -> Self {
        Self {
            bk_biz_id: rev.node.bk_biz_id.clone(),
            conf_file: rev.node.conf_file.clone(),
            level_name: rev.node.level_name.clone(),
            level_value: rev.node.level_value.clone(),
            revision: rev.revision.clone(),
            pre_revision: rev.pre_revision.clone(),
            rows_affected: rev.rows_affected,
            is_published: rev.is_published,
            is_applied: applied == Some(rev.revision.as_str()),
            content_md5: rev.content_md5.clone(),
            description: rev.description.clone(),
            created_by: rev.created_by.clone(),
            created_at: rev.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Snapshot produced by a generate call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRevision {
    pub revision: String,
    pub is_published: bool,
    /// Whether this call created the snapshot rather than reusing one
    pub created: bool,
    pub content: serde_json::Value,
    #[serde(skip)]
    pub items: Vec<MergedItem>,
}

/// Published vs applied state of a node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub revision_published: String,
    pub revision_applied: String,
    pub is_applied: bool,
}

/// Published vs applied revision with the per-item changes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyInfo {
    pub revision_published: String,
    pub revision_applied: String,
    pub need_restart: bool,
    pub items: Vec<ApplyItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyItem {
    pub conf_name: String,
    pub op_type: String,
    pub value_before: String,
    pub value_after: String,
    pub need_restart: bool,
    pub applied: bool,
}

impl From<NodeTaskData> for ApplyItem {
    fn from(task: NodeTaskData) -> Self {
        Self {
            conf_name: task.conf_name,
            op_type: task.op_type,
            value_before: task.value_before,
            value_after: task.value_after,
            need_restart: task.need_restart,
            applied: task.stage == dbconfig_persistence::model::TASK_STAGE_APPLIED,
        }
    }
}

/// Outcome of a level-wide apply for one child
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildApply {
    pub level_name: String,
    pub level_value: String,
    pub revision: String,
    pub is_published: bool,
}
