//! Config item types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dbconfig_persistence::ConfigItemData;

use super::level::{ConfigNode, LevelInfo, LevelName};

/// Item operation requested by a caller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    /// Insert; fails when the name already exists at the level
    Add,
    /// Insert or update
    #[default]
    Update,
    Remove,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Add => "add",
            OpType::Update => "update",
            OpType::Remove => "remove",
        }
    }
}

/// One item of a save/upsert request, value in plaintext
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItemOp {
    pub conf_name: String,
    #[serde(default)]
    pub conf_value: String,
    #[serde(default)]
    pub flag_locked: bool,
    #[serde(default)]
    pub flag_disable: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub op_type: OpType,
}

impl ConfigItemOp {
    pub fn update(conf_name: &str, conf_value: &str) -> Self {
        Self {
            conf_name: conf_name.to_string(),
            conf_value: conf_value.to_string(),
            ..Default::default()
        }
    }

    pub fn locked(mut self) -> Self {
        self.flag_locked = true;
        self
    }

    pub fn with_op(mut self, op_type: OpType) -> Self {
        self.op_type = op_type;
        self
    }
}

/// Batch of item operations against one node
#[derive(Clone, Debug)]
pub struct ItemEdit {
    pub node: ConfigNode,
    pub info: LevelInfo,
    pub items: Vec<ConfigItemOp>,
    /// Skip the descendant conflict check
    pub confirm: bool,
    pub description: String,
}

impl ItemEdit {
    pub fn new(node: ConfigNode, items: Vec<ConfigItemOp>) -> Self {
        Self {
            node,
            info: LevelInfo::default(),
            items,
            confirm: false,
            description: String::new(),
        }
    }

    pub fn with_info(mut self, info: LevelInfo) -> Self {
        self.info = info;
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm = true;
        self
    }
}

/// Item after merging the ancestor chain
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedItem {
    pub conf_name: String,
    pub conf_value: String,
    /// Level the value came from
    pub level_name: Option<LevelName>,
    /// Value of the source node; also selects the decryption key
    pub level_value: String,
    #[serde(default)]
    pub flag_locked: bool,
    #[serde(default)]
    pub flag_encrypt: bool,
    #[serde(default)]
    pub need_restart: bool,
    #[serde(default)]
    pub value_type: String,
    #[serde(default)]
    pub description: String,
}

/// Difference of one conf_name between two item sets
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDiff {
    pub conf_name: String,
    pub op_type: String,
    pub value_before: String,
    pub value_after: String,
    pub need_restart: bool,
}

/// Compare two merged item sets by conf_name
pub fn diff_items(before: &[MergedItem], after: &[MergedItem]) -> Vec<ItemDiff> {
    let old: BTreeMap<&str, &MergedItem> =
        before.iter().map(|i| (i.conf_name.as_str(), i)).collect();
    let new: BTreeMap<&str, &MergedItem> =
        after.iter().map(|i| (i.conf_name.as_str(), i)).collect();

    let mut diffs = Vec::new();
    for (name, item) in &new {
        match old.get(name) {
            None => diffs.push(ItemDiff {
                conf_name: name.to_string(),
                op_type: OpType::Add.as_str().to_string(),
                value_before: String::new(),
                value_after: item.conf_value.clone(),
                need_restart: item.need_restart,
            }),
            Some(prev) if prev.conf_value != item.conf_value => diffs.push(ItemDiff {
                conf_name: name.to_string(),
                op_type: OpType::Update.as_str().to_string(),
                value_before: prev.conf_value.clone(),
                value_after: item.conf_value.clone(),
                need_restart: item.need_restart,
            }),
            Some(_) => {}
        }
    }
    for (name, item) in &old {
        if !new.contains_key(name) {
            diffs.push(ItemDiff {
                conf_name: name.to_string(),
                op_type: OpType::Remove.as_str().to_string(),
                value_before: item.conf_value.clone(),
                value_after: String::new(),
                need_restart: item.need_restart,
            });
        }
    }
    diffs.sort_by(|a, b| a.conf_name.cmp(&b.conf_name));
    diffs
}

pub(crate) fn op_to_item(op: &ConfigItemOp, conf_value: String, operator: &str) -> ConfigItemData {
    ConfigItemData {
        conf_name: op.conf_name.clone(),
        conf_value,
        flag_locked: op.flag_locked,
        flag_disable: op.flag_disable,
        description: op.description.clone(),
        updated_by: operator.to_string(),
    }
}
