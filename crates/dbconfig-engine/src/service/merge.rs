//! Config merge engine
//!
//! Items are merged along the ancestor chain general to specific: the most
//! specific enabled value wins unless a more general level locks the name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use dbconfig_persistence::{
    ConfigItemData, ConfigNameDefData, ConfigStore, DefinitionPersistence, FileKey, ItemChange,
    ItemPersistence,
};
use dbconfig_persistence::model::NAME_STATUS_DELETED;

use crate::model::{ConfigNode, LevelInfo, LevelName, MergedItem};

use super::level::ancestor_chain;

/// Items stored at one node of a chain
#[derive(Clone, Debug)]
pub struct Layer {
    pub node: ConfigNode,
    pub items: Vec<ConfigItemData>,
}

impl Layer {
    /// Items of the layer once `changes` are written
    pub fn apply(&mut self, changes: &[ItemChange]) {
        for change in changes {
            match change {
                ItemChange::Upsert(item) => {
                    match self.items.iter_mut().find(|i| i.conf_name == item.conf_name) {
                        Some(existing) => *existing = item.clone(),
                        None => self.items.push(item.clone()),
                    }
                }
                ItemChange::Remove(conf_name) => self.items.retain(|i| &i.conf_name != conf_name),
            }
        }
    }
}

/// Plat-level items: name definitions that are active
pub fn plat_items(defs: &[ConfigNameDefData]) -> Vec<ConfigItemData> {
    defs.iter()
        .filter(|d| d.flag_status >= 1)
        .map(|d| ConfigItemData {
            conf_name: d.conf_name.clone(),
            conf_value: d.value_default.clone(),
            flag_locked: d.flag_locked,
            flag_disable: false,
            description: d.description.clone(),
            updated_by: d.updated_by.clone(),
        })
        .collect()
}

/// Merge layers ordered general to specific.
///
/// Names whose definition is deleted are dropped. Metadata (encryption,
/// restart, type) is taken from the name definition when one exists.
pub fn merge_layers(layers: &[Layer], defs: &[ConfigNameDefData]) -> Vec<MergedItem> {
    let defs: HashMap<&str, &ConfigNameDefData> =
        defs.iter().map(|d| (d.conf_name.as_str(), d)).collect();
    let mut merged: BTreeMap<String, MergedItem> = BTreeMap::new();

    for layer in layers {
        for item in layer.items.iter().filter(|i| !i.flag_disable) {
            let def = defs.get(item.conf_name.as_str());
            if def.is_some_and(|d| d.flag_status == NAME_STATUS_DELETED) {
                continue;
            }
            if merged.get(&item.conf_name).is_some_and(|m| m.flag_locked) {
                continue;
            }

            merged.insert(
                item.conf_name.clone(),
                MergedItem {
                    conf_name: item.conf_name.clone(),
                    conf_value: item.conf_value.clone(),
                    level_name: Some(layer.node.level_name),
                    level_value: layer.node.level_value.clone(),
                    flag_locked: item.flag_locked,
                    flag_encrypt: def.is_some_and(|d| d.flag_encrypt),
                    need_restart: def.is_some_and(|d| d.need_restart),
                    value_type: def.map(|d| d.value_type.clone()).unwrap_or_default(),
                    description: item.description.clone(),
                },
            );
        }
    }

    merged.into_values().collect()
}

/// Level of the first enabled lock on `conf_name` among `layers`
pub fn locked_by(layers: &[Layer], conf_name: &str) -> Option<LevelName> {
    layers.iter().find_map(|layer| {
        layer
            .items
            .iter()
            .any(|i| i.conf_name == conf_name && i.flag_locked && !i.flag_disable)
            .then_some(layer.node.level_name)
    })
}

// ============================================================================
// Conflict predicate
// ============================================================================

/// A value and its lock flag, plaintext
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueState<'a> {
    pub value: &'a str,
    pub locked: bool,
}

/// One name changing at a level
#[derive(Clone, Copy, Debug)]
pub struct PendingChange<'a> {
    pub conf_name: &'a str,
    /// Stored at the level before the change
    pub current: Option<ValueState<'a>>,
    /// Stored at the level after the change; `None` on removal
    pub desired: Option<ValueState<'a>>,
}

/// Decides whether a change alters what a descendant currently sees
pub trait ConflictPredicate: Send + Sync {
    fn conflicts(&self, change: &PendingChange<'_>, descendant_value: &str) -> bool;
}

/// A descendant override conflicts when the new value is locked and differs
/// from it, or when a lock is lifted while the descendant differs from the
/// previously locked value.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConflictPredicate;

impl ConflictPredicate for DefaultConflictPredicate {
    fn conflicts(&self, change: &PendingChange<'_>, descendant_value: &str) -> bool {
        if let Some(desired) = change.desired
            && desired.locked
            && desired.value != descendant_value
        {
            return true;
        }

        match change.current {
            Some(current) if current.locked => {
                let unlocks = change.desired.is_none_or(|d| !d.locked);
                unlocks && current.value != descendant_value
            }
            _ => false,
        }
    }
}

// ============================================================================
// Store-backed merge
// ============================================================================

#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<dyn ConfigStore>,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Items stored at exactly `node`; plat reads the name definitions
    pub async fn node_items(
        &self,
        node: &ConfigNode,
        defs: &[ConfigNameDefData],
    ) -> anyhow::Result<Vec<ConfigItemData>> {
        if node.level_name == LevelName::Plat {
            Ok(plat_items(defs))
        } else {
            self.store.item_list(&node.key()).await
        }
    }

    /// Every name definition of the file, deleted ones included
    pub async fn name_defs(&self, file: &FileKey) -> anyhow::Result<Vec<ConfigNameDefData>> {
        self.store.name_def_list(file, true).await
    }

    pub async fn layers(
        &self,
        chain: &[ConfigNode],
        defs: &[ConfigNameDefData],
    ) -> anyhow::Result<Vec<Layer>> {
        let mut layers = Vec::with_capacity(chain.len());
        for node in chain {
            layers.push(Layer {
                node: node.clone(),
                items: self.node_items(node, defs).await?,
            });
        }
        Ok(layers)
    }

    /// Merged items of `node` as stored; encrypted values stay encrypted
    pub async fn merged(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
    ) -> anyhow::Result<Vec<MergedItem>> {
        let chain = ancestor_chain(node, info)?;
        let defs = self.name_defs(&node.file).await?;
        let layers = self.layers(&chain, &defs).await?;
        let merged = merge_layers(&layers, &defs);
        debug!("Merged {} items for {} over {} levels", merged.len(), node, chain.len());
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbconfig_persistence::FileKey;

    fn file() -> FileKey {
        FileKey::new("tendbha", "dbconf", "MySQL-5.7")
    }

    fn layer(level: LevelName, value: &str, items: Vec<ConfigItemData>) -> Layer {
        let node = match level {
            LevelName::Plat => ConfigNode::plat(file()),
            _ => ConfigNode::new("3", file(), level, value).unwrap(),
        };
        Layer { node, items }
    }

    fn item(name: &str, value: &str, locked: bool) -> ConfigItemData {
        ConfigItemData {
            conf_name: name.to_string(),
            conf_value: value.to_string(),
            flag_locked: locked,
            ..Default::default()
        }
    }

    fn def(name: &str, default: &str, status: i32) -> ConfigNameDefData {
        ConfigNameDefData {
            conf_name: name.to_string(),
            value_default: default.to_string(),
            flag_status: status,
            value_type: "STRING".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_most_specific_wins() {
        let layers = vec![
            layer(LevelName::Plat, "0", vec![item("port", "3306", false)]),
            layer(LevelName::App, "3", vec![item("port", "3307", false)]),
            layer(LevelName::Module, "m1", vec![item("port", "3308", false)]),
        ];
        let merged = merge_layers(&layers, &[]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].conf_value, "3308");
        assert_eq!(merged[0].level_name, Some(LevelName::Module));
        assert_eq!(merged[0].level_value, "m1");
    }

    #[test]
    fn test_locked_ancestor_wins() {
        let layers = vec![
            layer(LevelName::Plat, "0", vec![]),
            layer(LevelName::App, "3", vec![item("charset", "utf8", true)]),
            layer(LevelName::Module, "m1", vec![item("charset", "latin1", false)]),
        ];
        let merged = merge_layers(&layers, &[]);
        assert_eq!(merged[0].conf_value, "utf8");
        assert_eq!(merged[0].level_name, Some(LevelName::App));
        assert_eq!(locked_by(&layers, "charset"), Some(LevelName::App));
        assert_eq!(locked_by(&layers, "port"), None);
    }

    #[test]
    fn test_disabled_items_skipped() {
        let mut disabled = item("port", "3307", false);
        disabled.flag_disable = true;
        let layers = vec![
            layer(LevelName::Plat, "0", vec![item("port", "3306", false)]),
            layer(LevelName::App, "3", vec![disabled]),
        ];
        assert_eq!(merge_layers(&layers, &[])[0].conf_value, "3306");
    }

    #[test]
    fn test_deleted_names_dropped_and_metadata_attached() {
        let mut secret = def("password", "", 1);
        secret.flag_encrypt = true;
        secret.need_restart = true;
        let defs = vec![def("port", "3306", 1), def("old", "x", -1), secret];

        let layers = vec![
            layer(LevelName::Plat, "0", plat_items(&defs)),
            layer(
                LevelName::App,
                "3",
                vec![item("old", "y", false), item("password", "**abc", false)],
            ),
        ];
        let merged = merge_layers(&layers, &defs);
        let names: Vec<_> = merged.iter().map(|m| m.conf_name.as_str()).collect();
        assert_eq!(names, vec!["password", "port"]);
        assert!(merged[0].flag_encrypt);
        assert!(merged[0].need_restart);
        assert_eq!(merged[1].value_type, "STRING");
    }

    #[test]
    fn test_pending_changes_overlay_own_layer() {
        let defs = vec![def("port", "3306", 1), def("charset", "utf8", 1)];
        let mut own = layer(
            LevelName::Cluster,
            "c1",
            vec![item("port", "3307", false), item("charset", "utf8mb4", false)],
        );
        own.apply(&[
            ItemChange::Upsert(item("port", "3308", false)),
            ItemChange::Remove("charset".to_string()),
            ItemChange::Upsert(item("sql_mode", "STRICT", false)),
        ]);

        let merged = merge_layers(&[layer(LevelName::Plat, "", plat_items(&defs)), own], &defs);
        let values: Vec<(&str, &str)> = merged
            .iter()
            .map(|m| (m.conf_name.as_str(), m.conf_value.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![("charset", "utf8"), ("port", "3308"), ("sql_mode", "STRICT")]
        );
    }

    #[test]
    fn test_default_predicate() {
        let p = DefaultConflictPredicate;
        let locked = |v| Some(ValueState { value: v, locked: true });
        let open = |v| Some(ValueState { value: v, locked: false });

        let lock_new = PendingChange { conf_name: "a", current: None, desired: locked("1") };
        assert!(p.conflicts(&lock_new, "2"));
        assert!(!p.conflicts(&lock_new, "1"));

        let plain = PendingChange { conf_name: "a", current: open("1"), desired: open("5") };
        assert!(!p.conflicts(&plain, "2"));

        let unlock = PendingChange { conf_name: "a", current: locked("1"), desired: open("1") };
        assert!(p.conflicts(&unlock, "2"));
        assert!(!p.conflicts(&unlock, "1"));

        let remove = PendingChange { conf_name: "a", current: locked("1"), desired: None };
        assert!(p.conflicts(&remove, "9"));
    }
}
