//! Level hierarchy resolution
//!
//! Ancestor chains are computed from the node identity plus `level_info`;
//! descendants and children come from stored items and the level registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use dbconfig_common::DbConfigError;
use dbconfig_persistence::{ConfigStore, ItemPersistence, LevelNodeData, LevelNodeFilter, NodeKey};

use crate::model::{ConfigNode, LevelInfo, LevelName};

/// Ordered ancestor chain of `node`, plat first and `node` itself last
pub fn ancestor_chain(
    node: &ConfigNode,
    info: &LevelInfo,
) -> Result<Vec<ConfigNode>, DbConfigError> {
    let plat = ConfigNode::plat(node.file.clone());
    if node.level_name == LevelName::Plat {
        return Ok(vec![plat]);
    }

    let app = ConfigNode::new(
        &node.bk_biz_id,
        node.file.clone(),
        LevelName::App,
        &node.bk_biz_id,
    )?;
    let mut chain = vec![plat, app];

    match node.level_name {
        LevelName::Plat | LevelName::App | LevelName::Module => {}
        LevelName::Cluster => {
            chain.push(parent_node(node, LevelName::Module, &info.module)?);
        }
        LevelName::Instance => {
            chain.push(parent_node(node, LevelName::Module, &info.module)?);
            chain.push(parent_node(node, LevelName::Cluster, &info.cluster)?);
        }
    }

    if node.level_name != LevelName::App {
        chain.push(node.clone());
    }
    Ok(chain)
}

fn parent_node(
    node: &ConfigNode,
    level: LevelName,
    value: &str,
) -> Result<ConfigNode, DbConfigError> {
    if value.trim().is_empty() {
        return Err(DbConfigError::InputValidation(format!(
            "level {} requires level_info.{}",
            node.level_name, level
        )));
    }
    ConfigNode::new(&node.bk_biz_id, node.file.clone(), level, value)
}

/// Child `level_info` for nodes one level below `node`
fn child_info(node: &ConfigNode, info: &LevelInfo) -> LevelInfo {
    match node.level_name {
        LevelName::Module => LevelInfo::module(node.level_value.clone()),
        LevelName::Cluster => LevelInfo::cluster(info.module.clone(), node.level_value.clone()),
        _ => LevelInfo::default(),
    }
}

/// Store-backed hierarchy lookups
#[derive(Clone)]
pub struct LevelResolver {
    store: Arc<dyn ConfigStore>,
}

impl LevelResolver {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Record `node` and its module/cluster parents in the level registry
    pub async fn register(&self, node: &ConfigNode, info: &LevelInfo) -> anyhow::Result<()> {
        let biz = node.bk_biz_id.as_str();
        let rows = match node.level_name {
            LevelName::Plat | LevelName::App => return Ok(()),
            LevelName::Module => {
                let module = node.level_value.as_str();
                vec![registry_row(biz, LevelName::Module, module, module, "")]
            }
            LevelName::Cluster => {
                let (module, cluster) = (info.module.as_str(), node.level_value.as_str());
                vec![
                    registry_row(biz, LevelName::Module, module, module, ""),
                    registry_row(biz, LevelName::Cluster, cluster, module, cluster),
                ]
            }
            LevelName::Instance => {
                let (module, cluster) = (info.module.as_str(), info.cluster.as_str());
                vec![
                    registry_row(biz, LevelName::Module, module, module, ""),
                    registry_row(biz, LevelName::Cluster, cluster, module, cluster),
                    registry_row(biz, LevelName::Instance, &node.level_value, module, cluster),
                ]
            }
        };

        for row in rows {
            self.store.level_node_register(&row).await?;
        }
        debug!("Registered level node {}", node);
        Ok(())
    }

    /// Nodes strictly below `node` that may hold overriding items
    pub async fn descendants(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
    ) -> anyhow::Result<Vec<ConfigNode>> {
        let keys: Vec<NodeKey> = match node.level_name {
            LevelName::Plat => self
                .store
                .item_nodes(&node.file, None)
                .await?
                .into_iter()
                .filter(|k| !k.is_plat())
                .collect(),
            LevelName::App => self
                .store
                .item_nodes(&node.file, Some(&node.bk_biz_id))
                .await?
                .into_iter()
                .filter(|k| k.level_name != LevelName::App.as_str())
                .collect(),
            LevelName::Module => {
                let filter = LevelNodeFilter {
                    module: Some(node.level_value.clone()),
                    ..Default::default()
                };
                self.registry_keys(node, &filter, LevelName::Module).await?
            }
            LevelName::Cluster => {
                let filter = LevelNodeFilter {
                    level_name: Some(LevelName::Instance.as_str().to_string()),
                    module: Some(info.module.clone()),
                    cluster: Some(node.level_value.clone()),
                };
                self.registry_keys(node, &filter, LevelName::Cluster).await?
            }
            LevelName::Instance => Vec::new(),
        };

        Ok(keys
            .iter()
            .filter_map(|key| match ConfigNode::from_key(key) {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("Skipping malformed node {}: {}", key, e);
                    None
                }
            })
            .collect())
    }

    async fn registry_keys(
        &self,
        node: &ConfigNode,
        filter: &LevelNodeFilter,
        exclude: LevelName,
    ) -> anyhow::Result<Vec<NodeKey>> {
        Ok(self
            .store
            .level_node_list(&node.bk_biz_id, filter)
            .await?
            .into_iter()
            .filter(|row| row.level_name != exclude.as_str())
            .map(|row| NodeKey::new(&node.bk_biz_id, &node.file, &row.level_name, &row.level_value))
            .collect())
    }

    /// Direct children of `node` with the `level_info` each child needs
    pub async fn children(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
    ) -> anyhow::Result<Vec<(ConfigNode, LevelInfo)>> {
        let child_level = node.level_name.child().ok_or_else(|| {
            DbConfigError::InputValidation("level instance has no children".to_string())
        })?;

        let values: BTreeSet<String> = match node.level_name {
            LevelName::Plat => {
                let mut biz_ids: BTreeSet<String> =
                    self.store.level_node_biz_ids().await?.into_iter().collect();
                biz_ids.extend(
                    self.store
                        .item_nodes(&node.file, None)
                        .await?
                        .into_iter()
                        .filter(|k| k.level_name == LevelName::App.as_str())
                        .map(|k| k.level_value),
                );
                biz_ids
            }
            _ => {
                let mut filter = LevelNodeFilter {
                    level_name: Some(child_level.as_str().to_string()),
                    ..Default::default()
                };
                match node.level_name {
                    LevelName::Module => filter.module = Some(node.level_value.clone()),
                    LevelName::Cluster => {
                        filter.module = Some(info.module.clone());
                        filter.cluster = Some(node.level_value.clone());
                    }
                    _ => {}
                }
                self.store
                    .level_node_list(&node.bk_biz_id, &filter)
                    .await?
                    .into_iter()
                    .map(|row| row.level_value)
                    .collect()
            }
        };

        let info = child_info(node, info);
        values
            .iter()
            .map(|v| Ok((node.child(v)?, info.clone())))
            .collect::<Result<Vec<_>, DbConfigError>>()
            .map_err(Into::into)
    }

    /// Build a child of `node` that was named explicitly by a caller
    pub fn child(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
        level_value: &str,
    ) -> Result<(ConfigNode, LevelInfo), DbConfigError> {
        Ok((node.child(level_value)?, child_info(node, info)))
    }
}

fn registry_row(
    bk_biz_id: &str,
    level: LevelName,
    level_value: &str,
    module: &str,
    cluster: &str,
) -> LevelNodeData {
    LevelNodeData {
        bk_biz_id: bk_biz_id.to_string(),
        level_name: level.as_str().to_string(),
        level_value: level_value.to_string(),
        module: module.to_string(),
        cluster: cluster.to_string(),
    }
}
