//! Node item and level registry persistence

use async_trait::async_trait;

use crate::model::{
    ConfigItemData, FileKey, ItemChange, LevelNodeData, LevelNodeFilter, NodeKey,
};

#[async_trait]
pub trait ItemPersistence: Send + Sync {
    /// Items stored at exactly this node, ordered by conf_name
    async fn item_list(&self, node: &NodeKey) -> anyhow::Result<Vec<ConfigItemData>>;

    /// Apply upserts and removals to a node in one transaction
    async fn item_apply_changes(
        &self,
        node: &NodeKey,
        changes: &[ItemChange],
    ) -> anyhow::Result<()>;

    /// Distinct nodes of a file holding at least one item, optionally for one business
    async fn item_nodes(
        &self,
        file: &FileKey,
        bk_biz_id: Option<&str>,
    ) -> anyhow::Result<Vec<NodeKey>>;

    /// Record one module/cluster/instance registry row; idempotent
    async fn level_node_register(&self, node: &LevelNodeData) -> anyhow::Result<()>;

    /// Registered nodes of a business matching the filter
    async fn level_node_list(
        &self,
        bk_biz_id: &str,
        filter: &LevelNodeFilter,
    ) -> anyhow::Result<Vec<LevelNodeData>>;

    /// Every business id present in the registry
    async fn level_node_biz_ids(&self) -> anyhow::Result<Vec<String>>;
}
