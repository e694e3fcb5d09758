//! In-process persistence backend
//!
//! Keeps every table in memory behind one mutex. A write runs against a copy
//! of the tables and the copy replaces the live tables only when the whole
//! closure succeeds, which gives each call the same all-or-nothing behavior
//! as a database transaction. Used for standalone runs and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PersistenceError;
use crate::model::*;
use crate::traits::*;

#[derive(Clone, Default)]
struct Tables {
    file_defs: BTreeMap<FileKey, ConfigFileDefData>,
    name_defs: BTreeMap<(FileKey, String), ConfigNameDefData>,
    items: BTreeMap<NodeKey, BTreeMap<String, ConfigItemData>>,
    revisions: BTreeMap<NodeKey, Vec<RevisionData>>,
    applied: HashMap<NodeKey, AppliedData>,
    tasks: BTreeMap<NodeKey, Vec<NodeTaskData>>,
    level_nodes: Vec<LevelNodeData>,
}

impl Tables {
    fn unpublish_all(&mut self, node: &NodeKey) {
        if let Some(revs) = self.revisions.get_mut(node) {
            for rev in revs.iter_mut() {
                rev.is_published = false;
            }
        }
    }

    fn apply_item_changes(&mut self, node: &NodeKey, changes: &[ItemChange]) {
        let items = self.items.entry(node.clone()).or_default();
        for change in changes {
            match change {
                ItemChange::Upsert(item) => {
                    items.insert(item.conf_name.clone(), item.clone());
                }
                ItemChange::Remove(conf_name) => {
                    items.remove(conf_name);
                }
            }
        }
        if items.is_empty() {
            self.items.remove(node);
        }
    }

    fn register_level_node(&mut self, node: LevelNodeData) {
        if !self.level_nodes.contains(&node) {
            self.level_nodes.push(node);
        }
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Memory persistence service
#[derive(Default)]
pub struct MemoryConfigStore {
    tables: Mutex<Tables>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.tables.lock())
    }

    fn transaction<T>(&self, f: impl FnOnce(&mut Tables) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let mut guard = self.tables.lock();
        let mut working = guard.clone();
        let result = f(&mut working)?;
        *guard = working;
        Ok(result)
    }
}

// ============================================================================
// DefinitionPersistence implementation
// ============================================================================

#[async_trait]
impl DefinitionPersistence for MemoryConfigStore {
    async fn file_def_find(&self, file: &FileKey) -> anyhow::Result<Option<ConfigFileDefData>> {
        Ok(self.read(|t| t.file_defs.get(file).cloned()))
    }

    async fn file_def_list(
        &self,
        namespace: &str,
        conf_type: Option<&str>,
    ) -> anyhow::Result<Vec<ConfigFileDefData>> {
        Ok(self.read(|t| {
            t.file_defs
                .values()
                .filter(|d| namespace.is_empty() || d.namespace == namespace)
                .filter(|d| conf_type.is_none_or(|ct| d.conf_type == ct))
                .cloned()
                .collect()
        }))
    }

    async fn file_def_upsert(
        &self,
        def: &ConfigFileDefData,
        names: &[ConfigNameDefData],
    ) -> anyhow::Result<()> {
        self.transaction(|t| {
            let key = def.key();
            let ts = now();
            let mut row = def.clone();
            row.created_at = t
                .file_defs
                .get(&key)
                .and_then(|old| old.created_at)
                .or(Some(ts));
            row.updated_at = Some(ts);
            t.file_defs.insert(key.clone(), row);

            for name in names {
                t.name_defs
                    .insert((key.clone(), name.conf_name.clone()), name.clone());
            }
            Ok(())
        })
    }

    async fn name_def_list(
        &self,
        file: &FileKey,
        include_deleted: bool,
    ) -> anyhow::Result<Vec<ConfigNameDefData>> {
        Ok(self.read(|t| {
            t.name_defs
                .iter()
                .filter(|((key, _), _)| key == file)
                .map(|(_, def)| def)
                .filter(|def| include_deleted || def.flag_status != NAME_STATUS_DELETED)
                .cloned()
                .collect()
        }))
    }

    async fn name_def_upsert(&self, names: &[ConfigNameDefData]) -> anyhow::Result<()> {
        self.transaction(|t| {
            for name in names {
                let key = FileKey::new(&name.namespace, &name.conf_type, &name.conf_file);
                t.name_defs
                    .insert((key, name.conf_name.clone()), name.clone());
            }
            Ok(())
        })
    }
}

// ============================================================================
// ItemPersistence implementation
// ============================================================================

#[async_trait]
impl ItemPersistence for MemoryConfigStore {
    async fn item_list(&self, node: &NodeKey) -> anyhow::Result<Vec<ConfigItemData>> {
        Ok(self.read(|t| {
            t.items
                .get(node)
                .map(|items| items.values().cloned().collect())
                .unwrap_or_default()
        }))
    }

    async fn item_apply_changes(
        &self,
        node: &NodeKey,
        changes: &[ItemChange],
    ) -> anyhow::Result<()> {
        self.transaction(|t| {
            t.apply_item_changes(node, changes);
            Ok(())
        })
    }

    async fn item_nodes(
        &self,
        file: &FileKey,
        bk_biz_id: Option<&str>,
    ) -> anyhow::Result<Vec<NodeKey>> {
        Ok(self.read(|t| {
            t.items
                .keys()
                .filter(|node| node.file() == *file)
                .filter(|node| bk_biz_id.is_none_or(|biz| node.bk_biz_id == biz))
                .cloned()
                .collect()
        }))
    }

    async fn level_node_register(&self, node: &LevelNodeData) -> anyhow::Result<()> {
        self.transaction(|t| {
            t.register_level_node(node.clone());
            Ok(())
        })
    }

    async fn level_node_list(
        &self,
        bk_biz_id: &str,
        filter: &LevelNodeFilter,
    ) -> anyhow::Result<Vec<LevelNodeData>> {
        Ok(self.read(|t| {
            t.level_nodes
                .iter()
                .filter(|n| n.bk_biz_id == bk_biz_id)
                .filter(|n| filter.level_name.as_ref().is_none_or(|v| &n.level_name == v))
                .filter(|n| filter.module.as_ref().is_none_or(|v| &n.module == v))
                .filter(|n| filter.cluster.as_ref().is_none_or(|v| &n.cluster == v))
                .cloned()
                .collect()
        }))
    }

    async fn level_node_biz_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.read(|t| {
            t.level_nodes
                .iter()
                .map(|n| n.bk_biz_id.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }))
    }
}

// ============================================================================
// RevisionPersistence implementation
// ============================================================================

fn newest_first(revs: &mut [RevisionData]) {
    revs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.revision.cmp(&a.revision))
    });
}

#[async_trait]
impl RevisionPersistence for MemoryConfigStore {
    async fn revision_insert(
        &self,
        rev: &RevisionData,
        changes: &[ItemChange],
        tasks: &[NodeTaskData],
    ) -> anyhow::Result<()> {
        self.transaction(|t| {
            let exists = t
                .revisions
                .get(&rev.node)
                .is_some_and(|revs| revs.iter().any(|r| r.revision == rev.revision));
            if exists {
                return Err(PersistenceError::UniqueViolation(format!(
                    "{} {}",
                    rev.node, rev.revision
                ))
                .into());
            }

            t.apply_item_changes(&rev.node, changes);
            if rev.is_published {
                t.unpublish_all(&rev.node);
                t.tasks.insert(rev.node.clone(), tasks.to_vec());
            }
            t.revisions
                .entry(rev.node.clone())
                .or_default()
                .push(rev.clone());
            Ok(())
        })
    }

    async fn revision_find(
        &self,
        node: &NodeKey,
        revision: &str,
    ) -> anyhow::Result<Option<RevisionData>> {
        Ok(self.read(|t| {
            t.revisions
                .get(node)
                .and_then(|revs| revs.iter().find(|r| r.revision == revision).cloned())
        }))
    }

    async fn revision_latest(&self, node: &NodeKey) -> anyhow::Result<Option<RevisionData>> {
        Ok(self.revision_list(node, 1).await?.into_iter().next())
    }

    async fn revision_published(&self, node: &NodeKey) -> anyhow::Result<Option<RevisionData>> {
        Ok(self.read(|t| {
            t.revisions
                .get(node)
                .and_then(|revs| revs.iter().find(|r| r.is_published).cloned())
        }))
    }

    async fn revision_list(&self, node: &NodeKey, limit: u64) -> anyhow::Result<Vec<RevisionData>> {
        let mut revs = self.read(|t| t.revisions.get(node).cloned().unwrap_or_default());
        newest_first(&mut revs);
        if limit > 0 {
            revs.truncate(limit as usize);
        }
        Ok(revs)
    }

    async fn revision_publish(
        &self,
        node: &NodeKey,
        revision: &str,
        tasks: &[NodeTaskData],
    ) -> anyhow::Result<()> {
        self.transaction(|t| {
            t.unpublish_all(node);
            let target = t
                .revisions
                .get_mut(node)
                .and_then(|revs| revs.iter_mut().find(|r| r.revision == revision))
                .ok_or_else(|| anyhow::anyhow!("revision {} not found for {}", revision, node))?;
            target.is_published = true;
            t.tasks.insert(node.clone(), tasks.to_vec());
            Ok(())
        })
    }

    async fn revision_purge(&self, node: &NodeKey, keep: u64) -> anyhow::Result<u64> {
        self.transaction(|t| {
            let applied = t.applied.get(node).map(|a| a.revision.clone());
            let Some(revs) = t.revisions.get_mut(node) else {
                return Ok(0);
            };
            newest_first(revs);

            let before = revs.len();
            let mut index = 0_u64;
            revs.retain(|r| {
                index += 1;
                index <= keep || r.is_published || applied.as_deref() == Some(r.revision.as_str())
            });
            Ok((before - revs.len()) as u64)
        })
    }

    async fn applied_find(&self, node: &NodeKey) -> anyhow::Result<Option<AppliedData>> {
        Ok(self.read(|t| t.applied.get(node).cloned()))
    }

    async fn applied_set(
        &self,
        node: &NodeKey,
        revision: &str,
        operator: &str,
    ) -> anyhow::Result<()> {
        self.transaction(|t| {
            t.applied.insert(
                node.clone(),
                AppliedData {
                    node: node.clone(),
                    revision: revision.to_string(),
                    applied_by: operator.to_string(),
                    applied_at: now(),
                },
            );
            Ok(())
        })
    }

    async fn task_list(&self, node: &NodeKey) -> anyhow::Result<Vec<NodeTaskData>> {
        Ok(self.read(|t| t.tasks.get(node).cloned().unwrap_or_default()))
    }

    async fn task_mark_applied(
        &self,
        node: &NodeKey,
        revision: &str,
        conf_names: &[String],
        operator: &str,
    ) -> anyhow::Result<TaskApplyOutcome> {
        self.transaction(|t| {
            let mut outcome = TaskApplyOutcome::default();
            if let Some(tasks) = t.tasks.get_mut(node) {
                for task in tasks.iter_mut().filter(|task| task.revision == revision) {
                    let selected = conf_names.is_empty() || conf_names.contains(&task.conf_name);
                    if selected && task.stage == TASK_STAGE_PENDING {
                        task.stage = TASK_STAGE_APPLIED;
                        outcome.marked += 1;
                    }
                    if task.stage == TASK_STAGE_PENDING {
                        outcome.pending += 1;
                    }
                }
            }

            if outcome.pending == 0 {
                t.applied.insert(
                    node.clone(),
                    AppliedData {
                        node: node.clone(),
                        revision: revision.to_string(),
                        applied_by: operator.to_string(),
                        applied_at: now(),
                    },
                );
                outcome.applied = true;
            }
            Ok(outcome)
        })
    }
}

// ============================================================================
// ConfigStore implementation
// ============================================================================

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn rekey_file(
        &self,
        file: &FileKey,
        encrypted_names: &[String],
        rewrite_value: ValueRewriter<'_>,
        rewrite_content: ContentRewriter<'_>,
    ) -> anyhow::Result<RekeyCount> {
        self.transaction(|t| {
            let mut count = RekeyCount::default();
            let plat = NodeKey::plat(file);

            for ((key, name), def) in t.name_defs.iter_mut() {
                if key == file && encrypted_names.contains(name) && !def.value_default.is_empty() {
                    def.value_default = rewrite_value(&plat, &def.value_default)?;
                    count.name_defs += 1;
                }
            }

            for (node, items) in t.items.iter_mut().filter(|(node, _)| node.file() == *file) {
                for item in items.values_mut() {
                    if encrypted_names.contains(&item.conf_name) && !item.conf_value.is_empty() {
                        item.conf_value = rewrite_value(node, &item.conf_value)?;
                        count.items += 1;
                    }
                }
            }

            for (node, revs) in t
                .revisions
                .iter_mut()
                .filter(|(node, _)| node.file() == *file)
            {
                for rev in revs.iter_mut() {
                    let (content, md5) = rewrite_content(node, &rev.content)?;
                    rev.content = content;
                    rev.content_md5 = md5;
                    count.revisions += 1;
                }
            }
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> FileKey {
        FileKey::new("tendbha", "dbconf", "MySQL-5.7")
    }

    fn node(level_value: &str) -> NodeKey {
        NodeKey::new("3", &file(), "cluster", level_value)
    }

    fn item(name: &str, value: &str) -> ConfigItemData {
        ConfigItemData {
            conf_name: name.to_string(),
            conf_value: value.to_string(),
            ..Default::default()
        }
    }

    fn revision(node: &NodeKey, id: &str, published: bool) -> RevisionData {
        RevisionData {
            node: node.clone(),
            revision: id.to_string(),
            is_published: published,
            created_at: chrono::NaiveDateTime::parse_from_str(
                &id[2..],
                "%Y%m%d%H%M%S",
            )
            .unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_item_changes() {
        let store = MemoryConfigStore::new();
        let n = node("c1");
        store
            .item_apply_changes(
                &n,
                &[
                    ItemChange::Upsert(item("b", "2")),
                    ItemChange::Upsert(item("a", "1")),
                ],
            )
            .await
            .unwrap();

        let items = store.item_list(&n).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].conf_name, "a");

        store
            .item_apply_changes(
                &n,
                &[ItemChange::Remove("a".into()), ItemChange::Remove("b".into())],
            )
            .await
            .unwrap();
        assert!(store.item_list(&n).await.unwrap().is_empty());
        assert!(store.item_nodes(&file(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revision_unique_and_publish() {
        let store = MemoryConfigStore::new();
        let n = node("c1");
        store
            .revision_insert(&revision(&n, "v_20240101000000", true), &[], &[])
            .await
            .unwrap();

        let dup = store
            .revision_insert(&revision(&n, "v_20240101000000", false), &[], &[])
            .await
            .unwrap_err();
        assert!(crate::is_unique_violation(&dup));

        store
            .revision_insert(&revision(&n, "v_20240101000010", true), &[], &[])
            .await
            .unwrap();
        let published = store.revision_published(&n).await.unwrap().unwrap();
        assert_eq!(published.revision, "v_20240101000010");
        let list = store.revision_list(&n, 0).await.unwrap();
        assert_eq!(list.iter().filter(|r| r.is_published).count(), 1);
    }

    #[tokio::test]
    async fn test_revision_insert_writes_items_atomically() {
        let store = MemoryConfigStore::new();
        let n = node("c1");
        store
            .revision_insert(
                &revision(&n, "v_20240101000000", true),
                &[ItemChange::Upsert(item("port", "3307"))],
                &[],
            )
            .await
            .unwrap();
        assert_eq!(store.item_list(&n).await.unwrap()[0].conf_value, "3307");

        let dup = store
            .revision_insert(
                &revision(&n, "v_20240101000000", true),
                &[ItemChange::Upsert(item("port", "3308"))],
                &[],
            )
            .await
            .unwrap_err();
        assert!(crate::is_unique_violation(&dup));
        assert_eq!(store.item_list(&n).await.unwrap()[0].conf_value, "3307");
        assert_eq!(store.revision_list(&n, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_tables_untouched() {
        let store = MemoryConfigStore::new();
        let n = node("c1");
        store
            .item_apply_changes(&n, &[ItemChange::Upsert(item("secret", "**old"))])
            .await
            .unwrap();

        let fail: ValueRewriter<'_> = &|_, _| Err(anyhow::anyhow!("bad key"));
        let content: ContentRewriter<'_> = &|_, c| Ok((c.to_string(), String::new()));
        let result = store
            .rekey_file(&file(), &["secret".to_string()], fail, content)
            .await;
        assert!(result.is_err());
        assert_eq!(store.item_list(&n).await.unwrap()[0].conf_value, "**old");
    }

    #[tokio::test]
    async fn test_purge_keeps_published_and_applied() {
        let store = MemoryConfigStore::new();
        let n = node("c1");
        for (i, id) in [
            "v_20240101000001",
            "v_20240101000002",
            "v_20240101000003",
            "v_20240101000004",
        ]
        .iter()
        .enumerate()
        {
            store
                .revision_insert(&revision(&n, id, i == 0), &[], &[])
                .await
                .unwrap();
        }
        store.applied_set(&n, "v_20240101000002", "admin").await.unwrap();

        let purged = store.revision_purge(&n, 1).await.unwrap();
        assert_eq!(purged, 1);
        let left: Vec<_> = store
            .revision_list(&n, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.revision)
            .collect();
        assert_eq!(
            left,
            vec!["v_20240101000004", "v_20240101000002", "v_20240101000001"]
        );
    }

    #[tokio::test]
    async fn test_task_mark_applied_advances_applied() {
        let store = MemoryConfigStore::new();
        let n = node("c1");
        let task = |name: &str| NodeTaskData {
            node: n.clone(),
            revision: "v_20240101000001".into(),
            conf_name: name.into(),
            op_type: "update".into(),
            ..Default::default()
        };
        store
            .revision_insert(
                &revision(&n, "v_20240101000001", true),
                &[],
                &[task("a"), task("b")],
            )
            .await
            .unwrap();

        let outcome = store
            .task_mark_applied(&n, "v_20240101000001", &["a".into()], "admin")
            .await
            .unwrap();
        assert_eq!(outcome.marked, 1);
        assert_eq!(outcome.pending, 1);
        assert!(!outcome.applied);
        assert!(store.applied_find(&n).await.unwrap().is_none());

        let outcome = store
            .task_mark_applied(&n, "v_20240101000001", &[], "admin")
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(
            store.applied_find(&n).await.unwrap().unwrap().revision,
            "v_20240101000001"
        );
    }

    #[tokio::test]
    async fn test_level_registry() {
        let store = MemoryConfigStore::new();
        let row = LevelNodeData {
            bk_biz_id: "3".into(),
            level_name: "cluster".into(),
            level_value: "c1".into(),
            module: "m1".into(),
            cluster: "c1".into(),
        };
        store.level_node_register(&row).await.unwrap();
        store.level_node_register(&row).await.unwrap();

        let filter = LevelNodeFilter {
            module: Some("m1".into()),
            ..Default::default()
        };
        assert_eq!(store.level_node_list("3", &filter).await.unwrap().len(), 1);
        assert!(store.level_node_list("4", &filter).await.unwrap().is_empty());
        assert_eq!(store.level_node_biz_ids().await.unwrap(), vec!["3"]);
    }
}
