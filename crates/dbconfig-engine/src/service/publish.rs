//! Publish/apply orchestration
//!
//! A revision moves saved -> published -> applied. Publishing unpublishes
//! the previous revision and replaces the node's apply tasks in the same
//! store transaction; the applied revision only moves on confirmation.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use dbconfig_common::DbConfigError;
use dbconfig_persistence::{
    ConfigStore, DefinitionPersistence, RevisionData, RevisionPersistence, TaskApplyOutcome,
};

use crate::model::version::decode_content;
use crate::model::{
    ApplyInfo, ApplyItem, ChildApply, ConfigNode, GenerateMethod, LevelInfo, LevelName,
    NodeStatus, diff_items,
};

use super::level::LevelResolver;
use super::version::{VersionManager, build_tasks, decode_revision};

#[derive(Clone)]
pub struct PublishService {
    store: Arc<dyn ConfigStore>,
    versions: VersionManager,
    resolver: LevelResolver,
}

impl PublishService {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        versions: VersionManager,
        resolver: LevelResolver,
    ) -> Self {
        Self {
            store,
            versions,
            resolver,
        }
    }

    /// Publish an existing saved revision
    pub async fn publish(
        &self,
        node: &ConfigNode,
        revision: &str,
        operator: &str,
    ) -> anyhow::Result<()> {
        let key = node.key();
        let rev = self.versions.resolve(node, revision).await?;
        let published = self.store.revision_published(&key).await?;

        let live = rev.is_published
            || published
                .as_ref()
                .is_some_and(|p| p.content_md5 == rev.content_md5);
        if live {
            return Err(DbConfigError::DomainConflict(format!(
                "revision is applied already: {} of {}",
                rev.revision, node
            ))
            .into());
        }

        let tasks = build_tasks(
            &key,
            &rev.revision,
            diff_items(
                &decode_revision(published.as_ref())?,
                &decode_content(&rev.content)?,
            ),
        );
        self.store
            .revision_publish(&key, &rev.revision, &tasks)
            .await?;
        info!(
            "Published revision {} of {} by {} ({} tasks)",
            rev.revision,
            node,
            operator,
            tasks.len()
        );
        Ok(())
    }

    async fn published_revision(
        &self,
        node: &ConfigNode,
        revision: &str,
    ) -> anyhow::Result<RevisionData> {
        let rev = self.versions.resolve(node, revision).await?;
        if !rev.is_published {
            return Err(DbConfigError::DomainConflict(format!(
                "revision {} of {} is not published",
                rev.revision, node
            ))
            .into());
        }
        Ok(rev)
    }

    /// Confirm a published revision as applied by the consumer
    pub async fn applied(
        &self,
        node: &ConfigNode,
        revision: &str,
        operator: &str,
    ) -> anyhow::Result<()> {
        let rev = self.published_revision(node, revision).await?;
        let key = node.key();
        let outcome = self
            .store
            .task_mark_applied(&key, &rev.revision, &[], operator)
            .await?;
        if !outcome.applied {
            self.store.applied_set(&key, &rev.revision, operator).await?;
        }
        info!("Revision {} of {} applied by {}", rev.revision, node, operator);
        Ok(())
    }

    /// Mark single items of a published revision applied
    pub async fn apply_items(
        &self,
        node: &ConfigNode,
        revision: &str,
        conf_names: &[String],
        operator: &str,
    ) -> anyhow::Result<TaskApplyOutcome> {
        if conf_names.is_empty() {
            return Err(DbConfigError::InputValidation("conf_names is required".to_string()).into());
        }
        let rev = self.published_revision(node, revision).await?;
        let outcome = self
            .store
            .task_mark_applied(&node.key(), &rev.revision, conf_names, operator)
            .await?;
        debug!(
            "Marked {} items of {} applied, {} pending",
            outcome.marked, node, outcome.pending
        );
        if outcome.applied {
            info!("Revision {} of {} applied by {}", rev.revision, node, operator);
        }
        Ok(outcome)
    }

    /// Published vs applied revision with the per-item changes
    pub async fn apply_info(&self, node: &ConfigNode) -> anyhow::Result<ApplyInfo> {
        let key = node.key();
        let published = self.store.revision_published(&key).await?;
        let applied = self.store.applied_find(&key).await?;
        let items: Vec<ApplyItem> = self
            .store
            .task_list(&key)
            .await?
            .into_iter()
            .map(ApplyItem::from)
            .collect();

        Ok(ApplyInfo {
            revision_published: published.map(|p| p.revision).unwrap_or_default(),
            revision_applied: applied.map(|a| a.revision).unwrap_or_default(),
            need_restart: items.iter().any(|i| i.need_restart && !i.applied),
            items,
        })
    }

    pub async fn status(&self, node: &ConfigNode) -> anyhow::Result<NodeStatus> {
        let key = node.key();
        let published = self
            .store
            .revision_published(&key)
            .await?
            .map(|p| p.revision)
            .unwrap_or_default();
        let applied = self
            .store
            .applied_find(&key)
            .await?
            .map(|a| a.revision)
            .unwrap_or_default();

        Ok(NodeStatus {
            is_applied: !published.is_empty() && published == applied,
            revision_published: published,
            revision_applied: applied,
        })
    }

    /// Regenerate every direct child of `node`.
    ///
    /// Children named in `publish_values` get a published revision; the other
    /// registered children get a saved-only one.
    pub async fn apply_level(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
        publish_values: &[String],
        operator: &str,
    ) -> anyhow::Result<Vec<ChildApply>> {
        let child_level = node.level_name.child().ok_or_else(|| {
            DbConfigError::InputValidation("level instance has no children".to_string())
        })?;
        let def = self
            .store
            .file_def_find(&node.file)
            .await?
            .ok_or_else(|| DbConfigError::NotFound(format!("conf file {}", node.file)))?;
        if LevelName::parse(&def.level_versioned).ok() != Some(child_level) {
            return Err(DbConfigError::InputValidation(format!(
                "conf file {} is not versioned at level {}",
                node.file, child_level
            ))
            .into());
        }

        let listed: BTreeSet<&str> = publish_values.iter().map(String::as_str).collect();
        let mut children = self.resolver.children(node, info).await?;
        for value in &listed {
            if !children.iter().any(|(c, _)| c.level_value == *value) {
                children.push(self.resolver.child(node, info, value)?);
            }
        }

        let description = format!("apply level {} {}", node.level_name, node.level_value);
        let mut applied = Vec::with_capacity(children.len());
        for (child, child_info) in &children {
            let method = if listed.contains(child.level_value.as_str()) {
                GenerateMethod::GenerateAndPublish
            } else {
                GenerateMethod::GenerateAndSave
            };
            let generated = self
                .versions
                .generate_now(child, child_info, &def, method, operator, &description)
                .await?;
            applied.push(ChildApply {
                level_name: child.level_name.to_string(),
                level_value: child.level_value.clone(),
                revision: generated.revision,
                is_published: generated.is_published,
            });
        }

        info!(
            "Applied level {} to {} children ({} published)",
            node,
            applied.len(),
            applied.iter().filter(|c| c.is_published).count()
        );
        Ok(applied)
    }
}
