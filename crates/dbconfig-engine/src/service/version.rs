//! Revision manager
//!
//! Snapshots the merged content of a node into immutable revisions. Two
//! generate calls landing in the same second race on the `(node, revision)`
//! unique key; the loser re-reads the winner's snapshot when the content
//! matches and retries at the next second when it does not.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, SubsecRound, TimeDelta};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dbconfig_common::DbConfigError;
use dbconfig_persistence::model::TASK_STAGE_PENDING;
use dbconfig_persistence::{
    ConfigFileDefData, ConfigStore, DefinitionPersistence, ItemChange, ItemPersistence, NodeKey,
    NodeTaskData, RevisionData, RevisionPersistence, is_unique_violation,
};

use crate::model::version::{content_md5, decode_content, encode_content, revision_id};
use crate::model::{
    ConfigNode, GenerateMethod, GeneratedRevision, ItemDiff, LevelInfo, LevelName, MergedItem,
    OutputFormat, REVISION_LATEST, RevisionInfo, diff_items, format_items,
};

use super::encryption::EncryptionService;
use super::merge::MergeEngine;

const DEFAULT_GENERATE_JITTER_MS: u64 = 2000;
const DEFAULT_FRESH_WINDOW_SECS: u64 = 10;
/// Same-second collisions tolerated before a snapshot gives up
const SNAPSHOT_ATTEMPTS: u32 = 3;

/// Timing knobs of the generate path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionPolicy {
    /// Upper bound of the random sleep before a generate
    pub generate_jitter: Duration,
    /// A latest revision younger than this is reused
    pub fresh_window: Duration,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            generate_jitter: Duration::from_millis(DEFAULT_GENERATE_JITTER_MS),
            fresh_window: Duration::from_secs(DEFAULT_FRESH_WINDOW_SECS),
        }
    }
}

impl VersionPolicy {
    pub fn new(generate_jitter: Duration, fresh_window: Duration) -> Self {
        Self {
            generate_jitter,
            fresh_window,
        }
    }
}

/// Revision with its rendered content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionDetail {
    #[serde(flatten)]
    pub info: RevisionInfo,
    pub content: serde_json::Value,
}

pub(crate) fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local().trunc_subsecs(0)
}

/// Apply task rows for the changes between two snapshots
pub(crate) fn build_tasks(node: &NodeKey, revision: &str, diffs: Vec<ItemDiff>) -> Vec<NodeTaskData> {
    diffs
        .into_iter()
        .map(|d| NodeTaskData {
            node: node.clone(),
            revision: revision.to_string(),
            conf_name: d.conf_name,
            value_before: d.value_before,
            value_after: d.value_after,
            op_type: d.op_type,
            need_restart: d.need_restart,
            stage: TASK_STAGE_PENDING,
        })
        .collect()
}

pub(crate) fn decode_revision(rev: Option<&RevisionData>) -> anyhow::Result<Vec<MergedItem>> {
    rev.map_or_else(|| Ok(Vec::new()), |r| decode_content(&r.content))
}

fn generated(rev: &RevisionData, items: Vec<MergedItem>, created: bool) -> GeneratedRevision {
    GeneratedRevision {
        revision: rev.revision.clone(),
        is_published: rev.is_published,
        created,
        content: format_items(&items, OutputFormat::List),
        items,
    }
}

#[derive(Clone)]
pub struct VersionManager {
    store: Arc<dyn ConfigStore>,
    merger: MergeEngine,
    crypto: EncryptionService,
    policy: VersionPolicy,
}

impl VersionManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        merger: MergeEngine,
        crypto: EncryptionService,
        policy: VersionPolicy,
    ) -> Self {
        Self {
            store,
            merger,
            crypto,
            policy,
        }
    }

    pub fn policy(&self) -> &VersionPolicy {
        &self.policy
    }

    /// File definition of a node's file, requiring the node to sit at the
    /// versioned level
    pub async fn versioned_file(&self, node: &ConfigNode) -> anyhow::Result<ConfigFileDefData> {
        let def = self
            .store
            .file_def_find(&node.file)
            .await?
            .ok_or_else(|| DbConfigError::NotFound(format!("conf file {}", node.file)))?;

        if def.level_versioned.is_empty() {
            return Err(DbConfigError::InputValidation(format!(
                "conf file {} is not versioned",
                node.file
            ))
            .into());
        }
        let versioned = LevelName::parse(&def.level_versioned)?;
        if versioned != node.level_name {
            return Err(DbConfigError::InputValidation(format!(
                "conf file {} is versioned at level {}, got {}",
                node.file, versioned, node.level_name
            ))
            .into());
        }
        Ok(def)
    }

    /// Generate a revision after the random jitter.
    ///
    /// A latest revision younger than the fresh window is returned as is, so
    /// a burst of requests for one node yields a single snapshot.
    pub async fn generate(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
        method: GenerateMethod,
        operator: &str,
        description: &str,
    ) -> anyhow::Result<GeneratedRevision> {
        let def = self.versioned_file(node).await?;

        let jitter = self.jitter();
        if !jitter.is_zero() {
            debug!("Sleeping {:?} before generating {}", jitter, node);
            tokio::time::sleep(jitter).await;
        }

        let key = node.key();
        if let Some(latest) = self.store.revision_latest(&key).await?
            && self.is_fresh(&latest, &now())
        {
            debug!("Reusing fresh revision {} of {}", latest.revision, node);
            let published = self.store.revision_published(&key).await?;
            return self.reuse(&key, latest, published.as_ref(), method).await;
        }

        self.generate_now(node, info, &def, method, operator, description)
            .await
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.policy.generate_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }

    /// Generate without the jitter; used by level-wide fan-out
    pub(crate) async fn generate_now(
        &self,
        node: &ConfigNode,
        info: &LevelInfo,
        def: &ConfigFileDefData,
        method: GenerateMethod,
        operator: &str,
        description: &str,
    ) -> anyhow::Result<GeneratedRevision> {
        let items = self.merger.merged(node, info).await?;
        self.snapshot(node, def, items, &[], method, operator, description)
            .await
    }

    /// Snapshot `items` as a new revision of `node`.
    ///
    /// `changes` are the pending edits of the node's own items that `items`
    /// already reflects; they are written in the same store transaction as
    /// the revision. A fresh latest revision, or for publishing methods the
    /// published one, with identical content is reused instead and the
    /// changes are written on their own. A same-second revision holding other
    /// content moves the new revision to the next second.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn snapshot(
        &self,
        node: &ConfigNode,
        def: &ConfigFileDefData,
        items: Vec<MergedItem>,
        changes: &[ItemChange],
        method: GenerateMethod,
        operator: &str,
        description: &str,
    ) -> anyhow::Result<GeneratedRevision> {
        let key = node.key();
        let content = encode_content(&items)?;
        let md5 = content_md5(&content);
        let mut created_at = now();

        for attempt in 1..=SNAPSHOT_ATTEMPTS {
            let latest = self.store.revision_latest(&key).await?;
            let published = self.store.revision_published(&key).await?;

            if let Some(latest) = latest.as_ref().filter(|l| l.content_md5 == md5)
                && self.is_fresh(latest, &created_at)
            {
                debug!("Reusing fresh revision {} of {}", latest.revision, node);
                self.write_changes(&key, changes).await?;
                return self
                    .reuse(&key, latest.clone(), published.as_ref(), method)
                    .await;
            }

            if method.publishes()
                && let Some(published) = published.as_ref().filter(|p| p.content_md5 == md5)
            {
                debug!("Published revision {} of {} is already current", published.revision, node);
                self.write_changes(&key, changes).await?;
                return Ok(generated(published, items, false));
            }

            let revision = revision_id(&created_at);
            let rows_affected = diff_items(&decode_revision(latest.as_ref())?, &items).len();
            let tasks = if method.publishes() {
                build_tasks(
                    &key,
                    &revision,
                    diff_items(&decode_revision(published.as_ref())?, &items),
                )
            } else {
                Vec::new()
            };

            let rev = RevisionData {
                node: key.clone(),
                revision: revision.clone(),
                content: content.clone(),
                content_md5: md5.clone(),
                is_published: method.publishes(),
                pre_revision: latest.map(|l| l.revision).unwrap_or_default(),
                rows_affected: rows_affected as i32,
                description: description.to_string(),
                created_by: operator.to_string(),
                created_at,
            };

            match self.store.revision_insert(&rev, changes, &tasks).await {
                Ok(()) => {
                    info!(
                        "Generated revision {} of {} ({} rows changed, published={})",
                        revision, node, rows_affected, rev.is_published
                    );
                    self.purge(node, def).await?;
                    return Ok(generated(&rev, items, true));
                }
                Err(e) if is_unique_violation(&e) => {
                    let existing = self
                        .store
                        .revision_find(&key, &revision)
                        .await?
                        .ok_or_else(|| DbConfigError::NotFound(format!("revision {}", revision)))?;
                    if existing.content_md5 == md5 {
                        warn!(
                            "Revision {} of {} was generated concurrently, re-reading it",
                            revision, node
                        );
                        self.write_changes(&key, changes).await?;
                        let published = self.store.revision_published(&key).await?;
                        return self.reuse(&key, existing, published.as_ref(), method).await;
                    }
                    warn!(
                        "Revision {} of {} holds other content, moving to the next second (attempt {}/{})",
                        revision, node, attempt, SNAPSHOT_ATTEMPTS
                    );
                    created_at = (created_at + TimeDelta::seconds(1)).max(now());
                }
                Err(e) => return Err(e),
            }
        }

        Err(DbConfigError::DomainConflict(format!(
            "revisions of {} are being generated concurrently, retry later",
            node
        ))
        .into())
    }

    async fn write_changes(&self, key: &NodeKey, changes: &[ItemChange]) -> anyhow::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.store.item_apply_changes(key, changes).await
    }

    async fn purge(&self, node: &ConfigNode, def: &ConfigFileDefData) -> anyhow::Result<()> {
        if def.version_keep_limit > 0 {
            let purged = self
                .store
                .revision_purge(&node.key(), def.version_keep_limit as u64)
                .await?;
            if purged > 0 {
                debug!("Purged {} old revisions of {}", purged, node);
            }
        }
        Ok(())
    }

    fn is_fresh(&self, rev: &RevisionData, now: &NaiveDateTime) -> bool {
        let window = TimeDelta::milliseconds(self.policy.fresh_window.as_millis() as i64);
        *now - rev.created_at < window
    }

    /// Return an existing revision, publishing it when the method asks for it
    async fn reuse(
        &self,
        key: &NodeKey,
        mut rev: RevisionData,
        published: Option<&RevisionData>,
        method: GenerateMethod,
    ) -> anyhow::Result<GeneratedRevision> {
        let items = decode_content(&rev.content)?;
        if method.publishes() && !rev.is_published {
            let tasks = build_tasks(
                key,
                &rev.revision,
                diff_items(&decode_revision(published)?, &items),
            );
            self.store
                .revision_publish(key, &rev.revision, &tasks)
                .await?;
            info!("Published reused revision {} of {}", rev.revision, key);
            rev.is_published = true;
        }
        Ok(generated(&rev, items, false))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Resolve a revision name, mapping `v_latest` to the published revision
    pub async fn resolve(&self, node: &ConfigNode, revision: &str) -> anyhow::Result<RevisionData> {
        let key = node.key();
        let found = if revision == REVISION_LATEST {
            self.store.revision_published(&key).await?
        } else {
            self.store.revision_find(&key, revision).await?
        };
        found.ok_or_else(|| {
            DbConfigError::NotFound(format!("revision {} of {}", revision, node)).into()
        })
    }

    /// Revisions of a node, newest first; `limit` 0 means all
    pub async fn list(&self, node: &ConfigNode, limit: u64) -> anyhow::Result<Vec<RevisionInfo>> {
        let key = node.key();
        let applied = self.store.applied_find(&key).await?.map(|a| a.revision);
        Ok(self
            .store
            .revision_list(&key, limit)
            .await?
            .iter()
            .map(|r| RevisionInfo::from_data(r, applied.as_deref()))
            .collect())
    }

    pub async fn detail(
        &self,
        node: &ConfigNode,
        revision: &str,
        format: OutputFormat,
        decrypt: bool,
    ) -> anyhow::Result<RevisionDetail> {
        let rev = self.resolve(node, revision).await?;
        let applied = self.store.applied_find(&node.key()).await?.map(|a| a.revision);

        let mut items = decode_content(&rev.content)?;
        if decrypt {
            self.crypto.decrypt_items(&mut items)?;
        }
        Ok(RevisionDetail {
            info: RevisionInfo::from_data(&rev, applied.as_deref()),
            content: format_items(&items, format),
        })
    }
}
