//! Revision, applied-state and apply-task persistence

use async_trait::async_trait;

use crate::model::{
    AppliedData, ItemChange, NodeKey, NodeTaskData, RevisionData, TaskApplyOutcome,
};

#[async_trait]
pub trait RevisionPersistence: Send + Sync {
    /// Insert a revision together with the item edits it snapshots.
    ///
    /// `changes` are applied to the items of `rev.node` and the revision row
    /// is inserted in one transaction. When `rev.is_published` is set, every
    /// other revision of the node is unpublished and the node's apply tasks
    /// are replaced by `tasks` in that same transaction. A duplicate
    /// `(node, revision)` fails with
    /// [`crate::PersistenceError::UniqueViolation`] and leaves the items
    /// untouched.
    async fn revision_insert(
        &self,
        rev: &RevisionData,
        changes: &[ItemChange],
        tasks: &[NodeTaskData],
    ) -> anyhow::Result<()>;

    async fn revision_find(
        &self,
        node: &NodeKey,
        revision: &str,
    ) -> anyhow::Result<Option<RevisionData>>;

    /// Most recently created revision
    async fn revision_latest(&self, node: &NodeKey) -> anyhow::Result<Option<RevisionData>>;

    /// Currently published revision
    async fn revision_published(&self, node: &NodeKey) -> anyhow::Result<Option<RevisionData>>;

    /// Revisions newest first; `limit` 0 means all
    async fn revision_list(&self, node: &NodeKey, limit: u64) -> anyhow::Result<Vec<RevisionData>>;

    /// Publish an existing revision, unpublishing the others and replacing the
    /// node's apply tasks, in one transaction
    async fn revision_publish(
        &self,
        node: &NodeKey,
        revision: &str,
        tasks: &[NodeTaskData],
    ) -> anyhow::Result<()>;

    /// Delete the oldest revisions beyond `keep` that are neither published
    /// nor applied. Returns the number deleted.
    async fn revision_purge(&self, node: &NodeKey, keep: u64) -> anyhow::Result<u64>;

    async fn applied_find(&self, node: &NodeKey) -> anyhow::Result<Option<AppliedData>>;

    /// Set the node's applied revision
    async fn applied_set(&self, node: &NodeKey, revision: &str, operator: &str)
    -> anyhow::Result<()>;

    /// Apply tasks of the node's published revision
    async fn task_list(&self, node: &NodeKey) -> anyhow::Result<Vec<NodeTaskData>>;

    /// Mark tasks of `revision` applied (all of them when `conf_names` is
    /// empty). When none remain pending the applied revision is advanced in
    /// the same transaction.
    async fn task_mark_applied(
        &self,
        node: &NodeKey,
        revision: &str,
        conf_names: &[String],
        operator: &str,
    ) -> anyhow::Result<TaskApplyOutcome>;
}
