//! Persistence traits for the storage abstraction layer
//!
//! The traits are split by concern and combined into [`ConfigStore`], the
//! single handle the engine holds. Backends: external database
//! (MySQL/PostgreSQL via SeaORM) and the in-process memory store.

pub mod definition;
pub mod item;
pub mod revision;

pub use definition::DefinitionPersistence;
pub use item::ItemPersistence;
pub use revision::RevisionPersistence;

use async_trait::async_trait;

use crate::model::{FileKey, NodeKey, RekeyCount, StorageMode};

/// Rewrites one stored value of a node
pub type ValueRewriter<'a> = &'a (dyn Fn(&NodeKey, &str) -> anyhow::Result<String> + Send + Sync);

/// Rewrites one revision content, returning the new content and its md5
pub type ContentRewriter<'a> =
    &'a (dyn Fn(&NodeKey, &str) -> anyhow::Result<(String, String)> + Send + Sync);

/// Unified store trait
///
/// Every multi-row write goes through one backend transaction: either all of
/// its rows land or none do.
#[async_trait]
pub trait ConfigStore:
    DefinitionPersistence + ItemPersistence + RevisionPersistence + Send + Sync
{
    /// Get the current storage mode
    fn storage_mode(&self) -> StorageMode;

    /// Health check for the storage backend
    async fn health_check(&self) -> anyhow::Result<()>;

    /// Re-key one conf file in a single transaction.
    ///
    /// Rewrites the plat values (name defaults) and node items of
    /// `encrypted_names` through `rewrite_value`, and every revision of the
    /// file through `rewrite_content`. Any callback error rolls back the
    /// whole file.
    async fn rekey_file(
        &self,
        file: &FileKey,
        encrypted_names: &[String],
        rewrite_value: ValueRewriter<'_>,
        rewrite_content: ContentRewriter<'_>,
    ) -> anyhow::Result<RekeyCount>;
}
