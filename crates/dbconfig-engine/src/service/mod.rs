//! Engine service layer
//!
//! This module wires the engine components over one [`ConfigStore`]:
//! - Level resolution and the level registry
//! - Item merge with lock precedence and conflict detection
//! - Per-node value encryption and key rotation
//! - Revision generation, publish and apply tracking
//! - Conf file and conf name definitions

pub mod encryption;
pub mod file;
pub mod item;
pub mod level;
pub mod merge;
pub mod publish;
pub mod version;

use std::sync::Arc;

use dbconfig_common::ValueCodec;
use dbconfig_persistence::ConfigStore;

pub use encryption::{EncryptionService, RekeyReport, Rekeyer};
pub use file::{FileDetail, FileService};
pub use item::{BatchGetQuery, BatchGetResult, ItemService, SaveResult};
pub use level::{LevelResolver, ancestor_chain};
pub use merge::{
    ConflictPredicate, DefaultConflictPredicate, Layer, MergeEngine, PendingChange, ValueState,
    merge_layers,
};
pub use publish::PublishService;
pub use version::{RevisionDetail, VersionManager, VersionPolicy};

/// Key prefix used when none is configured
pub const DEFAULT_KEY_PREFIX: &str = "dbconfig";

/// The engine facade: every service built once over a shared store
#[derive(Clone)]
pub struct ConfigEngine {
    store: Arc<dyn ConfigStore>,
    crypto: EncryptionService,
    resolver: LevelResolver,
    items: ItemService,
    versions: VersionManager,
    publisher: PublishService,
    files: FileService,
}

impl ConfigEngine {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        ConfigEngineBuilder::new(store).build()
    }

    pub fn builder(store: Arc<dyn ConfigStore>) -> ConfigEngineBuilder {
        ConfigEngineBuilder::new(store)
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn crypto(&self) -> &EncryptionService {
        &self.crypto
    }

    pub fn resolver(&self) -> &LevelResolver {
        &self.resolver
    }

    pub fn items(&self) -> &ItemService {
        &self.items
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn publisher(&self) -> &PublishService {
        &self.publisher
    }

    pub fn files(&self) -> &FileService {
        &self.files
    }

    /// Re-keyer moving stored values from `from` to this engine's codec
    pub fn rekeyer(&self, from: ValueCodec) -> Rekeyer {
        Rekeyer::new(self.store.clone(), from, self.crypto.codec().clone())
    }

    pub async fn health_check(&self) -> anyhow::Result<()> {
        self.store.health_check().await
    }
}

/// Builder for [`ConfigEngine`]
pub struct ConfigEngineBuilder {
    store: Arc<dyn ConfigStore>,
    codec: ValueCodec,
    policy: VersionPolicy,
    predicate: Arc<dyn ConflictPredicate>,
}

impl ConfigEngineBuilder {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            codec: ValueCodec::new(DEFAULT_KEY_PREFIX, false),
            policy: VersionPolicy::default(),
            predicate: Arc::new(DefaultConflictPredicate),
        }
    }

    /// Set the value codec (key prefix and gzip)
    pub fn codec(mut self, codec: ValueCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the generate timing policy
    pub fn policy(mut self, policy: VersionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the descendant conflict predicate
    pub fn predicate(mut self, predicate: Arc<dyn ConflictPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn build(self) -> ConfigEngine {
        let store = self.store;
        let crypto = EncryptionService::new(self.codec);
        let resolver = LevelResolver::new(store.clone());
        let merger = MergeEngine::new(store.clone());
        let versions =
            VersionManager::new(store.clone(), merger.clone(), crypto.clone(), self.policy);
        let publisher = PublishService::new(store.clone(), versions.clone(), resolver.clone());
        let items = ItemService::new(
            store.clone(),
            resolver.clone(),
            merger,
            crypto.clone(),
            versions.clone(),
            self.predicate,
        );
        let files = FileService::new(store.clone(), crypto.clone());

        ConfigEngine {
            store,
            crypto,
            resolver,
            items,
            versions,
            publisher,
            files,
        }
    }
}
