//! dbconfig Persistence - Database entities and persistence layer
//!
//! This crate provides:
//! - SeaORM entity definitions for the dbconfig tables
//! - Persistence trait abstractions over the storage backends
//! - Domain model types for persistence operations
//! - The external database backend and the in-process memory backend

pub mod entity;
pub mod error;
pub mod memory;
pub mod model;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export entity prelude
pub use entity::prelude::*;

pub use error::{PersistenceError, is_unique_violation};

// Re-export persistence traits
pub use traits::{
    ConfigStore, ContentRewriter, DefinitionPersistence, ItemPersistence, RevisionPersistence,
    ValueRewriter,
};

// Re-export backends
pub use memory::MemoryConfigStore;
pub use sql::{SqlConfigStore, schema::ensure_schema};

// Re-export model types
pub use model::{
    AppliedData, ConfigFileDefData, ConfigItemData, ConfigNameDefData, FileKey, ItemChange,
    LevelNodeData, LevelNodeFilter, NodeKey, NodeTaskData, RekeyCount, RevisionData,
    StorageMode, TaskApplyOutcome,
};
