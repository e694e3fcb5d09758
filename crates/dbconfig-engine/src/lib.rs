//! dbconfig Engine - hierarchical configuration resolution and versioning
//!
//! This crate provides:
//! - Value validation against name definitions
//! - Level hierarchy resolution (plat > app > module > cluster > instance)
//! - Item merge with lock precedence and descendant conflict checks
//! - Revision generation with concurrent deduplication
//! - Publish/apply orchestration with per-item apply tracking
//! - Per-node value encryption and key rotation

pub mod model;
pub mod service;
pub mod validate;

pub use model::*;
pub use service::{
    BatchGetQuery, BatchGetResult, ConfigEngine, ConfigEngineBuilder, ConflictPredicate,
    DefaultConflictPredicate, FileDetail, PendingChange, RekeyReport, RevisionDetail, SaveResult,
    ValueState, VersionPolicy,
};
pub use validate::{ValidateError, check_in_enums, check_in_range, validate_value};
