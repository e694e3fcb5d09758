//! Storage-level errors that callers branch on

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// A unique index rejected the write
    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),
}

/// Whether an error chain carries a unique-constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PersistenceError>(),
        Some(PersistenceError::UniqueViolation(_))
    )
}
