//! Shared building blocks for dbconfig: the error taxonomy with its API error
//! codes, the value crypto codec and human-readable unit parsing.

pub mod crypto;
pub mod error;
pub mod units;

pub use crypto::{CryptoError, CryptoResult, ValueCodec, derive_key};
pub use error::{DbConfigError, ErrorCode};

/// `bk_biz_id` reserved for the platform level
pub const PLAT_BIZ_ID: &str = "0";

/// `level_value` of the single platform node
pub const PLAT_LEVEL_VALUE: &str = "0";

/// Operator recorded when the caller does not identify itself
pub const ANONYMOUS_USER: &str = "anonymous";
