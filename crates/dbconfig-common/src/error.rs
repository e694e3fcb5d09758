//! Error types and error codes for dbconfig
//!
//! This module defines:
//! - `DbConfigError`: the domain error taxonomy carried inside `anyhow::Error`
//! - `ErrorCode`: numeric codes with bilingual messages for API responses

use serde::{Deserialize, Serialize};

/// Domain error taxonomy.
///
/// Services propagate these wrapped in `anyhow::Error`; the transport
/// boundary downcasts once and maps each variant to an [`ErrorCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DbConfigError {
    /// Malformed or missing fields, illegal level/bk_biz_id pairing
    #[error("{0}")]
    InputValidation(String),

    /// Lower-level conflict, already applied, duplicate conf_name
    #[error("{0}")]
    DomainConflict(String),

    /// Unknown node, file or revision
    #[error("{0}")]
    NotFound(String),

    /// Decrypt/encrypt failure on a single value
    #[error("{0}")]
    CryptoFailure(String),

    /// Transaction, deadlock or other storage failure
    #[error("{0}")]
    StoreFailure(String),
}

impl DbConfigError {
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            DbConfigError::InputValidation(_) => PARAMETER_VALIDATE_ERROR,
            DbConfigError::DomainConflict(_) => RESOURCE_CONFLICT,
            DbConfigError::NotFound(_) => RESOURCE_NOT_FOUND,
            DbConfigError::CryptoFailure(_) => CRYPTO_ERROR,
            DbConfigError::StoreFailure(_) => DATA_ACCESS_ERROR,
        }
    }

    /// Message shown to API callers: bilingual category plus detail.
    pub fn bilingual_message(&self) -> String {
        self.error_code().with_detail(&self.to_string())
    }
}

/// Error code structure for API responses
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
    pub message_zh: &'a str,
}

impl ErrorCode<'_> {
    /// `"<message>(<message_zh>): <detail>"`, or just the category when the
    /// detail is empty.
    pub fn with_detail(&self, detail: &str) -> String {
        if detail.is_empty() {
            format!("{}({})", self.message, self.message_zh)
        } else {
            format!("{}({}): {}", self.message, self.message_zh, detail)
        }
    }
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
    message_zh: "成功",
};

pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
    message_zh: "数据访问错误",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
    message_zh: "参数校验错误",
};

pub const RESOURCE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 20004,
    message: "resource not found",
    message_zh: "资源不存在",
};

pub const RESOURCE_CONFLICT: ErrorCode<'static> = ErrorCode {
    code: 20005,
    message: "resource conflict",
    message_zh: "资源冲突",
};

pub const CRYPTO_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20010,
    message: "crypto error",
    message_zh: "加解密错误",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
    message_zh: "服务内部错误",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbConfigError::InputValidation("level_name is required".to_string());
        assert_eq!(format!("{}", err), "level_name is required");
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            DbConfigError::InputValidation(String::new()).error_code().code,
            20002
        );
        assert_eq!(
            DbConfigError::DomainConflict(String::new()).error_code().code,
            20005
        );
        assert_eq!(DbConfigError::NotFound(String::new()).error_code().code, 20004);
        assert_eq!(
            DbConfigError::CryptoFailure(String::new()).error_code().code,
            20010
        );
        assert_eq!(
            DbConfigError::StoreFailure(String::new()).error_code().code,
            10002
        );
    }

    #[test]
    fn test_bilingual_message() {
        let err = DbConfigError::NotFound("revision v_20240101000000".to_string());
        assert_eq!(
            err.bilingual_message(),
            "resource not found(资源不存在): revision v_20240101000000"
        );
        assert_eq!(SERVER_ERROR.with_detail(""), "server error(服务内部错误)");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = DbConfigError::DomainConflict("dup".to_string()).into();
        assert!(matches!(
            err.downcast_ref::<DbConfigError>(),
            Some(DbConfigError::DomainConflict(_))
        ));
    }
}
