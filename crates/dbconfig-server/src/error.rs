// Error boundary between the engine and the HTTP transport
// Services propagate anyhow::Error; the domain error is recovered here once

use std::fmt::{Display, Formatter};

use actix_web::{HttpResponse, http::StatusCode};

use dbconfig_common::DbConfigError;
use dbconfig_common::error::{PARAMETER_VALIDATE_ERROR, SERVER_ERROR};

pub use dbconfig_common::error::{
    CRYPTO_ERROR, DATA_ACCESS_ERROR, ErrorCode, RESOURCE_CONFLICT, RESOURCE_NOT_FOUND, SUCCESS,
};

use crate::model::response;

// Local wrapper for application errors to implement actix-web error handling
// (Cannot impl foreign trait for foreign type due to orphan rules)
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl From<DbConfigError> for AppError {
    fn from(value: DbConfigError) -> Self {
        AppError {
            inner: value.into(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(value: validator::ValidationErrors) -> Self {
        DbConfigError::InputValidation(value.to_string()).into()
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Numeric code and bilingual message of this error
    pub fn code_and_message(&self) -> (i32, String) {
        match self.downcast_ref::<DbConfigError>() {
            Some(e) => (e.error_code().code, e.bilingual_message()),
            None => match self.downcast_ref::<dbconfig_engine::ValidateError>() {
                Some(e) => (
                    PARAMETER_VALIDATE_ERROR.code,
                    PARAMETER_VALIDATE_ERROR.with_detail(&e.to_string()),
                ),
                None => (
                    SERVER_ERROR.code,
                    SERVER_ERROR.with_detail(&self.inner.to_string()),
                ),
            },
        }
    }
}

impl actix_web::error::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::OK
    }

    fn error_response(&self) -> HttpResponse {
        let (code, message) = self.code_and_message();
        if code == SERVER_ERROR.code || code == DATA_ACCESS_ERROR.code {
            tracing::error!("Request failed: {:#}", self.inner);
        } else {
            tracing::debug!("Request rejected with code {}: {}", code, self.inner);
        }
        response::Result::<Option<()>>::http_response(code, message, None::<()>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use actix_web::ResponseError;

    #[test]
    fn test_app_error_from_anyhow() {
        let app_err = AppError::from(anyhow::anyhow!("test error"));
        assert_eq!(format!("{}", app_err), "test error");
        assert_eq!(
            app_err.code_and_message(),
            (30000, "server error(服务内部错误): test error".to_string())
        );
    }

    #[test]
    fn test_domain_error_codes() {
        let cases = [
            (DbConfigError::InputValidation("x".into()), 20002),
            (DbConfigError::NotFound("x".into()), 20004),
            (DbConfigError::DomainConflict("x".into()), 20005),
            (DbConfigError::CryptoFailure("x".into()), 20010),
            (DbConfigError::StoreFailure("x".into()), 10002),
        ];
        for (err, code) in cases {
            assert_eq!(AppError::from(err).code_and_message().0, code);
        }
    }

    #[test]
    fn test_domain_error_survives_context() {
        let err = anyhow::Error::from(DbConfigError::NotFound("revision v_1".into()))
            .context("loading detail");
        let (code, _) = AppError::from(err).code_and_message();
        assert_eq!(code, RESOURCE_NOT_FOUND.code);
    }

    #[test]
    fn test_error_response_keeps_http_200() {
        let err = AppError::from(DbConfigError::DomainConflict("dup".into()));
        assert_eq!(err.status_code(), StatusCode::OK);
        assert_eq!(err.error_response().status(), StatusCode::OK);
    }
}
