//! HTTP response envelope
//!
//! Every endpoint answers HTTP 200 with `{code, message, data}`; `code` 0
//! means success and any other value is an [`ErrorCode`](dbconfig_common::ErrorCode).

use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

use dbconfig_common::error::SUCCESS;

/// Generic result wrapper for API responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Result<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T> Result<T> {
    pub fn new(code: i32, message: String, data: T) -> Self {
        Result::<T> {
            code,
            message,
            data,
        }
    }

    pub fn success(data: T) -> Result<T> {
        Result::<T> {
            code: SUCCESS.code,
            message: SUCCESS.message.to_string(),
            data,
        }
    }

    pub fn http_success(data: impl Serialize) -> HttpResponse {
        HttpResponse::Ok().json(Result::success(data))
    }

    /// Failure envelope; the HTTP status stays 200
    pub fn http_response(code: i32, message: String, data: impl Serialize) -> HttpResponse {
        HttpResponse::Ok().json(Result::new(code, message, data))
    }
}
