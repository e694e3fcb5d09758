//! API routing configuration
//!
//! Routes under the context path (default `/bkconfig/v1`):
//! - /confitem/{query, batchget, upsert, save}
//! - /version/{generate, publish, applyinfo, applied, applyitem, applylevel, status, list, detail}
//! - /conffile/{add, update, list, query}
//! - /confname/list
//!
//! `/healthz` is served outside the context path.

use actix_web::{Scope, error::JsonPayloadError, error::QueryPayloadError, web};

use dbconfig_common::DbConfigError;

use crate::error::AppError;

use super::{conffile, confitem, health, version};

/// Body and query decoding failures answer with the envelope like any other
/// input error
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req| {
        AppError::from(DbConfigError::InputValidation(err.to_string())).into()
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err: QueryPayloadError, _req| {
        AppError::from(DbConfigError::InputValidation(err.to_string())).into()
    })
}

pub fn routes(context_path: &str) -> Scope {
    web::scope(context_path)
        .service(
            web::scope("/confitem")
                .service(confitem::query)
                .service(confitem::batch_get)
                .service(confitem::upsert)
                .service(confitem::save),
        )
        .service(
            web::scope("/version")
                .service(version::generate)
                .service(version::publish)
                .service(version::apply_info)
                .service(version::applied)
                .service(version::apply_item)
                .service(version::apply_level)
                .service(version::status)
                .service(version::list)
                .service(version::detail),
        )
        .service(
            web::scope("/conffile")
                .service(conffile::add_conf_file)
                .service(conffile::update_conf_file)
                .service(conffile::list_conf_files)
                .service(conffile::query_conf_file),
        )
        .service(web::scope("/confname").service(conffile::list_conf_names))
}

/// Register the API on an app or a test service
pub fn configure(context_path: String) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(json_config())
            .app_data(query_config())
            .service(health::healthz)
            .service(routes(&context_path));
    }
}
