//! Liveness of the server and its store

use actix_web::{HttpResponse, get, web};
use serde_json::json;

use dbconfig_persistence::ConfigStore;

use crate::{error::AppError, model::AppState, model::Result};

#[get("/healthz")]
pub async fn healthz(data: web::Data<AppState>) -> std::result::Result<HttpResponse, AppError> {
    let engine = data.engine();
    engine.health_check().await?;

    Ok(Result::<()>::http_success(json!({
        "status": "UP",
        "storage": engine.store().storage_mode().to_string(),
    })))
}
