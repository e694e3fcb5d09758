//! Version API handlers
//!
//! - POST /version/generate - Snapshot a node into a revision
//! - POST /version/publish - Publish a saved revision
//! - POST /version/applyinfo - Published vs applied revision with item changes
//! - POST /version/applied - Confirm a published revision as applied
//! - POST /version/applyitem - Confirm single items as applied
//! - POST /version/applylevel - Regenerate every child of a node
//! - GET /version/status - Published and applied revision of a node
//! - GET /version/list - Revision history
//! - GET /version/detail - One revision with content (`revision=v_latest` allowed)

use actix_web::{HttpResponse, get, post, web};
use serde_json::json;
use validator::Validate;

use dbconfig_common::DbConfigError;

use crate::{error::AppError, middleware::auth::AuthContext, model::AppState, model::Result};

use super::model::{
    ApplyItemParam, ApplyItemResponse, ApplyLevelParam, GenerateParam, NodeParam, RevisionParam,
    VersionQueryParam,
};

#[post("generate")]
pub async fn generate(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<GenerateParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node.node()?;

    let generated = data
        .engine()
        .versions()
        .generate(
            &node,
            &params.node.level_info,
            params.method,
            auth.operator(),
            &params.description,
        )
        .await?;

    Ok(Result::<()>::http_success(generated))
}

#[post("publish")]
pub async fn publish(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<RevisionParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node.node()?;

    data.engine()
        .publisher()
        .publish(&node, &params.revision, auth.operator())
        .await?;

    Ok(Result::<()>::http_success(json!({ "revision": params.revision })))
}

#[post("applyinfo")]
pub async fn apply_info(
    data: web::Data<AppState>,
    params: web::Json<NodeParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node()?;

    let info = data.engine().publisher().apply_info(&node).await?;

    Ok(Result::<()>::http_success(info))
}

#[post("applied")]
pub async fn applied(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<RevisionParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node.node()?;

    data.engine()
        .publisher()
        .applied(&node, &params.revision, auth.operator())
        .await?;

    Ok(Result::<()>::http_success(json!({ "revision": params.revision })))
}

#[post("applyitem")]
pub async fn apply_item(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<ApplyItemParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node.node()?;

    let outcome = data
        .engine()
        .publisher()
        .apply_items(&node, &params.revision, &params.conf_names, auth.operator())
        .await?;

    Ok(Result::<()>::http_success(ApplyItemResponse {
        marked: outcome.marked,
        pending: outcome.pending,
        is_applied: outcome.applied,
    }))
}

#[post("applylevel")]
pub async fn apply_level(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<ApplyLevelParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node.node()?;

    let children = data
        .engine()
        .publisher()
        .apply_level(
            &node,
            &params.node.level_info,
            &params.publish_values,
            auth.operator(),
        )
        .await?;

    Ok(Result::<()>::http_success(children))
}

#[get("status")]
pub async fn status(
    data: web::Data<AppState>,
    params: web::Query<VersionQueryParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node()?;

    let status = data.engine().publisher().status(&node).await?;

    Ok(Result::<()>::http_success(status))
}

#[get("list")]
pub async fn list(
    data: web::Data<AppState>,
    params: web::Query<VersionQueryParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node()?;

    let revisions = data.engine().versions().list(&node, params.limit).await?;

    Ok(Result::<()>::http_success(revisions))
}

#[get("detail")]
pub async fn detail(
    data: web::Data<AppState>,
    params: web::Query<VersionQueryParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    if params.revision.is_empty() {
        return Err(DbConfigError::InputValidation("revision is required".to_string()).into());
    }
    let node = params.node()?;

    let detail = data
        .engine()
        .versions()
        .detail(&node, &params.revision, params.format, params.decrypt)
        .await?;

    Ok(Result::<()>::http_success(detail))
}
