//! Config item API handlers
//!
//! - POST /confitem/query - Merged config of one node
//! - POST /confitem/batchget - Merged config of many nodes of one level
//! - POST /confitem/upsert - Edit items of a versioned file
//! - POST /confitem/save - Edit items of an unversioned file

use actix_web::{HttpResponse, post, web};
use validator::Validate;

use dbconfig_engine::{BatchGetQuery, ItemEdit, LevelName};

use crate::{error::AppError, middleware::auth::AuthContext, model::AppState, model::Result};

use super::model::{BatchGetParam, QueryParam, QueryResponse, SaveParam, UpsertParam};

fn item_edit(param: SaveParam) -> std::result::Result<ItemEdit, AppError> {
    let mut edit = ItemEdit::new(param.node.node()?, param.conf_items)
        .with_info(param.node.level_info);
    edit.confirm = param.confirm;
    edit.description = param.description;
    Ok(edit)
}

#[post("query")]
pub async fn query(
    data: web::Data<AppState>,
    params: web::Json<QueryParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let node = params.node.node()?;

    let content = data
        .engine()
        .items()
        .query(&node, &params.node.level_info, params.format, params.decrypt)
        .await?;

    Ok(Result::<QueryResponse>::http_success(QueryResponse {
        bk_biz_id: node.bk_biz_id,
        conf_file: node.file.conf_file,
        level_name: node.level_name.to_string(),
        level_value: node.level_value,
        content,
    }))
}

#[post("batchget")]
pub async fn batch_get(
    data: web::Data<AppState>,
    params: web::Json<BatchGetParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let params = params.into_inner();

    let batch_query = BatchGetQuery {
        bk_biz_id: params.bk_biz_id,
        file: params.file.key(),
        level_name: LevelName::parse(&params.level_name)?,
        level_values: params.level_values,
        info: params.level_info,
        conf_names: params.conf_names,
        format: params.format,
    };
    let result = data.engine().items().batch_get(&batch_query).await?;

    Ok(Result::<()>::http_success(result))
}

#[post("upsert")]
pub async fn upsert(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<UpsertParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let params = params.into_inner();
    let req_type = params.req_type;
    let edit = item_edit(params.save)?;

    let result = data
        .engine()
        .items()
        .upsert(&edit, req_type, auth.operator())
        .await?;

    Ok(Result::<()>::http_success(result))
}

#[post("save")]
pub async fn save(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<SaveParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let edit = item_edit(params.into_inner())?;

    let result = data.engine().items().save(&edit, auth.operator()).await?;

    Ok(Result::<()>::http_success(result))
}
