//! Platform definition API handlers
//!
//! - POST /conffile/add - Create a conf file with its conf names
//! - POST /conffile/update - Replace a conf file definition
//! - GET /conffile/list - Conf files of a namespace
//! - GET /conffile/query - One conf file with its conf names
//! - GET /confname/list - Conf names of a file

use actix_web::{HttpResponse, get, post, web};
use serde_json::json;
use validator::Validate;

use dbconfig_persistence::{ConfigFileDefData, ConfigNameDefData};

use crate::{error::AppError, middleware::auth::AuthContext, model::AppState, model::Result};

use super::model::{ConfFileListParam, ConfFileParam, ConfNameListParam, FileParam};

fn definitions(param: ConfFileParam) -> (ConfigFileDefData, Vec<ConfigNameDefData>) {
    (
        param.conf_file_info.into(),
        param.conf_names.into_iter().map(Into::into).collect(),
    )
}

#[post("add")]
pub async fn add_conf_file(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<ConfFileParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let (def, names) = definitions(params.into_inner());
    let file = def.key();

    data.engine()
        .files()
        .add(def, names, auth.operator())
        .await?;

    Ok(Result::<()>::http_success(json!({ "conf_file": file.conf_file })))
}

#[post("update")]
pub async fn update_conf_file(
    data: web::Data<AppState>,
    auth: AuthContext,
    params: web::Json<ConfFileParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;
    let (def, names) = definitions(params.into_inner());
    let file = def.key();

    data.engine()
        .files()
        .update(def, names, auth.operator())
        .await?;

    Ok(Result::<()>::http_success(json!({ "conf_file": file.conf_file })))
}

#[get("list")]
pub async fn list_conf_files(
    data: web::Data<AppState>,
    params: web::Query<ConfFileListParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;

    let files = data
        .engine()
        .files()
        .list(&params.namespace, params.conf_type.as_deref())
        .await?;

    Ok(Result::<()>::http_success(files))
}

#[get("query")]
pub async fn query_conf_file(
    data: web::Data<AppState>,
    params: web::Query<FileParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;

    let detail = data.engine().files().query(&params.key()).await?;

    Ok(Result::<()>::http_success(detail))
}

#[get("list")]
pub async fn list_conf_names(
    data: web::Data<AppState>,
    params: web::Query<ConfNameListParam>,
) -> std::result::Result<HttpResponse, AppError> {
    params.validate()?;

    let names = data
        .engine()
        .files()
        .list_names(
            &params.file(),
            params.conf_name.as_deref(),
            params.include_deleted,
        )
        .await?;

    Ok(Result::<()>::http_success(names))
}
