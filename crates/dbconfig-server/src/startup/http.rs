//! HTTP server setup

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};

use crate::{api, middleware::auth::Authentication, model::AppState};

/// Creates and binds the API server.
pub fn api_server(
    app_state: Arc<AppState>,
    context_path: String,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Authentication)
            .wrap(Logger::default())
            .app_data(web::Data::from(app_state.clone()))
            .configure(api::route::configure(context_path.clone()))
    })
    .bind((address, port))?
    .run())
}
