// Gateway identity middleware for Actix-web
// Parses the X-Bkapi-Authorization header into an AuthContext request extension

use actix_service::forward_ready;
use actix_utils::future::{Ready, ok, ready};
use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
    body::EitherBody,
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
};
use futures::future::LocalBoxFuture;
use serde::Deserialize;

use dbconfig_common::{ANONYMOUS_USER, DbConfigError};

use crate::error::AppError;
use crate::model::constants::AUTHORIZATION_HEADER;

/// Caller identity as sent by the API gateway
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AuthContext {
    #[serde(default)]
    pub bk_app_code: String,
    #[serde(default)]
    pub bk_username: String,
}

impl AuthContext {
    /// Operator recorded on writes
    pub fn operator(&self) -> &str {
        if self.bk_username.is_empty() {
            ANONYMOUS_USER
        } else {
            &self.bk_username
        }
    }
}

/// Parse the header value; absent means anonymous, malformed is rejected
pub fn parse_auth_header(value: Option<&[u8]>) -> Result<AuthContext, DbConfigError> {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return Ok(AuthContext::default());
    };
    serde_json::from_slice(raw).map_err(|e| {
        DbConfigError::InputValidation(format!("malformed {} header: {}", AUTHORIZATION_HEADER, e))
    })
}

impl FromRequest for AuthContext {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(req
            .extensions()
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_default()))
    }
}

pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthenticationMiddleware { service })
    }
}

pub struct AuthenticationMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let header = req
            .headers()
            .get(AUTHORIZATION_HEADER)
            .map(|v| v.as_bytes().to_vec());

        match parse_auth_header(header.as_deref()) {
            Ok(auth_context) => {
                req.extensions_mut().insert(auth_context);
                let res = self.service.call(req);
                Box::pin(async move { res.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(e) => {
                tracing::warn!("Rejected request to {}: {}", req.path(), e);
                let response = AppError::from(e).error_response();
                Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
            }
        }
    }
}
