use crate::handlers::auth::{Claims, TokenCodec};
use crate::handlers::errors::ApiError;
use crate::handlers::user_store::LastLoginRecorder;
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures_util::future::{ok, Ready};
use log::warn;
use std::{
    future::Future,
    pin::Pin,
    rc::Rc,
    sync::Arc,
    task::{Context, Poll},
};

const BEARER_PREFIX: &str = "Bearer ";

/// Middleware for bearer-token authentication.
///
/// Verified [`Claims`] are stored in the request extensions, keyed by their
/// type; handlers read them with `req.extensions().get::<Claims>()`.
#[derive(Clone)]
pub struct AuthMiddleware {
    tokens: Arc<dyn TokenCodec>,
    last_login: Arc<dyn LastLoginRecorder>,
}

impl AuthMiddleware {
    pub fn new(tokens: Arc<dyn TokenCodec>, last_login: Arc<dyn LastLoginRecorder>) -> Self {
        AuthMiddleware { tokens, last_login }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareMiddleware {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
            last_login: self.last_login.clone(),
        })
    }
}

pub struct AuthMiddlewareMiddleware<S> {
    service: Rc<S>,
    tokens: Arc<dyn TokenCodec>,
    last_login: Arc<dyn LastLoginRecorder>,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let tokens = self.tokens.clone();
        let last_login = self.last_login.clone();

        Box::pin(async move {
            let Some(token) = bearer_token(&req) else {
                return Err(Error::from(ApiError::unauthorized()));
            };

            let claims: Claims = match tokens.parse_access(&token) {
                Ok(claims) => claims,
                Err(e) => {
                    warn!("Rejected access token for {}: {}", req.path(), e);
                    return Err(Error::from(ApiError::unauthorized()));
                }
            };

            // Fire and forget; ordering against the response is unspecified.
            let user_id = claims.id.clone();
            actix_web::rt::spawn(async move {
                if let Err(e) = last_login.record_login(&user_id).await {
                    warn!("Failed to update last login for {}: {}", user_id, e);
                }
            });

            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}
