use crate::handlers::auth::Claims;
use crate::handlers::errors::ApiError;
use crate::models::all_models::Permission;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use log::warn;
use std::{collections::HashSet, rc::Rc, sync::Arc};

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Admits a request only when the authenticated permission code is one of
/// the accepted codes, compared case-insensitively after trimming.
///
/// Must run inside [`AuthMiddleware`](super::auth_middleware::AuthMiddleware).
/// An empty accepted set admits nobody.
#[derive(Clone, Debug)]
pub struct RequirePermission {
    accepted: Arc<HashSet<String>>,
}

impl RequirePermission {
    pub fn any_of<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RequirePermission {
            accepted: Arc::new(codes.into_iter().map(|c| normalize(c.as_ref())).collect()),
        }
    }

    pub fn permissions(permissions: &[Permission]) -> Self {
        Self::any_of(permissions.iter().map(|p| p.to_string()))
    }

    fn admits(&self, code: &str) -> bool {
        self.accepted.contains(&normalize(code))
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequirePermission
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequirePermissionMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequirePermissionMiddleware {
            service: Rc::new(service),
            policy: self.clone(),
        })
    }
}

pub struct RequirePermissionMiddleware<S> {
    service: Rc<S>,
    policy: RequirePermission,
}

impl<S, B> Service<ServiceRequest> for RequirePermissionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let decision = match req.extensions().get::<Claims>() {
            None => Err(ApiError::unauthorized()),
            Some(claims) if self.policy.admits(&claims.permission) => Ok(()),
            Some(claims) => {
                warn!(
                    "Denied {} {} to {} with permission {}",
                    req.method(),
                    req.path(),
                    claims.login,
                    claims.permission
                );
                Err(ApiError::forbidden())
            }
        };

        let service = self.service.clone();
        Box::pin(async move {
            match decision {
                Ok(()) => service.call(req).await,
                Err(e) => Err(e.into()),
            }
        })
    }
}
