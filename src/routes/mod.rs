pub mod user_auth;
pub mod users;

use crate::handlers::auth::TokenCodec;
use crate::handlers::user_store::LastLoginRecorder;
use crate::middleware::auth_middleware::AuthMiddleware;
use actix_web::web;
use std::sync::Arc;
use user_auth::{config_protected_auth_routes, config_user_auth_routes};
use users::config_user_routes;

/// Public login/refresh routes, then everything behind bearer authentication.
/// Expects `Data<AuthService>` and `Data<dyn UserDirectory>` as app data.
pub fn config_routes(
    cfg: &mut web::ServiceConfig,
    tokens: Arc<dyn TokenCodec>,
    last_login: Arc<dyn LastLoginRecorder>,
) {
    cfg.configure(config_user_auth_routes).service(
        web::scope("")
            .wrap(AuthMiddleware::new(tokens, last_login))
            .configure(config_protected_auth_routes)
            .configure(config_user_routes),
    );
}
