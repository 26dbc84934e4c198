use crate::handlers::auth::Claims;
use crate::handlers::errors::ApiError;
use crate::handlers::login::{AuthService, LoginRequest, RefreshRequest};
use crate::handlers::user_store::UserDirectory;
use crate::models::all_models::PublicProfile;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use log::error;
use serde_json::json;

//Login
//Login Input: LoginRequest { login, senha }
//Login Output: TokenPair
pub async fn login(
    auth: web::Data<AuthService>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let pair = auth.login(&payload).await?;
    Ok(HttpResponse::Ok().json(pair))
}

//Refresh
//Refresh Input: RefreshRequest { refresh_token }
//Refresh Output: TokenPair
pub async fn refresh(
    auth: web::Data<AuthService>,
    payload: web::Json<RefreshRequest>,
) -> Result<HttpResponse, ApiError> {
    let pair = auth.refresh(&payload).await?;
    Ok(HttpResponse::Ok().json(pair))
}

//Get Logged In User
//Get Logged In User Input: HttpRequest(JWT Token)
//Get Logged In User Output: PublicProfile
pub async fn me(
    req: HttpRequest,
    users: web::Data<dyn UserDirectory>,
) -> Result<HttpResponse, ApiError> {
    let user_id = match req.extensions().get::<Claims>() {
        Some(claims) => claims.id.clone(),
        None => return Err(ApiError::unauthorized()),
    };

    let user = users.find_by_id(&user_id).await.map_err(|e| {
        error!("Failed to load user {}: {}", user_id, e);
        ApiError::internal(e)
    })?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(PublicProfile::from(user))),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest {
            message: "Invalid payload".to_string(),
            details: Some(json!(err.to_string())),
        }
        .into()
    })
}

//Config Public Auth Routes
// POST /login
// POST /refresh
pub fn config_user_auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/login")
            .app_data(json_config())
            .route(web::post().to(login)),
    )
    .service(
        web::resource("/refresh")
            .app_data(json_config())
            .route(web::post().to(refresh)),
    );
}

//Config Protected Auth Routes
// GET /eu
pub fn config_protected_auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/eu", web::get().to(me));
}
