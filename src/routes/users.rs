use crate::handlers::errors::ApiError;
use crate::handlers::user_store::UserDirectory;
use crate::middleware::permission_middleware::RequirePermission;
use crate::models::all_models::{Permission, PublicProfile};
use actix_web::{web, HttpResponse};
use log::error;

//Get User By ID
//Get User By ID Input: Path (/usuarios/{id})
//Get User By ID Output: PublicProfile
pub async fn get_user_by_id(
    users: web::Data<dyn UserDirectory>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let user = users.find_by_id(&id).await.map_err(|e| {
        error!("Failed to load user {}: {}", id, e);
        ApiError::internal(e)
    })?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(PublicProfile::from(user))),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

//Config User Routes (administrators only)
// GET /usuarios/{id}
pub fn config_user_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/usuarios")
            .wrap(RequirePermission::permissions(&[Permission::Administrator]))
            .route("/{id}", web::get().to(get_user_by_id)),
    );
}
