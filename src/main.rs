mod handlers;
mod middleware;
mod models;
mod routes;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, HttpResponse};
use handlers::auth::{JwtCodec, TokenCodec};
use handlers::config::AppConfig;
use handlers::directory::{DirectoryClient, LdapConnector};
use handlers::login::AuthService;
use handlers::user_store::{LastLoginRecorder, PgUserStore, UserDirectory};
use log::{error, info};
use routes::config_routes;
use shuttle_actix_web::ShuttleActixWeb;
use shuttle_runtime::SecretStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

#[shuttle_runtime::main]
async fn main(
    #[shuttle_runtime::Secrets] secrets: SecretStore,
) -> ShuttleActixWeb<impl FnOnce(&mut web::ServiceConfig) + Send + Clone + 'static> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
    info!("=== Helpdesk API Server Starting ===");

    let config = match AppConfig::from_secrets(&secrets) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return Err(shuttle_runtime::Error::Custom(e));
        }
    };

    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to Postgres: {}", e);
            return Err(shuttle_runtime::Error::Custom(anyhow::anyhow!(
                "Database connection failed"
            )));
        }
    };

    if handlers::db::check_db_connection(&pool).await {
        info!("Database connection established and verified");
    } else {
        info!("Database connection established but verification failed");
    }

    let store = Arc::new(PgUserStore::new(pool));
    let users: Arc<dyn UserDirectory> = store.clone();
    let last_login: Arc<dyn LastLoginRecorder> = store;
    let tokens: Arc<dyn TokenCodec> = Arc::new(JwtCodec::new(&config.tokens));
    let directory = DirectoryClient::new(
        Arc::new(LdapConnector::new(&config.directory)),
        config.directory.clone(),
    );
    info!(
        "Directory authentication against {} (base {})",
        config.directory.url, config.directory.base_dn
    );
    let auth = web::Data::new(AuthService::new(directory, users.clone(), tokens.clone()));
    let users = web::Data::from(users);

    let app = move |cfg: &mut web::ServiceConfig| {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .max_age(3600);

        cfg.app_data(auth.clone());
        cfg.app_data(users.clone());
        cfg.route(
            "/",
            web::get().to(|| async { HttpResponse::Ok().body("Helpdesk API") }),
        );
        cfg.service(
            web::scope("")
                .wrap(Logger::new("%a \"%r\" %s %b %D ms"))
                .wrap(cors)
                .configure(|scope| config_routes(scope, tokens.clone(), last_login.clone())),
        );
    };

    Ok(app.into())
}
