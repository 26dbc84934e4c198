use sqlx::PgPool;

pub async fn check_db_connection(pool: &PgPool) -> bool {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM usuarios")
        .fetch_one(pool)
        .await
    {
        Ok(count) => {
            log::info!("User store reachable, {} provisioned users", count);
            true
        }
        Err(e) => {
            log::error!("User store check failed: {}", e);
            false
        }
    }
}
