use crate::models::all_models::{NewUser, User};
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent store of provisioned users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;
    async fn create(&self, user: NewUser) -> Result<(), StoreError>;
    async fn update_last_login(&self, id: &str) -> Result<(), StoreError>;
}

/// The one capability the authentication middleware needs from the store.
#[async_trait]
pub trait LastLoginRecorder: Send + Sync {
    async fn record_login(&self, user_id: &str) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str = "id::text AS id, login, nome, email, permissao, status, avatar, \
     ultimo_login, created_at, updated_at";

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        PgUserStore { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {} FROM usuarios WHERE id::text = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let query = format!(
            "SELECT {} FROM usuarios WHERE LOWER(login) = LOWER($1)",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO usuarios (login, nome, email, permissao, status) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&user.login)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.permission)
        .bind(user.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_last_login(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE usuarios SET ultimo_login = NOW(), updated_at = NOW() WHERE id::text = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LastLoginRecorder for PgUserStore {
    async fn record_login(&self, user_id: &str) -> Result<(), StoreError> {
        self.update_last_login(user_id).await
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory [`UserDirectory`] for tests.
    #[derive(Default)]
    pub struct InMemoryUserStore {
        users: Mutex<Vec<User>>,
        next_id: AtomicUsize,
        pub fail_last_login: AtomicBool,
        pub last_login_updates: AtomicUsize,
    }

    impl InMemoryUserStore {
        pub fn with_user(self, login: &str, permission: &str) -> Self {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let now = Utc::now().naive_utc();
            self.users.lock().unwrap().push(User {
                id: id.to_string(),
                login: login.to_string(),
                name: format!("{} name", login),
                email: format!("{}@corp.local", login),
                permission: permission.to_string(),
                status: true,
                avatar: None,
                last_login: None,
                created_at: now,
                updated_at: now,
            });
            self
        }

        pub fn users(&self) -> Vec<User> {
            self.users.lock().unwrap().clone()
        }

        pub fn set_status(&self, login: &str, status: bool) {
            for user in self.users.lock().unwrap().iter_mut() {
                if user.login == login {
                    user.status = status;
                }
            }
        }

        pub fn remove(&self, id: &str) {
            self.users.lock().unwrap().retain(|u| u.id != id);
        }
    }

    #[async_trait]
    impl UserDirectory for InMemoryUserStore {
        async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
            Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
        }

        async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.login.eq_ignore_ascii_case(login))
                .cloned())
        }

        async fn create(&self, user: NewUser) -> Result<(), StoreError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let now = Utc::now().naive_utc();
            self.users.lock().unwrap().push(User {
                id: id.to_string(),
                login: user.login,
                name: user.name,
                email: user.email,
                permission: user.permission,
                status: user.status,
                avatar: None,
                last_login: None,
                created_at: now,
                updated_at: now,
            });
            Ok(())
        }

        async fn update_last_login(&self, id: &str) -> Result<(), StoreError> {
            if self.fail_last_login.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.last_login_updates.fetch_add(1, Ordering::SeqCst);
            let now = Utc::now().naive_utc();
            for user in self.users.lock().unwrap().iter_mut() {
                if user.id == id {
                    user.last_login = Some(now);
                    user.updated_at = now;
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LastLoginRecorder for InMemoryUserStore {
        async fn record_login(&self, user_id: &str) -> Result<(), StoreError> {
            self.update_last_login(user_id).await
        }
    }
}
