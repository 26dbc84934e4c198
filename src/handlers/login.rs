use crate::handlers::auth::{Claims, TokenCodec, TokenPair};
use crate::handlers::directory::{DirectoryClient, DirectoryError};
use crate::handlers::errors::ApiError;
use crate::handlers::user_store::UserDirectory;
use crate::models::all_models::{NewUser, User};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Display;
use std::sync::Arc;

//Login Request
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub login: String,
    #[serde(default, rename = "senha")]
    pub password: String,
}

//Refresh Request
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

fn internal<E: Display>(context: &'static str) -> impl FnOnce(E) -> ApiError {
    move |e| {
        error!("{}: {}", context, e);
        ApiError::internal(e)
    }
}

/// Login and refresh flows: directory verification, first-login
/// provisioning and token issuance.
pub struct AuthService {
    directory: DirectoryClient,
    users: Arc<dyn UserDirectory>,
    tokens: Arc<dyn TokenCodec>,
}

impl AuthService {
    pub fn new(
        directory: DirectoryClient,
        users: Arc<dyn UserDirectory>,
        tokens: Arc<dyn TokenCodec>,
    ) -> Self {
        AuthService {
            directory,
            users,
            tokens,
        }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<TokenPair, ApiError> {
        let login = request.login.trim();
        let mut missing = Vec::new();
        if login.is_empty() {
            missing.push("login");
        }
        if request.password.is_empty() {
            missing.push("senha");
        }
        if !missing.is_empty() {
            return Err(ApiError::BadRequest {
                message: "Invalid login payload".to_string(),
                details: Some(json!({ "missing": missing })),
            });
        }

        let existing = self
            .users
            .find_by_login(login)
            .await
            .map_err(internal("Failed to look up user"))?;

        // Same answer whether or not the account exists locally.
        match self.directory.bind(login, &request.password).await {
            Ok(()) => {}
            Err(DirectoryError::InvalidCredentials) => {
                warn!("Directory rejected credentials for {}", login);
                return Err(ApiError::Unauthorized(
                    "Incorrect login or password".to_string(),
                ));
            }
            Err(e) => return Err(internal("Directory authentication failed")(e)),
        }

        let user = match existing {
            Some(user) => user,
            None => self.provision(login).await?,
        };

        if !user.status {
            warn!("Inactive user {} attempted to log in", user.login);
            return Err(ApiError::Forbidden("User is inactive".to_string()));
        }

        self.touch_last_login(&user.id).await;

        let pair = self
            .tokens
            .issue_pair(&Claims::for_user(&user))
            .map_err(internal("Failed to sign tokens"))?;
        info!("User {} logged in", user.login);
        Ok(pair)
    }

    pub async fn refresh(&self, request: &RefreshRequest) -> Result<TokenPair, ApiError> {
        let token = request.refresh_token.trim();
        if token.is_empty() {
            return Err(ApiError::bad_request("refresh_token is required"));
        }

        let claims = self.tokens.parse_refresh(token).map_err(|e| {
            warn!("Rejected refresh token: {}", e);
            ApiError::Unauthorized("Invalid or expired refresh token".to_string())
        })?;

        let user = self
            .users
            .find_by_id(&claims.id)
            .await
            .map_err(internal("Failed to look up user"))?;
        let user = match user {
            Some(user) if user.status => user,
            Some(_) | None => {
                warn!("Refresh token references unknown or inactive user {}", claims.id);
                return Err(ApiError::Unauthorized(
                    "Invalid or expired refresh token".to_string(),
                ));
            }
        };

        self.touch_last_login(&user.id).await;

        // The codec stamps new iat/nbf/exp/jti on both tokens.
        let pair = self
            .tokens
            .issue_pair(&claims)
            .map_err(internal("Failed to sign tokens"))?;
        info!("Tokens refreshed for {}", user.login);
        Ok(pair)
    }

    async fn provision(&self, login: &str) -> Result<User, ApiError> {
        let profile = self
            .directory
            .search_by_login(login)
            .await
            .map_err(|e| match e {
                DirectoryError::NotFound => {
                    warn!("No directory entry for authenticated login {}", login);
                    ApiError::NotFound("User not found in directory".to_string())
                }
                other => internal("Directory lookup failed")(other),
            })?;

        let canonical = profile.login.clone();
        self.users
            .create(NewUser::provisioned(
                profile.login,
                profile.display_name,
                profile.email,
            ))
            .await
            .map_err(internal("Failed to provision user"))?;
        info!("Provisioned user {} on first login", canonical);

        self.users
            .find_by_login(&canonical)
            .await
            .map_err(internal("Failed to reload provisioned user"))?
            .ok_or_else(|| internal("Failed to reload provisioned user")("no record"))
    }

    async fn touch_last_login(&self, user_id: &str) {
        if let Err(e) = self.users.update_last_login(user_id).await {
            warn!("Failed to update last login for {}: {}", user_id, e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{credentials, directory, service};
    use super::*;
    use crate::handlers::auth::testing::{claims, settings};
    use crate::handlers::auth::JwtCodec;
    use crate::handlers::directory::fake::FakeDirectory;
    use crate::handlers::user_store::memory::InMemoryUserStore;
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    #[actix_web::test]
    async fn first_login_provisions_an_ordinary_active_user() {
        let users = Arc::new(InMemoryUserStore::default());
        let (service, tokens) = service(directory(), users.clone());

        let pair = service.login(&credentials("jdoe", "s3cret")).await.unwrap();

        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());
        let stored = users.users();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].login, "jdoe");
        assert_eq!(stored[0].name, "John Doe");
        assert_eq!(stored[0].email, "jdoe@corp.local");
        assert_eq!(stored[0].permission, "USR");
        assert!(stored[0].status);
        assert!(stored[0].last_login.is_some());

        let claims = tokens.parse_access(&pair.access_token).unwrap();
        assert_eq!(claims.id, stored[0].id);
        assert_eq!(claims.permission, "USR");
    }

    #[actix_web::test]
    async fn known_user_is_not_provisioned_again() {
        let users = Arc::new(InMemoryUserStore::default().with_user("jdoe", "ADM"));
        let (service, tokens) = service(directory(), users.clone());

        let pair = service.login(&credentials("jdoe", "s3cret")).await.unwrap();

        assert_eq!(users.users().len(), 1);
        let claims = tokens.parse_access(&pair.access_token).unwrap();
        assert_eq!(claims.permission, "ADM");
    }

    #[actix_web::test]
    async fn wrong_password_is_rejected_without_touching_the_store() {
        let users = Arc::new(InMemoryUserStore::default());
        let (service, _) = service(directory(), users.clone());

        let err = service.login(&credentials("jdoe", "guess")).await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized(_)));
        assert!(users.users().is_empty());
        assert_eq!(users.last_login_updates.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn rejection_is_identical_for_known_and_unknown_accounts() {
        let known = Arc::new(InMemoryUserStore::default().with_user("jdoe", "USR"));
        let (service_known, _) = service(directory(), known.clone());
        let (service_unknown, _) = service(directory(), Arc::new(InMemoryUserStore::default()));

        let a = service_known.login(&credentials("jdoe", "guess")).await.unwrap_err();
        let b = service_unknown.login(&credentials("ghost", "guess")).await.unwrap_err();

        assert_eq!(a.to_string(), b.to_string());
        assert!(known.users()[0].last_login.is_none());
    }

    #[actix_web::test]
    async fn empty_fields_are_a_bad_request() {
        let (service, _) = service(directory(), Arc::new(InMemoryUserStore::default()));

        let err = service.login(&credentials("  ", "")).await.unwrap_err();
        match err {
            ApiError::BadRequest { details, .. } => {
                assert_eq!(details, Some(json!({ "missing": ["login", "senha"] })));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[actix_web::test]
    async fn directory_outage_is_internal() {
        let users = Arc::new(InMemoryUserStore::default());
        let (service, _) = service(
            FakeDirectory {
                unreachable: true,
                ..Default::default()
            },
            users,
        );

        let err = service.login(&credentials("jdoe", "s3cret")).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[actix_web::test]
    async fn missing_directory_entry_is_not_found() {
        let dir = FakeDirectory::default()
            .with_account("cn=svc-helpdesk,dc=corp,dc=local", "service-password")
            .with_account("sAMAccountName=jdoe,dc=corp,dc=local", "s3cret");
        let users = Arc::new(InMemoryUserStore::default());
        let (service, _) = service(dir, users.clone());

        let err = service.login(&credentials("jdoe", "s3cret")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(users.users().is_empty());
    }

    #[actix_web::test]
    async fn failed_last_login_update_does_not_fail_login() {
        let users = Arc::new(InMemoryUserStore::default().with_user("jdoe", "USR"));
        users.fail_last_login.store(true, Ordering::SeqCst);
        let (service, _) = service(directory(), users);

        assert!(service.login(&credentials("jdoe", "s3cret")).await.is_ok());
    }

    #[actix_web::test]
    async fn inactive_user_cannot_log_in() {
        let users = Arc::new(InMemoryUserStore::default().with_user("jdoe", "USR"));
        users.set_status("jdoe", false);
        let (service, _) = service(directory(), users);

        let err = service.login(&credentials("jdoe", "s3cret")).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[actix_web::test]
    async fn refresh_issues_a_new_pair_for_the_same_identity() {
        let users = Arc::new(InMemoryUserStore::default());
        let (service, tokens) = service(directory(), users.clone());
        let first = service.login(&credentials("jdoe", "s3cret")).await.unwrap();

        let second = service
            .refresh(&RefreshRequest {
                refresh_token: first.refresh_token.clone(),
            })
            .await
            .unwrap();

        let before = tokens.parse_access(&first.access_token).unwrap();
        let after = tokens.parse_access(&second.access_token).unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.permission, before.permission);
        assert_ne!(after.jti, before.jti);
        assert!(tokens.parse_refresh(&second.refresh_token).is_ok());
        assert_eq!(users.last_login_updates.load(Ordering::SeqCst), 2);
    }

    #[actix_web::test]
    async fn expired_refresh_token_is_unauthorized() {
        let users = Arc::new(InMemoryUserStore::default().with_user("jdoe", "USR"));
        let (service, _) = service(directory(), users);
        let mut expired = settings();
        expired.refresh_ttl = Duration::hours(-1);
        let token = JwtCodec::new(&expired)
            .sign_refresh(&claims("1", "USR"))
            .unwrap();

        let err = service
            .refresh(&RefreshRequest { refresh_token: token })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[actix_web::test]
    async fn tampered_or_access_token_cannot_refresh() {
        let users = Arc::new(InMemoryUserStore::default());
        let (service, _) = service(directory(), users);
        let pair = service.login(&credentials("jdoe", "s3cret")).await.unwrap();

        let mut tampered = pair.refresh_token.clone();
        tampered.insert(tampered.find('.').unwrap() + 1, 'x');

        for token in [tampered, pair.access_token] {
            let err = service
                .refresh(&RefreshRequest { refresh_token: token })
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Unauthorized(_)));
        }
    }

    #[actix_web::test]
    async fn refresh_for_deleted_user_is_unauthorized() {
        let users = Arc::new(InMemoryUserStore::default());
        let (service, _) = service(directory(), users.clone());
        let pair = service.login(&credentials("jdoe", "s3cret")).await.unwrap();
        let id = users.users()[0].id.clone();
        users.remove(&id);

        let err = service
            .refresh(&RefreshRequest {
                refresh_token: pair.refresh_token,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[actix_web::test]
    async fn missing_refresh_token_is_a_bad_request() {
        let (service, _) = service(directory(), Arc::new(InMemoryUserStore::default()));
        let err = service.refresh(&RefreshRequest::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }
}
