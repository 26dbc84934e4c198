use crate::handlers::auth::TokenSettings;
use crate::handlers::directory::DirectorySettings;
use anyhow::{anyhow, bail, Context};
use dotenvy::dotenv;
use shuttle_runtime::SecretStore;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_DIRECTORY_TIMEOUT_SECS: u64 = 5;

/// Everything the server reads at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub tokens: TokenSettings,
    pub directory: DirectorySettings,
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> anyhow::Result<String> {
        self.optional(key)
            .ok_or_else(|| anyhow!("{} must be set", key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{} has an invalid value", key)),
            None => Ok(default),
        }
    }
}

impl AppConfig {
    /// Reads the Shuttle secret store, falling back to the process
    /// environment (and a local `.env`).
    pub fn from_secrets(secrets: &SecretStore) -> anyhow::Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| secrets.get(key).or_else(|| env::var(key).ok()))
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> anyhow::Result<Self> {
        let vars = Lookup(lookup);

        let access_secret = vars.required("JWT_ACCESS_SECRET")?;
        let refresh_secret = vars.required("JWT_REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }
        let access_ttl = vars.parsed("JWT_ACCESS_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?;
        let refresh_ttl = vars.parsed("JWT_REFRESH_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?;
        if access_ttl <= 0 || refresh_ttl <= 0 {
            bail!("token TTLs must be positive");
        }

        let timeout = vars.parsed("LDAP_TIMEOUT_SECS", DEFAULT_DIRECTORY_TIMEOUT_SECS)?;
        if timeout == 0 {
            bail!("LDAP_TIMEOUT_SECS must be positive");
        }

        Ok(AppConfig {
            database_url: vars.required("DATABASE_URL")?,
            tokens: TokenSettings {
                access_secret,
                refresh_secret,
                access_ttl: chrono::Duration::seconds(access_ttl),
                refresh_ttl: chrono::Duration::seconds(refresh_ttl),
                issuer: vars.or("JWT_ISSUER", "helpdesk"),
            },
            directory: DirectorySettings {
                url: vars.required("LDAP_URL")?,
                base_dn: vars.required("LDAP_BASE_DN")?,
                bind_login: vars.required("LDAP_BIND_LOGIN")?,
                bind_password: vars.required("LDAP_BIND_PASSWORD")?,
                domain: vars.optional("LDAP_DOMAIN"),
                login_attribute: vars.or("LDAP_LOGIN_ATTRIBUTE", "sAMAccountName"),
                name_attribute: vars.or("LDAP_NAME_ATTRIBUTE", "displayName"),
                email_attribute: vars.or("LDAP_EMAIL_ATTRIBUTE", "mail"),
                starttls: vars.parsed("LDAP_STARTTLS", false)?,
                timeout: Duration::from_secs(timeout),
            },
        })
    }
}
