use async_trait::async_trait;
use ldap3::{
    dn_escape, ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// LDAP result code for rejected credentials.
const INVALID_CREDENTIALS: u32 = 49;

#[derive(Debug, Error, PartialEq)]
pub enum DirectoryError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no directory entry for login")]
    NotFound,
    #[error("directory connection failed: {0}")]
    Connection(String),
    #[error("directory search failed: {0}")]
    Search(String),
    #[error("directory did not answer within {0:?}")]
    Timeout(Duration),
}

/// One entry returned by a directory search, attributes keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    fn first(&self, attr: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

/// Profile of a directory user, as needed for provisioning.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryProfile {
    pub display_name: String,
    pub email: String,
    pub login: String,
}

/// An open connection to the directory.
#[async_trait]
pub trait DirectorySession: Send {
    async fn bind(&mut self, principal: &str, password: &str) -> Result<(), DirectoryError>;
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;
    async fn close(&mut self) -> Result<(), DirectoryError>;
}

/// Opens fresh directory sessions. Sessions are never shared between requests.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub url: String,
    pub base_dn: String,
    pub bind_login: String,
    pub bind_password: String,
    /// When set, user logins bind as `login@domain` instead of a DN.
    pub domain: Option<String>,
    pub login_attribute: String,
    pub name_attribute: String,
    pub email_attribute: String,
    pub starttls: bool,
    pub timeout: Duration,
}

/// ldap3-backed connector.
pub struct LdapConnector {
    url: String,
    settings: LdapConnSettings,
}

impl LdapConnector {
    pub fn new(settings: &DirectorySettings) -> Self {
        LdapConnector {
            url: settings.url.clone(),
            settings: LdapConnSettings::new()
                .set_conn_timeout(settings.timeout)
                .set_starttls(settings.starttls),
        }
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let (conn, ldap) = LdapConnAsync::with_settings(self.settings.clone(), &self.url)
            .await
            .map_err(|e| DirectoryError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("Directory connection terminated: {}", e);
            }
        });

        Ok(Box::new(LdapSession { ldap }))
    }
}

struct LdapSession {
    ldap: Ldap,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, principal: &str, password: &str) -> Result<(), DirectoryError> {
        match self
            .ldap
            .simple_bind(principal, password)
            .await
            .and_then(|result| result.success())
        {
            Ok(_) => Ok(()),
            Err(LdapError::LdapResult { result }) => {
                if result.rc != INVALID_CREDENTIALS {
                    debug!("Directory bind rejected with rc={}", result.rc);
                }
                Err(DirectoryError::InvalidCredentials)
            }
            Err(e) => Err(DirectoryError::Connection(e.to_string())),
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let (entries, _) = self
            .ldap
            .search(base_dn, Scope::Subtree, filter, attrs.to_vec())
            .await
            .and_then(|response| response.success())
            .map_err(|e| DirectoryError::Search(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                DirectoryEntry {
                    dn: entry.dn,
                    attrs: entry.attrs,
                }
            })
            .collect())
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| DirectoryError::Connection(e.to_string()))
    }
}

/// Verifies user credentials against the directory and looks up profiles
/// with the service account.
#[derive(Clone)]
pub struct DirectoryClient {
    connector: Arc<dyn DirectoryConnector>,
    settings: DirectorySettings,
}

impl DirectoryClient {
    pub fn new(connector: Arc<dyn DirectoryConnector>, settings: DirectorySettings) -> Self {
        DirectoryClient {
            connector,
            settings,
        }
    }

    /// Rewrites a user login into the principal the directory binds with.
    pub fn principal_for(&self, login: &str) -> String {
        let login = login.trim();
        match &self.settings.domain {
            Some(domain) => {
                let suffix = format!("@{}", domain);
                if login.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()) {
                    login.to_string()
                } else {
                    format!("{}{}", login, suffix)
                }
            }
            None => format!(
                "{}={},{}",
                self.settings.login_attribute,
                dn_escape(login),
                self.settings.base_dn
            ),
        }
    }

    /// The service account may be configured as a full DN or UPN.
    fn service_principal(&self) -> String {
        let login = &self.settings.bind_login;
        if login.contains('=') || login.contains('@') {
            login.clone()
        } else {
            self.principal_for(login)
        }
    }

    /// Authenticates `login`/`password` with a fresh connection.
    pub async fn bind(&self, login: &str, password: &str) -> Result<(), DirectoryError> {
        // An empty password would be an anonymous bind and succeed.
        if login.trim().is_empty() || password.is_empty() {
            return Err(DirectoryError::InvalidCredentials);
        }
        let principal = self.principal_for(login);

        self.within_timeout(async {
            let mut session = self.connector.connect().await?;
            let result = session.bind(&principal, password).await;
            release(session).await;
            result
        })
        .await
    }

    /// Finds the directory entry for `login` using the service account.
    pub async fn search_by_login(&self, login: &str) -> Result<DirectoryProfile, DirectoryError> {
        let login = login.trim();
        let settings = &self.settings;
        let principal = self.service_principal();
        let filter = format!("({}={})", settings.login_attribute, ldap_escape(login));
        let attrs = [
            settings.login_attribute.as_str(),
            settings.name_attribute.as_str(),
            settings.email_attribute.as_str(),
        ];

        let entries = self
            .within_timeout(async {
                let mut session = self.connector.connect().await?;
                let result = match session.bind(&principal, &settings.bind_password).await {
                    Ok(()) => session.search(&settings.base_dn, &filter, &attrs).await,
                    Err(DirectoryError::InvalidCredentials) => Err(DirectoryError::Connection(
                        "service account bind rejected".to_string(),
                    )),
                    Err(e) => Err(e),
                };
                release(session).await;
                result
            })
            .await?;

        let entry = entries.into_iter().next().ok_or(DirectoryError::NotFound)?;
        debug!("Resolved login {} to {}", login, entry.dn);
        Ok(DirectoryProfile {
            display_name: entry.first(&settings.name_attribute).unwrap_or_default().to_string(),
            email: entry.first(&settings.email_attribute).unwrap_or_default().to_string(),
            login: entry.first(&settings.login_attribute).unwrap_or(login).to_string(),
        })
    }

    async fn within_timeout<T>(
        &self,
        attempt: impl Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, DirectoryError> {
        let timeout = self.settings.timeout;
        tokio::time::timeout(timeout, attempt)
            .await
            .unwrap_or(Err(DirectoryError::Timeout(timeout)))
    }
}

async fn release(mut session: Box<dyn DirectorySession>) {
    if let Err(e) = session.close().await {
        warn!("Failed to release directory session: {}", e);
    }
}
