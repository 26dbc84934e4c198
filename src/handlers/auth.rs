use crate::models::all_models::User;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Structure representing JWT claims.
///
/// The identity fields are supplied by the caller; the registered fields
/// (`iss`, `sub`, `iat`, `nbf`, `exp`, `jti`) are stamped by the codec on
/// every signature and overwritten if already set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Claims {
    pub id: String,
    pub login: String,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(rename = "permissao")]
    pub permission: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub nbf: i64,
    #[serde(default)]
    pub jti: String,
}

impl Claims {
    pub fn for_user(user: &User) -> Self {
        Claims {
            id: user.id.clone(),
            login: user.login.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            permission: user.permission.clone(),
            ..Default::default()
        }
    }
}

/// Access and refresh tokens issued together at login and refresh.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            // A header naming another algorithm is treated like a forged signature.
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::InvalidSignature
            }
            _ => TokenError::Malformed(e.to_string()),
        }
    }
}

/// Signs and verifies session tokens. Access and refresh tokens are
/// independent trust domains sharing one claims schema.
pub trait TokenCodec: Send + Sync {
    fn sign_access(&self, claims: &Claims) -> Result<String, TokenError>;
    fn sign_refresh(&self, claims: &Claims) -> Result<String, TokenError>;
    fn parse_access(&self, token: &str) -> Result<Claims, TokenError>;
    fn parse_refresh(&self, token: &str) -> Result<Claims, TokenError>;

    fn issue_pair(&self, claims: &Claims) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.sign_access(claims)?,
            refresh_token: self.sign_refresh(claims)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

struct TokenClass {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenClass {
    fn new(secret: &str, ttl: Duration) -> Self {
        TokenClass {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// HS256 implementation of [`TokenCodec`].
pub struct JwtCodec {
    access: TokenClass,
    refresh: TokenClass,
    issuer: String,
    validation: Validation,
}

impl JwtCodec {
    const ALGORITHM: Algorithm = Algorithm::HS256;

    pub fn new(settings: &TokenSettings) -> Self {
        let mut validation = Validation::new(Self::ALGORITHM);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "sub", "iss"]);

        JwtCodec {
            access: TokenClass::new(&settings.access_secret, settings.access_ttl),
            refresh: TokenClass::new(&settings.refresh_secret, settings.refresh_ttl),
            issuer: settings.issuer.clone(),
            validation,
        }
    }

    fn sign(&self, class: &TokenClass, claims: &Claims) -> Result<String, TokenError> {
        let issued_at = Utc::now().timestamp();
        let stamped = Claims {
            iss: self.issuer.clone(),
            sub: claims.id.clone(),
            iat: issued_at,
            nbf: issued_at,
            exp: issued_at + class.ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
            ..claims.clone()
        };

        encode(&Header::new(Self::ALGORITHM), &stamped, &class.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn parse(&self, class: &TokenClass, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &class.decoding, &self.validation)?;
        Ok(token_data.claims)
    }
}

impl TokenCodec for JwtCodec {
    fn sign_access(&self, claims: &Claims) -> Result<String, TokenError> {
        self.sign(&self.access, claims)
    }

    fn sign_refresh(&self, claims: &Claims) -> Result<String, TokenError> {
        self.sign(&self.refresh, claims)
    }

    fn parse_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.parse(&self.access, token)
    }

    fn parse_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.parse(&self.refresh, token)
    }
}
