//! Sessions: password login, one-time codes and bearer tokens.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use slate_shared::{UserProfile, VerificationCode};
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::mailer::{MailError, Mailer};
use crate::store::{Store, StoreError};

pub const MOCK_USER_ID: &str = "mock-user";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account already exists")]
    AccountExists,

    #[error("{0}")]
    Validation(String),

    #[error("No user found")]
    NoUser,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Failed to sign token: {0}")]
    Signing(String),

    #[error("Failed to hash password: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, id: &str, email: &str) -> Result<String, AuthError> {
        self.issue_at(id, email, Utc::now())
    }

    pub fn issue_at(&self, id: &str, email: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            id: id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| AuthError::Signing(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// False for a wrong password and for an unreadable hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Trimmed, lower-cased email, or a validation error
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required.".to_string()));
    }
    if !EMAIL_RE.is_match(&email) {
        return Err(AuthError::Validation("A valid email address is required.".to_string()));
    }
    Ok(email)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registered {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSent {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenIssuer,
    code_ttl: Duration,
    mock: bool,
}

impl AuthService {
    pub fn new(config: &AuthConfig, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        if config.mock {
            warn!("Mock auth enabled: login and register bypass the store");
        }
        Self {
            store,
            mailer,
            tokens: TokenIssuer::new(&config.jwt_secret, config.token_ttl_hours),
            code_ttl: Duration::minutes(config.otp_ttl_minutes),
            mock: config.mock,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    fn session(&self, id: &str, email: &str, display_name: Option<String>) -> Result<Session, AuthError> {
        Ok(Session {
            token: self.tokens.issue(id, email)?,
            user: SessionUser {
                id: id.to_string(),
                email: email.to_string(),
                display_name,
            },
        })
    }

    fn require_password(password: &str) -> Result<(), AuthError> {
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required.".to_string()));
        }
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        Self::require_password(password)?;
        if self.mock {
            return self.session(MOCK_USER_ID, &email, None);
        }

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let hash = user.password_hash.as_deref().ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, hash) {
            return Err(AuthError::InvalidCredentials);
        }

        info!("User {} logged in", user.id);
        self.session(&user.id, &user.email, user.display_name)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<Registered, AuthError> {
        let email = normalize_email(email)?;
        Self::require_password(password)?;
        if self.mock {
            return Ok(Registered {
                id: MOCK_USER_ID.to_string(),
                email,
            });
        }

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::AccountExists);
        }

        let hash = hash_password(password)?;
        let user = self.store.insert_user(&email, &hash).await?;
        info!("Registered user {}", user.id);
        Ok(Registered {
            id: user.id,
            email: user.email,
        })
    }

    /// Issue a six-digit code and mail it
    pub async fn send_code(&self, email: &str, should_create_user: bool) -> Result<CodeSent, AuthError> {
        let email = normalize_email(email)?;
        let now = Utc::now();
        self.store.purge_expired_codes(now).await?;

        if !should_create_user && self.store.find_auth_user(&email).await?.is_none() {
            return Err(AuthError::NoUser);
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let record = VerificationCode {
            email: email.clone(),
            code: code.clone(),
            expires_at: now + self.code_ttl,
            created_at: now,
        };
        self.store.upsert_code(&record).await?;
        self.mailer
            .send_code(&email, &code, self.code_ttl.num_minutes())
            .await?;

        info!("Sign-in code issued for {}", email);
        Ok(CodeSent {
            email,
            expires_at: record.expires_at,
        })
    }

    /// Redeem a code: find or create the auth user, refresh the profile
    /// row, and start a session
    pub async fn verify_code(
        &self,
        email: &str,
        code: &str,
        display_name: Option<&str>,
    ) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::Validation("Verification code is required.".to_string()));
        }
        let display_name = display_name.map(str::trim).filter(|n| !n.is_empty());

        let now = Utc::now();
        let stored = self.store.get_code(&email).await?;
        match stored {
            Some(record) if record.code == code && !record.is_expired(now) => {}
            _ => return Err(AuthError::InvalidCode),
        }
        self.store.delete_code(&email).await?;

        let mut user = match self.store.find_auth_user(&email).await? {
            Some(user) => user,
            None => {
                info!("Creating auth user for {}", email);
                self.store.create_auth_user(&email, display_name).await?
            }
        };
        if let Some(name) = display_name {
            if user.display_name() != Some(name) {
                user = self.store.update_auth_user(&user.id, name).await?;
            }
        }

        let name = display_name
            .map(str::to_string)
            .or_else(|| user.display_name().map(str::to_string));
        self.store
            .upsert_profile(&UserProfile {
                id: user.id.clone(),
                email: email.clone(),
                display_name: name.clone(),
                last_active_at: Some(now),
            })
            .await?;

        self.session(&user.id, &email, name)
    }

    /// Profile behind a verified token
    pub async fn profile(&self, claims: &Claims) -> Result<UserProfile, AuthError> {
        if self.mock && claims.id == MOCK_USER_ID {
            return Ok(UserProfile {
                id: claims.id.clone(),
                email: claims.email.clone(),
                display_name: None,
                last_active_at: None,
            });
        }
        Ok(self.store.get_profile(&claims.id).await?)
    }
}
