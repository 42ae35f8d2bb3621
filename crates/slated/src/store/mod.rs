//! Persistence adapter.
//!
//! [`Store`] covers everything the daemon keeps: practice attempts,
//! history, user rows, verification codes and hosted auth users. Errors
//! from the backend are passed through verbatim; nothing here retries.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slate_shared::{
    HistoryEntry, HistoryPage, HistoryQuery, HistoryUpdate, NewHistoryEntry, NewPracticeAttempt,
    PracticeAttempt, UserProfile, VerificationCode,
};

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Message reported by the backend, surfaced as-is
    #[error("{0}")]
    Backend(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Store request failed: {0}")]
    Transport(String),

    #[error("Unexpected store response: {0}")]
    Decode(String),
}

/// Row of the `users` table. OTP-only users have no password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            last_active_at: self.last_active_at,
        }
    }
}

/// Hosted auth (GoTrue) user, as returned by the admin API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
}

impl AuthUser {
    pub fn display_name(&self) -> Option<&str> {
        self.user_metadata
            .get("display_name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn has_email(&self, email: &str) -> bool {
        self.email
            .as_deref()
            .map(|e| e.eq_ignore_ascii_case(email))
            .unwrap_or(false)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // Practice and history
    async fn create_attempt(&self, attempt: NewPracticeAttempt) -> Result<PracticeAttempt, StoreError>;
    async fn save_history(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError>;
    async fn update_history(&self, id: &str, update: &HistoryUpdate) -> Result<HistoryEntry, StoreError>;
    async fn list_history(&self, query: &HistoryQuery) -> Result<HistoryPage, StoreError>;
    async fn get_history(&self, id: &str) -> Result<HistoryEntry, StoreError>;

    // Users
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<UserRecord, StoreError>;
    async fn get_profile(&self, id: &str) -> Result<UserProfile, StoreError>;
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    // Verification codes, one per email
    async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<(), StoreError>;
    async fn upsert_code(&self, code: &VerificationCode) -> Result<(), StoreError>;
    async fn get_code(&self, email: &str) -> Result<Option<VerificationCode>, StoreError>;
    async fn delete_code(&self, email: &str) -> Result<(), StoreError>;

    // Hosted auth users
    async fn list_auth_users(&self) -> Result<Vec<AuthUser>, StoreError>;
    async fn create_auth_user(&self, email: &str, display_name: Option<&str>) -> Result<AuthUser, StoreError>;
    async fn update_auth_user(&self, id: &str, display_name: &str) -> Result<AuthUser, StoreError>;

    async fn find_auth_user(&self, email: &str) -> Result<Option<AuthUser>, StoreError> {
        Ok(self
            .list_auth_users()
            .await?
            .into_iter()
            .find(|u| u.has_email(email)))
    }
}
