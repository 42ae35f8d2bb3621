//! In-process store for local development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slate_shared::{
    HistoryEntry, HistoryPage, HistoryQuery, HistoryUpdate, NewHistoryEntry, NewPracticeAttempt,
    PracticeAttempt, UserProfile, VerificationCode,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuthUser, Store, StoreError, UserRecord};

#[derive(Default)]
struct Tables {
    attempts: Vec<PracticeAttempt>,
    /// Insertion order; listing sorts newest first
    history: Vec<HistoryEntry>,
    users: Vec<UserRecord>,
    codes: HashMap<String, VerificationCode>,
    auth_users: Vec<AuthUser>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_attempt(&self, attempt: NewPracticeAttempt) -> Result<PracticeAttempt, StoreError> {
        let row = PracticeAttempt {
            id: new_id(),
            user_id: attempt.user_id,
            question: attempt.question,
            canvas: attempt.canvas,
            created_at: attempt.created_at,
        };
        self.tables.write().await.attempts.push(row.clone());
        Ok(row)
    }

    async fn save_history(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        let row = HistoryEntry {
            id: new_id(),
            user_id: entry.user_id,
            question_data: entry.question_data,
            canvas_data: entry.canvas_data,
            status: entry.status,
            subject: entry.subject,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.tables.write().await.history.push(row.clone());
        Ok(row)
    }

    async fn update_history(&self, id: &str, update: &HistoryUpdate) -> Result<HistoryEntry, StoreError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .history
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound("History item".to_string()))?;
        update.apply_to(entry, Utc::now());
        Ok(entry.clone())
    }

    async fn list_history(&self, query: &HistoryQuery) -> Result<HistoryPage, StoreError> {
        let tables = self.tables.read().await;
        let status = query.status_filter();
        let subject = query.subject_filter();

        // reverse first so equal timestamps keep newest-inserted first
        let mut matching: Vec<&HistoryEntry> = tables
            .history
            .iter()
            .rev()
            .filter(|e| e.user_id == query.user_id)
            .filter(|e| status.is_none() || e.status.as_deref() == status.as_deref())
            .filter(|e| subject.is_none() || e.subject.as_deref() == subject)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let entries = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(HistoryPage { entries, total })
    }

    async fn get_history(&self, id: &str) -> Result<HistoryEntry, StoreError> {
        self.tables
            .read()
            .await
            .history
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("History item".to_string()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Backend(
                "duplicate key value violates unique constraint \"users_email_key\"".to_string(),
            ));
        }
        let row = UserRecord {
            id: new_id(),
            email: email.to_string(),
            password_hash: Some(password_hash.to_string()),
            display_name: None,
            last_active_at: None,
        };
        tables.users.push(row.clone());
        Ok(row)
    }

    async fn get_profile(&self, id: &str) -> Result<UserProfile, StoreError> {
        self.tables
            .read()
            .await
            .users
            .iter()
            .find(|u| u.id == id)
            .map(UserRecord::profile)
            .ok_or_else(|| StoreError::NotFound("User".to_string()))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.id != profile.id && u.email == profile.email)
        {
            return Err(StoreError::Backend(
                "duplicate key value violates unique constraint \"users_email_key\"".to_string(),
            ));
        }
        match tables.users.iter_mut().find(|u| u.id == profile.id) {
            Some(user) => {
                user.email = profile.email.clone();
                user.display_name = profile.display_name.clone();
                user.last_active_at = profile.last_active_at;
            }
            None => tables.users.push(UserRecord {
                id: profile.id.clone(),
                email: profile.email.clone(),
                password_hash: None,
                display_name: profile.display_name.clone(),
                last_active_at: profile.last_active_at,
            }),
        }
        Ok(())
    }

    async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.tables.write().await.codes.retain(|_, c| c.expires_at >= now);
        Ok(())
    }

    async fn upsert_code(&self, code: &VerificationCode) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .codes
            .insert(code.email.clone(), code.clone());
        Ok(())
    }

    async fn get_code(&self, email: &str) -> Result<Option<VerificationCode>, StoreError> {
        Ok(self.tables.read().await.codes.get(email).cloned())
    }

    async fn delete_code(&self, email: &str) -> Result<(), StoreError> {
        self.tables.write().await.codes.remove(email);
        Ok(())
    }

    async fn list_auth_users(&self) -> Result<Vec<AuthUser>, StoreError> {
        Ok(self.tables.read().await.auth_users.clone())
    }

    async fn create_auth_user(&self, email: &str, display_name: Option<&str>) -> Result<AuthUser, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.auth_users.iter().any(|u| u.has_email(email)) {
            return Err(StoreError::Backend(
                "A user with this email address has already been registered".to_string(),
            ));
        }
        let user = AuthUser {
            id: new_id(),
            email: Some(email.to_string()),
            user_metadata: serde_json::json!({ "display_name": display_name.unwrap_or_default() }),
            email_confirmed_at: Some(Utc::now()),
        };
        tables.auth_users.push(user.clone());
        Ok(user)
    }

    async fn update_auth_user(&self, id: &str, display_name: &str) -> Result<AuthUser, StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .auth_users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?;
        user.user_metadata = serde_json::json!({ "display_name": display_name });
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entry(user: &str, status: &str, subject: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            user_id: user.to_string(),
            question_data: json!({ "text": "q" }),
            canvas_data: json!({ "strokes": [] }),
            status: Some(status.to_string()),
            subject: Some(subject.to_string()),
        }
    }

    #[tokio::test]
    async fn test_history_pagination_newest_first() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(store.save_history(entry("u1", "solved", "Maths")).await.unwrap().id);
        }
        store.save_history(entry("u2", "solved", "Maths")).await.unwrap();

        let mut query = HistoryQuery::new("u1");
        query.limit = 2;
        query.page = 2;
        let page = store.list_history(&query).await.unwrap();

        assert_eq!(page.total, 5);
        let got: Vec<_> = page.entries.iter().map(|e| e.id.clone()).collect();
        assert_eq!(got, vec![ids[2].clone(), ids[1].clone()]);
    }

    #[tokio::test]
    async fn test_history_filters() {
        let store = MemoryStore::new();
        store.save_history(entry("u1", "solved", "Maths")).await.unwrap();
        store.save_history(entry("u1", "in-progress", "Maths")).await.unwrap();
        store.save_history(entry("u1", "solved", "Physics")).await.unwrap();

        let mut query = HistoryQuery::new("u1");
        query.status = Some("SOLVED".to_string());
        assert_eq!(store.list_history(&query).await.unwrap().total, 2);

        query.subject = Some("Physics".to_string());
        assert_eq!(store.list_history(&query).await.unwrap().total, 1);

        query.status = Some("all".to_string());
        query.subject = None;
        assert_eq!(store.list_history(&query).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_update_missing_history() {
        let store = MemoryStore::new();
        let err = store
            .update_history("nope", &HistoryUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_codes_upsert_and_purge() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let code = |c: &str, expires| VerificationCode {
            email: "a@b.c".to_string(),
            code: c.to_string(),
            expires_at: expires,
            created_at: now,
        };

        store.upsert_code(&code("111111", now - Duration::minutes(1))).await.unwrap();
        store.upsert_code(&code("222222", now + Duration::minutes(10))).await.unwrap();
        assert_eq!(store.get_code("a@b.c").await.unwrap().unwrap().code, "222222");

        store.purge_expired_codes(now).await.unwrap();
        assert!(store.get_code("a@b.c").await.unwrap().is_some());

        store.upsert_code(&code("333333", now - Duration::minutes(1))).await.unwrap();
        store.purge_expired_codes(now).await.unwrap();
        assert!(store.get_code("a@b.c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_upsert_rejects_taken_email() {
        let store = MemoryStore::new();
        let existing = store.insert_user("a@b.c", "hash").await.unwrap();

        let other = UserProfile {
            id: "otp-user".to_string(),
            email: "a@b.c".to_string(),
            display_name: Some("Ada".to_string()),
            last_active_at: None,
        };
        assert!(matches!(store.upsert_profile(&other).await, Err(StoreError::Backend(_))));
        assert!(store.get_profile("otp-user").await.is_err());

        // the owner of the email can still update its own row
        let own = UserProfile {
            id: existing.id.clone(),
            ..other
        };
        store.upsert_profile(&own).await.unwrap();
        assert_eq!(store.get_profile(&existing.id).await.unwrap().display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_profile_upsert_creates_then_updates() {
        let store = MemoryStore::new();
        let mut profile = UserProfile {
            id: "u-1".to_string(),
            email: "a@b.c".to_string(),
            display_name: None,
            last_active_at: None,
        };
        store.upsert_profile(&profile).await.unwrap();
        profile.display_name = Some("Ada".to_string());
        store.upsert_profile(&profile).await.unwrap();

        assert_eq!(store.get_profile("u-1").await.unwrap(), profile);
    }
}
