//! Supabase backend: PostgREST tables plus the GoTrue admin API.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, CONTENT_RANGE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use slate_shared::{
    HistoryEntry, HistoryPage, HistoryQuery, HistoryUpdate, NewHistoryEntry, NewPracticeAttempt,
    PracticeAttempt, UserProfile, VerificationCode,
};
use std::time::Duration;
use tracing::debug;

use super::{AuthUser, Store, StoreError, UserRecord};
use crate::config::StoreConfig;

const ATTEMPTS: &str = "practice_attempts";
const HISTORY: &str = "history";
const USERS: &str = "users";
const CODES: &str = "verification_codes";

pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    key: String,
}

/// Total row count from a `Content-Range: 0-29/57` header
pub fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Human message from a PostgREST or GoTrue error body
fn backend_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body.trim()))
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl SupabaseStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            key: config.service_role_key.clone(),
        })
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        self.authed(method, url)
    }

    fn admin(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/auth/v1/admin/users{}", self.base_url, path);
        self.authed(method, url)
    }

    fn authed(&self, method: Method, url: String) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    /// Send and fail on non-2xx with the backend's message
    async fn send(request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Backend(backend_message(status, &body)))
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, StoreError> {
        Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// `return=representation` writes answer with an array of rows
    async fn single<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> Result<T, StoreError> {
        let rows: Vec<T> = Self::json(request.header("Prefer", "return=representation")).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(what.to_string()))
    }

    async fn maybe_one<T: DeserializeOwned>(request: RequestBuilder) -> Result<Option<T>, StoreError> {
        let rows: Vec<T> = Self::json(request.query(&[("limit", "1")])).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl Store for SupabaseStore {
    async fn create_attempt(&self, attempt: NewPracticeAttempt) -> Result<PracticeAttempt, StoreError> {
        Self::single(self.table(Method::POST, ATTEMPTS).json(&attempt), "Practice attempt").await
    }

    async fn save_history(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        Self::single(self.table(Method::POST, HISTORY).json(&entry), "History item").await
    }

    async fn update_history(&self, id: &str, update: &HistoryUpdate) -> Result<HistoryEntry, StoreError> {
        let columns = update.to_columns(Utc::now());
        let request = self
            .table(Method::PATCH, HISTORY)
            .query(&[("id", format!("eq.{}", id))])
            .json(&columns);
        Self::single(request, "History item").await
    }

    async fn list_history(&self, query: &HistoryQuery) -> Result<HistoryPage, StoreError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", query.user_id)),
            ("order", "created_at.desc".to_string()),
            ("offset", query.offset().to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(status) = query.status_filter() {
            params.push(("status", format!("eq.{}", status)));
        }
        if let Some(subject) = query.subject_filter() {
            params.push(("subject", format!("eq.{}", subject)));
        }

        let response = Self::send(
            self.table(Method::GET, HISTORY)
                .query(&params)
                .header("Prefer", "count=exact"),
        )
        .await?;

        let total = content_range_total(response.headers());
        let entries: Vec<HistoryEntry> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let total = total.unwrap_or(query.offset() + entries.len() as u64);

        Ok(HistoryPage { entries, total })
    }

    async fn get_history(&self, id: &str) -> Result<HistoryEntry, StoreError> {
        let request = self
            .table(Method::GET, HISTORY)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]);
        Self::maybe_one(request)
            .await?
            .ok_or_else(|| StoreError::NotFound("History item".to_string()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let request = self
            .table(Method::GET, USERS)
            .query(&[("select", "*".to_string()), ("email", format!("eq.{}", email))]);
        Self::maybe_one(request).await
    }

    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<UserRecord, StoreError> {
        let body = json!({ "email": email, "password_hash": password_hash });
        Self::single(self.table(Method::POST, USERS).json(&body), "User").await
    }

    async fn get_profile(&self, id: &str) -> Result<UserProfile, StoreError> {
        let request = self.table(Method::GET, USERS).query(&[
            ("select", "id,email,display_name,last_active_at".to_string()),
            ("id", format!("eq.{}", id)),
        ]);
        Self::maybe_one(request)
            .await?
            .ok_or_else(|| StoreError::NotFound("User".to_string()))
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let request = self
            .table(Method::POST, USERS)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(profile);
        Self::send(request).await.map(|_| ())
    }

    async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let request = self
            .table(Method::DELETE, CODES)
            .query(&[("expires_at", format!("lt.{}", timestamp(now)))]);
        Self::send(request).await.map(|_| ())
    }

    async fn upsert_code(&self, code: &VerificationCode) -> Result<(), StoreError> {
        let request = self
            .table(Method::POST, CODES)
            .query(&[("on_conflict", "email")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(code);
        Self::send(request).await.map(|_| ())
    }

    async fn get_code(&self, email: &str) -> Result<Option<VerificationCode>, StoreError> {
        let request = self
            .table(Method::GET, CODES)
            .query(&[("select", "*".to_string()), ("email", format!("eq.{}", email))]);
        Self::maybe_one(request).await
    }

    async fn delete_code(&self, email: &str) -> Result<(), StoreError> {
        let request = self
            .table(Method::DELETE, CODES)
            .query(&[("email", format!("eq.{}", email))]);
        Self::send(request).await.map(|_| ())
    }

    async fn list_auth_users(&self) -> Result<Vec<AuthUser>, StoreError> {
        #[derive(serde::Deserialize)]
        struct Listing {
            #[serde(default)]
            users: Vec<AuthUser>,
        }

        let request = self
            .admin(Method::GET, "")
            .query(&[("page", "1"), ("per_page", "1000")]);
        let listing: Listing = Self::json(request).await?;
        Ok(listing.users)
    }

    async fn create_auth_user(&self, email: &str, display_name: Option<&str>) -> Result<AuthUser, StoreError> {
        let body = json!({
            "email": email,
            "email_confirm": true,
            "user_metadata": { "display_name": display_name.unwrap_or_default() },
        });
        Self::json(self.admin(Method::POST, "").json(&body)).await
    }

    async fn update_auth_user(&self, id: &str, display_name: &str) -> Result<AuthUser, StoreError> {
        let body = json!({ "user_metadata": { "display_name": display_name } });
        Self::json(self.admin(Method::PUT, &format!("/{}", id)).json(&body)).await
    }
}
