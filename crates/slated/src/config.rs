//! Configuration management for slated.
//!
//! Settings come from a TOML file (explicit path, `$SLATE_CONFIG`, or
//! /etc/slate/config.toml) with per-field defaults. Secrets and
//! deployment knobs are then overridden from the environment, which may
//! itself be seeded from a `.env` file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::gemini::retry::RetryPolicy;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/slate/config.toml";

/// Environment variable naming an alternate config file
pub const CONFIG_ENV: &str = "SLATE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// "production" hides error details from responses
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Canvas images arrive inline as base64, so this is generous
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    4000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            environment: default_environment(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Generative model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Hard per-attempt deadline
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,

    /// Cap on any single wait between attempts
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    45
}

fn default_jitter_max() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    10_000
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            api_base: default_api_base(),
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            jitter_max_ms: default_jitter_max(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl GeminiConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            jitter_max: Duration::from_millis(self.jitter_max_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Supabase,
    /// Process-local maps; data is lost on restart
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default)]
    pub supabase_url: String,

    #[serde(default)]
    pub service_role_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: i64,

    #[serde(default = "default_otp_ttl")]
    pub otp_ttl_minutes: i64,

    /// Login/register return a fixed identity without touching the store
    #[serde(default)]
    pub mock: bool,
}

fn default_token_ttl() -> i64 {
    12
}

fn default_otp_ttl() -> i64 {
    10
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl(),
            otp_ttl_minutes: default_otp_ttl(),
            mock: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_from")]
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from() -> String {
    "Slate <no-reply@slate.local>".to_string()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_from(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }

    /// Load config from file (or defaults), then apply environment overrides.
    ///
    /// An explicit path must load; the fallback locations are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_path(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Self::load_fallback(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_fallback() -> Self {
        let from_env = std::env::var(CONFIG_ENV).ok();
        let candidates = from_env
            .map(PathBuf::from)
            .into_iter()
            .chain(std::iter::once(PathBuf::from(CONFIG_PATH)));

        for path in candidates {
            match Self::load_from_path(&path) {
                Ok(config) => return config,
                Err(e) => warn!("Config {} not usable: {}", path.display(), e),
            }
        }

        warn!("No config file found, using defaults");
        Config::default()
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply environment-style overrides. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = get("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(e) => warn!("Invalid PORT value {}: {}", port, e),
            }
        }
        if let Some(env) = get("SLATE_ENV") {
            self.server.environment = env;
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.gemini.api_key = key;
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.gemini.model = model;
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.store.supabase_url = url;
        }
        if let Some(key) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.store.service_role_key = key;
        }
        if let Some(secret) = get("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(mock) = get("MOCK_AUTH") {
            self.auth.mock = mock.eq_ignore_ascii_case("true");
        }
        if let Some(host) = get("SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Some(port) = get("SMTP_PORT") {
            match port.parse() {
                Ok(p) => self.smtp.port = p,
                Err(e) => warn!("Invalid SMTP_PORT value {}: {}", port, e),
            }
        }
        if let Some(user) = get("SMTP_USER") {
            self.smtp.username = user;
        }
        if let Some(pass) = get("SMTP_PASS") {
            self.smtp.password = pass;
        }
        if let Some(from) = get("SMTP_FROM") {
            self.smtp.from = from;
        }
    }

    /// Refuse to start with missing credentials
    pub fn validate(&self) -> Result<()> {
        if self.gemini.api_key.is_empty() {
            bail!("GEMINI_API_KEY is not configured");
        }
        if self.auth.jwt_secret.is_empty() {
            bail!("JWT_SECRET is not configured");
        }
        if self.store.backend == StoreBackend::Supabase
            && (self.store.supabase_url.is_empty() || self.store.service_role_key.is_empty())
        {
            bail!("Supabase credentials are not configured");
        }
        Ok(())
    }
}
