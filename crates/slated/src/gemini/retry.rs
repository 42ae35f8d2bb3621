//! Bounded retry with class-dependent backoff for model calls.
//!
//! Each attempt is raced against a per-attempt timeout. Failures are
//! classified (rate limit, timeout, other) and the wait before the next
//! attempt depends on the class. No wait follows the final attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use super::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub jitter_max: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(45),
            jitter_max: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Failure classification driving the backoff curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited,
    Timeout,
    Other,
}

impl ErrorClass {
    pub fn of(err: &ModelError) -> Self {
        match err {
            ModelError::Timeout(_) => Self::Timeout,
            ModelError::Http { status: 429, .. } => Self::RateLimited,
            other => Self::from_message(&other.to_string()),
        }
    }

    fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("quota") || lower.contains("429") {
            Self::RateLimited
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RetryPolicy {
    /// Backoff before jitter, after the given 1-based attempt failed.
    ///
    /// Rate limits: 2s doubling. Timeouts: 500ms linear. Other: 1s doubling.
    pub fn base_delay(&self, class: ErrorClass, attempt: u32) -> Duration {
        let n = attempt.max(1);
        let doubling = 2u64.saturating_pow(n - 1);
        let ms = match class {
            ErrorClass::RateLimited => 2000u64.saturating_mul(doubling),
            ErrorClass::Timeout => 500u64.saturating_mul(n as u64),
            ErrorClass::Other => 1000u64.saturating_mul(doubling),
        };
        Duration::from_millis(ms)
    }

    /// Base delay plus uniform jitter, capped at `max_delay`
    pub fn delay_for(&self, class: ErrorClass, attempt: u32) -> Duration {
        let jitter_ms = self.jitter_max.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        (self.base_delay(class, attempt) + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

/// All attempts failed; carries the last error and its class
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed after {attempts} attempts: {last}")]
pub struct RetryError {
    pub operation: String,
    pub attempts: u32,
    pub class: ErrorClass,
    #[source]
    pub last: ModelError,
}

/// Run `call` up to `policy.max_attempts` times.
///
/// The closure is invoked once per attempt; each returned future is raced
/// against `policy.attempt_timeout`. A timed-out attempt is abandoned, not
/// awaited.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last = ModelError::Transport("no attempt made".to_string());
    let mut last_class = ErrorClass::Other;

    for attempt in 1..=max_attempts {
        debug!("{}: attempt {}/{}", operation, attempt, max_attempts);

        let outcome = match tokio::time::timeout(policy.attempt_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(policy.attempt_timeout.as_secs())),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!("{}: succeeded on attempt {}/{}", operation, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) => {
                let class = ErrorClass::of(&e);
                warn!(
                    "{}: attempt {}/{} failed ({}): {}",
                    operation, attempt, max_attempts, class, e
                );

                if attempt < max_attempts {
                    let delay = policy.delay_for(class, attempt);
                    info!("{}: waiting {}ms before retry", operation, delay.as_millis());
                    tokio::time::sleep(delay).await;
                }

                last = e;
                last_class = class;
            }
        }
    }

    error!("{}: all {} attempts failed", operation, max_attempts);
    Err(RetryError {
        operation: operation.to_string(),
        attempts: max_attempts,
        class: last_class,
        last,
    })
}
