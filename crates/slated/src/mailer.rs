//! Outbound email for one-time codes.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid email address {0}")]
    Address(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Smtp(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_code(&self, to: &str, code: &str, ttl_minutes: i64) -> Result<(), MailError>;
}

pub const CODE_SUBJECT: &str = "Your Slate sign-in code";

pub fn code_body(code: &str, ttl_minutes: i64) -> String {
    format!(
        "Your sign-in code is {code}\n\nIt expires in {ttl_minutes} minutes. \
         If you did not ask for this code you can ignore this email.\n"
    )
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::Address(config.from.clone()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| MailError::Smtp(e.to_string()))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
        }

        info!("SMTP relay {}:{}", config.host, config.port);
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_code(&self, to: &str, code: &str, ttl_minutes: i64) -> Result<(), MailError> {
        let to_box: Mailbox = to.parse().map_err(|_| MailError::Address(to.to_string()))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to_box)
            .subject(CODE_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(code_body(code, ttl_minutes))
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        info!("Sent sign-in code to {}", to);
        Ok(())
    }
}

/// Development mailer: logs the code instead of sending it
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(&self, to: &str, code: &str, ttl_minutes: i64) -> Result<(), MailError> {
        warn!("SMTP not configured; code for {} is {} (valid {} min)", to, code, ttl_minutes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_body() {
        let body = code_body("123456", 10);
        assert!(body.contains("123456"));
        assert!(body.contains("10 minutes"));
    }

    #[tokio::test]
    async fn test_smtp_mailer_rejects_bad_from() {
        let config = SmtpConfig {
            host: "smtp.example.test".to_string(),
            from: "not an address".to_string(),
            ..Default::default()
        };
        assert!(matches!(SmtpMailer::new(&config), Err(MailError::Address(_))));
    }

    #[tokio::test]
    async fn test_smtp_mailer_rejects_bad_recipient() {
        let config = SmtpConfig {
            host: "smtp.example.test".to_string(),
            ..Default::default()
        };
        let mailer = SmtpMailer::new(&config).unwrap();
        let err = mailer.send_code("nobody", "123456", 10).await.unwrap_err();
        assert!(matches!(err, MailError::Address(_)));
    }
}
