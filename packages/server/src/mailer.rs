use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Outbound transactional mail. Callers treat delivery as best-effort:
/// a failed send is logged and the triggering request still succeeds.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailerError>;

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), MailerError>;

    async fn send_subscription_confirmation(
        &self,
        to: &str,
        plan_name: &str,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<(), MailerError>;
}

/// Writes mail to the log instead of delivering it. Stands in until a
/// real provider is wired up. Codes only appear at debug level.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailerError> {
        info!(%to, "sending account verification code");
        tracing::debug!(%to, %code, "verification code issued");
        Ok(())
    }

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), MailerError> {
        info!(%to, "sending password reset code");
        tracing::debug!(%to, %code, "password reset code issued");
        Ok(())
    }

    async fn send_subscription_confirmation(
        &self,
        to: &str,
        plan_name: &str,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<(), MailerError> {
        info!(%to, plan = %plan_name, ?end_date, "sending subscription confirmation");
        Ok(())
    }
}
