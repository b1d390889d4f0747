use std::future::Future;

use serde::Serialize;

use crate::config::EmailConfig;

/// One outbound notification. Queued in memory per batch by the
/// reconciliation engine and dispatched only after the owning batch commits.
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Outbound mail seam. The engine is generic over this so tests can substitute
/// a recording or failing mailer.
pub trait Mailer {
    fn send(
        &self,
        message: &EmailMessage,
    ) -> impl Future<Output = Result<(), EmailError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("invalid email payload: {0}")]
    InvalidPayload(String),
    #[error("email transport error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("email provider rejected send: status={status}, message={message}")]
    Provider { status: u16, message: String },
}

/// HTTP client for a Resend-style transactional email API.
#[derive(Debug, Clone)]
pub struct EmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    /// Validate email configuration at startup.
    /// Panics if real sending is enabled without credentials.
    pub fn validate_config(config: &EmailConfig) {
        if config.enabled && !config.mock && (config.api_key.is_empty() || config.from.is_empty()) {
            panic!(
                "Invalid email configuration: enabled=true and mock=false require \
                 EMAIL_API_KEY and EMAIL_FROM to be set."
            );
        }
    }

    fn check_payload(message: &EmailMessage) -> Result<(), EmailError> {
        if message.to.is_empty() || message.subject.is_empty() || message.text.is_empty() {
            return Err(EmailError::InvalidPayload(
                "to, subject, and text are required".to_string(),
            ));
        }
        Ok(())
    }
}

impl Mailer for EmailService {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        Self::check_payload(message)?;

        if !self.config.enabled {
            tracing::debug!(to = %message.to, "Email disabled, dropping message");
            return Ok(());
        }
        if self.config.mock {
            tracing::info!(to = %message.to, subject = %message.subject, "Mock email sent");
            return Ok(());
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&SendRequest {
                from: &self.config.from,
                to: &message.to,
                subject: &message.subject,
                text: &message.text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Provider {
                status: status.as_u16(),
                message: body,
            });
        }

        tracing::info!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}
