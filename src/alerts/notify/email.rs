//! Email notifier: SMTP/STARTTLS via `lettre`, or a SaaS HTTP API
//! (SendGrid/Mailgun/SES) via `reqwest`.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as MailMessage, Tokio1Executor};
use uuid::Uuid;

use super::{NotifierError, NotifyOutcome};
use crate::config::{EmailConfig, EmailProvider};
use crate::store::models::{Alert, AlertStatus};

pub struct EmailNotifier {
    config: EmailConfig,
    http: reqwest::Client,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    fn body_for(&self, alert: &Alert) -> String {
        format!(
            "[{:?}] {} — {}\n\noccurrences: {}\nfirst seen: {}\nlast seen: {}",
            alert.severity, alert.title, alert.message, alert.occurrence_count, alert.first_seen_at, alert.last_seen_at
        )
    }

    async fn send_smtp(&self, subject: &str, body: String) -> NotifyOutcome {
        let Ok(from) = self.config.from_address.parse::<Mailbox>() else {
            return NotifyOutcome::NonRetryable("invalid from_address".to_string());
        };
        let mut builder = MailMessage::builder().from(from).subject(subject);
        for to in &self.config.recipients {
            let Ok(addr) = to.parse::<Mailbox>() else { continue };
            builder = builder.to(addr);
        }
        let message = match builder.body(body) {
            Ok(m) => m,
            Err(e) => return NotifyOutcome::NonRetryable(e.to_string()),
        };

        let mailer = match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host) {
            Ok(b) => b
                .credentials(Credentials::new(self.config.smtp_user.clone(), self.config.smtp_password.clone()))
                .build(),
            Err(e) => return NotifyOutcome::NonRetryable(e.to_string()),
        };

        match tokio::time::timeout(std::time::Duration::from_secs(10), mailer.send(message)).await {
            Ok(Ok(_)) => NotifyOutcome::Ok,
            Ok(Err(e)) => NotifyOutcome::Retryable(e.to_string()),
            Err(_) => NotifyOutcome::Retryable("smtp send timed out".to_string()),
        }
    }

    async fn send_saas(&self, endpoint: &str, payload: serde_json::Value) -> NotifyOutcome {
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            self.http.post(endpoint).bearer_auth(&self.config.api_key).json(&payload).send(),
        )
        .await;
        classify_http(result)
    }
}

#[async_trait::async_trait]
impl super::Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> NotifyOutcome {
        if self.validate_config().is_err() {
            tracing::warn!(alert_id = %alert.id, "email notifier unconfigured, skipping");
            return NotifyOutcome::Ok;
        }
        let subject = format!("[{:?}] {}", alert.severity, alert.title);
        let body = self.body_for(alert);
        match self.config.provider {
            EmailProvider::Smtp => self.send_smtp(&subject, body).await,
            EmailProvider::Sendgrid => {
                self.send_saas(
                    "https://api.sendgrid.com/v3/mail/send",
                    serde_json::json!({ "personalizations": [{"to": self.config.recipients}], "subject": subject, "content": [{"type": "text/plain", "value": body}] }),
                )
                .await
            }
            EmailProvider::Mailgun => {
                self.send_saas(
                    "https://api.mailgun.net/v3/messages",
                    serde_json::json!({ "to": self.config.recipients, "subject": subject, "text": body }),
                )
                .await
            }
            EmailProvider::Ses => {
                self.send_saas(
                    "https://email.us-east-1.amazonaws.com/v2/email/outbound-emails",
                    serde_json::json!({ "Destination": {"ToAddresses": self.config.recipients}, "Content": {"Simple": {"Subject": {"Data": subject}, "Body": {"Text": {"Data": body}}}} }),
                )
                .await
            }
        }
    }

    async fn resolve(&self, alert_id: Uuid) -> NotifyOutcome {
        tracing::debug!(%alert_id, "email notifier: resolve is a no-op, next occurrence sends a fresh alert");
        NotifyOutcome::Ok
    }

    async fn update(&self, alert_id: Uuid, status: AlertStatus) -> NotifyOutcome {
        tracing::debug!(%alert_id, ?status, "email notifier: update is a no-op");
        NotifyOutcome::Ok
    }

    fn validate_config(&self) -> Result<(), NotifierError> {
        if self.config.recipients.is_empty() {
            return Err(NotifierError::Unconfigured);
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.validate_config().is_ok()
    }
}

pub(super) fn classify_http(result: Result<reqwest::Result<reqwest::Response>, tokio::time::error::Elapsed>) -> NotifyOutcome {
    match result {
        Ok(Ok(resp)) => {
            let status = resp.status();
            if status.is_success() {
                NotifyOutcome::Ok
            } else if status.as_u16() == 429 || status.is_server_error() {
                NotifyOutcome::Retryable(format!("http {status}"))
            } else {
                NotifyOutcome::NonRetryable(format!("http {status}"))
            }
        }
        Ok(Err(e)) => NotifyOutcome::Retryable(e.to_string()),
        Err(_) => NotifyOutcome::Retryable("request timed out".to_string()),
    }
}
