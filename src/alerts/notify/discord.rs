//! Discord notifier: a specialization of the generic webhook that
//! renders a severity-colored embed instead of a raw JSON dump.

use uuid::Uuid;

use super::email::classify_http;
use super::{NotifierError, NotifyOutcome};
use crate::store::models::{Alert, AlertStatus, Severity};

fn embed_color(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 0xE02020,
        Severity::High => 0xE08020,
        Severity::Medium => 0xE0C020,
        Severity::Low => 0x3090E0,
    }
}

pub struct DiscordNotifier {
    url: Option<String>,
    http: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(url: Option<String>) -> Self {
        Self { url, http: reqwest::Client::new() }
    }
}

#[async_trait::async_trait]
impl super::Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, alert: &Alert) -> NotifyOutcome {
        let Some(url) = &self.url else {
            tracing::warn!(alert_id = %alert.id, "discord notifier unconfigured, skipping");
            return NotifyOutcome::Ok;
        };
        let payload = serde_json::json!({
            "embeds": [{
                "title": alert.title,
                "description": alert.message,
                "color": embed_color(alert.severity),
                "fields": [
                    {"name": "type", "value": alert.r#type, "inline": true},
                    {"name": "occurrences", "value": alert.occurrence_count.to_string(), "inline": true},
                ],
            }]
        });
        let result = tokio::time::timeout(std::time::Duration::from_secs(10), self.http.post(url).json(&payload).send()).await;
        classify_http(result)
    }

    async fn resolve(&self, alert_id: Uuid) -> NotifyOutcome {
        tracing::debug!(%alert_id, "discord notifier: resolve is a no-op, embeds aren't editable via plain webhook");
        NotifyOutcome::Ok
    }

    async fn update(&self, alert_id: Uuid, status: AlertStatus) -> NotifyOutcome {
        tracing::debug!(%alert_id, ?status, "discord notifier: update is a no-op");
        NotifyOutcome::Ok
    }

    fn validate_config(&self) -> Result<(), NotifierError> {
        self.url.as_ref().map(|_| ()).ok_or(NotifierError::Unconfigured)
    }

    async fn health_check(&self) -> bool {
        self.validate_config().is_ok()
    }
}
