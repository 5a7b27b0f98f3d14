//! Generic webhook notifier: POSTs a JSON payload. Discord reuses the
//! same transport with an embed-shaped body.

use uuid::Uuid;

use super::email::classify_http;
use super::{NotifierError, NotifyOutcome};
use crate::store::models::{Alert, AlertStatus};

pub struct WebhookNotifier {
    url: Option<String>,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        Self { url, http: reqwest::Client::new() }
    }

    fn payload(alert: &Alert) -> serde_json::Value {
        serde_json::json!({
            "id": alert.id,
            "severity": alert.severity,
            "type": alert.r#type,
            "title": alert.title,
            "message": alert.message,
            "occurrence_count": alert.occurrence_count,
            "status": alert.status,
        })
    }

    async fn post(&self, url: &str, payload: serde_json::Value) -> NotifyOutcome {
        let result = tokio::time::timeout(std::time::Duration::from_secs(10), self.http.post(url).json(&payload).send()).await;
        classify_http(result)
    }
}

#[async_trait::async_trait]
impl super::Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> NotifyOutcome {
        let Some(url) = &self.url else {
            tracing::warn!(alert_id = %alert.id, "webhook notifier unconfigured, skipping");
            return NotifyOutcome::Ok;
        };
        self.post(url, Self::payload(alert)).await
    }

    async fn resolve(&self, alert_id: Uuid) -> NotifyOutcome {
        let Some(url) = &self.url else { return NotifyOutcome::Ok };
        self.post(url, serde_json::json!({ "id": alert_id, "status": "resolved" })).await
    }

    async fn update(&self, alert_id: Uuid, status: AlertStatus) -> NotifyOutcome {
        let Some(url) = &self.url else { return NotifyOutcome::Ok };
        self.post(url, serde_json::json!({ "id": alert_id, "status": status })).await
    }

    fn validate_config(&self) -> Result<(), NotifierError> {
        self.url.as_ref().map(|_| ()).ok_or(NotifierError::Unconfigured)
    }

    async fn health_check(&self) -> bool {
        self.validate_config().is_ok()
    }
}
