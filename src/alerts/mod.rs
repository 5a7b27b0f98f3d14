//! Alert pipeline: detection → dedup → rule-driven dispatch.

pub mod dedup;
pub mod notify;
pub mod rules;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::Cache;
use crate::config::AlertConfig;
use crate::eventbus::{Event, EventBus};
use crate::store::models::{Alert, AlertStatus, Severity};
use crate::store::Store;
use notify::Dispatcher;
use rules::RuleEngine;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIssue {
    pub org_id: Uuid,
    pub device_id: Option<Uuid>,
    pub alert_type: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Cache(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub enum AlertOutcome {
    Created(Alert),
    Updated(Alert),
    /// Another instance holds the dedup lock for this fingerprint — read
    /// as "already being handled", dropped silently.
    Dropped,
}

#[derive(Clone)]
pub struct AlertPipeline {
    store: Store,
    cache: Cache,
    bus: EventBus,
    config: AlertConfig,
    rules: RuleEngine,
    dispatcher: Dispatcher,
}

impl AlertPipeline {
    pub fn new(store: Store, cache: Cache, bus: EventBus, config: AlertConfig, rules: RuleEngine, dispatcher: Dispatcher) -> Self {
        Self { store, cache, bus, config, rules, dispatcher }
    }

    /// Runs one `HealthIssue` through dedup, publishes the resulting
    /// `alert_created`/`alert_updated` event, and hands off to the
    /// notification dispatcher when notification is warranted.
    pub async fn process_issue(&self, issue: HealthIssue) -> Result<AlertOutcome, AlertError> {
        match dedup::dedupe(&self.store, &self.cache, &issue, &self.config).await? {
            dedup::DedupOutcome::LockBusy => {
                tracing::debug!(org_id = %issue.org_id, alert_type = %issue.alert_type, "dedup lock busy, dropping issue");
                Ok(AlertOutcome::Dropped)
            }
            dedup::DedupOutcome::Created(alert) => {
                self.bus
                    .publish(Event::alert_created(alert.org_id, alert.device_id, alert_summary(&alert)))
                    .await;
                self.notify(&alert).await;
                Ok(AlertOutcome::Created(alert))
            }
            dedup::DedupOutcome::Updated { alert, should_notify } => {
                self.bus
                    .publish(Event::alert_updated(alert.org_id, alert.device_id, alert_summary(&alert)))
                    .await;
                if should_notify {
                    self.notify(&alert).await;
                }
                Ok(AlertOutcome::Updated(alert))
            }
        }
    }

    async fn notify(&self, alert: &Alert) {
        let channels = self.rules.channels_for(alert);
        if let Err(e) = self.store.mark_alert_notified(alert.id, Utc::now()).await {
            tracing::warn!(error = %e, alert_id = %alert.id, "failed to record notification timestamp");
        }
        self.dispatcher.enqueue(alert.clone(), channels).await;
    }

    pub async fn acknowledge(&self, id: Uuid) -> Result<Alert, AlertError> {
        let alert = self.store.set_alert_status(id, AlertStatus::Acknowledged).await?.ok_or(AlertError::NotFound)?;
        self.bus.publish(Event::alert_updated(alert.org_id, alert.device_id, alert_summary(&alert))).await;
        Ok(alert)
    }

    pub async fn resolve(&self, id: Uuid) -> Result<Alert, AlertError> {
        let alert = self.store.set_alert_status(id, AlertStatus::Resolved).await?.ok_or(AlertError::NotFound)?;
        self.bus.publish(Event::alert_updated(alert.org_id, alert.device_id, alert_summary(&alert))).await;
        self.dispatcher.resolve(alert.id).await;
        Ok(alert)
    }

    pub fn rules(&self) -> RuleEngine {
        self.rules.clone()
    }
}

fn alert_summary(alert: &Alert) -> serde_json::Value {
    serde_json::json!({
        "id": alert.id,
        "severity": alert.severity,
        "type": alert.r#type,
        "status": alert.status,
        "occurrence_count": alert.occurrence_count,
    })
}
