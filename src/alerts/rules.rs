//! Optional rule engine: match predicates over alert fields select
//! notifier channels, reloaded from file on a timer or on request. Load
//! failures are non-fatal — the pipeline falls back to the default
//! channel set.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::store::models::{Alert, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulePredicate {
    pub min_severity: Option<Severity>,
    pub alert_type: Option<String>,
    pub device_id: Option<Uuid>,
}

impl RulePredicate {
    fn matches(&self, alert: &Alert) -> bool {
        if let Some(min) = self.min_severity {
            if alert.severity < min {
                return false;
            }
        }
        if let Some(t) = &self.alert_type {
            if t != &alert.r#type {
                return false;
            }
        }
        if let Some(d) = self.device_id {
            if alert.device_id != Some(d) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub r#match: RulePredicate,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

const DEFAULT_CHANNELS: &[&str] = &["email", "webhook"];

#[derive(Clone)]
pub struct RuleEngine {
    path: Option<String>,
    set: Arc<RwLock<RuleSet>>,
}

impl RuleEngine {
    pub fn new(path: Option<String>) -> Self {
        let set = match &path {
            Some(p) => RuleSet::load(p).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %p, "rule set load failed, falling back to default routing");
                RuleSet::default()
            }),
            None => RuleSet::default(),
        };
        Self { path, set: Arc::new(RwLock::new(set)) }
    }

    /// First matching rule's actions win; no rule loaded or no match
    /// falls back to the default channel set.
    pub fn channels_for(&self, alert: &Alert) -> Vec<String> {
        let set = self.set.read();
        for rule in &set.rules {
            if rule.r#match.matches(alert) {
                return rule.actions.clone();
            }
        }
        DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect()
    }

    pub fn reload(&self) {
        let Some(path) = &self.path else { return };
        match RuleSet::load(path) {
            Ok(set) => {
                *self.set.write() = set;
                tracing::info!(path = %path, "rule set reloaded");
            }
            Err(e) => tracing::warn!(error = %e, path = %path, "rule reload failed, keeping previous rule set"),
        }
    }

    pub async fn run_hot_reload(self, interval: Duration, token: CancellationToken) {
        if self.path.is_none() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => self.reload(),
            }
        }
    }
}
