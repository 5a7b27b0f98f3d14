//! Dedup fingerprinting and fold-or-create decision.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AlertError, HealthIssue};
use crate::cache::Cache;
use crate::config::AlertConfig;
use crate::store::models::Alert;
use crate::store::Store;

pub fn fingerprint_key(org_id: Uuid, device_id: Option<Uuid>, alert_type: &str) -> String {
    match device_id {
        Some(d) => format!("alert:dedup:{org_id}:{d}:{alert_type}"),
        None => format!("alert:dedup:{org_id}:none:{alert_type}"),
    }
}

pub enum DedupOutcome {
    Created(Alert),
    Updated { alert: Alert, should_notify: bool },
    LockBusy,
}

/// Acquires the fingerprint's dedup lock (single attempt) and
/// either folds `issue` into an existing active alert or creates a new
/// one. An active alert whose `last_seen_at` has fallen outside the
/// dedup window is treated as expired: it's resolved and a fresh alert
/// starts a new window (an Open Question the raw fingerprint rule left
/// implicit — resolved here, see DESIGN.md).
pub async fn dedupe(
    store: &Store,
    cache: &Cache,
    issue: &HealthIssue,
    config: &AlertConfig,
) -> Result<DedupOutcome, AlertError> {
    let key = fingerprint_key(issue.org_id, issue.device_id, &issue.alert_type);
    let Some(guard) = cache.try_lock(&key, config.lock_timeout).await? else {
        return Ok(DedupOutcome::LockBusy);
    };

    let result = fold_or_create(store, issue, config).await;
    guard.release().await;
    result
}

async fn fold_or_create(
    store: &Store,
    issue: &HealthIssue,
    config: &AlertConfig,
) -> Result<DedupOutcome, AlertError> {
    let existing = store
        .find_active_alert(issue.org_id, issue.device_id, &issue.alert_type)
        .await?;

    let existing = match existing {
        Some(alert) if within_window(alert.last_seen_at, issue.detected_at, config) => Some(alert),
        Some(stale) => {
            store.set_alert_status(stale.id, crate::store::models::AlertStatus::Resolved).await?;
            None
        }
        None => None,
    };

    match existing {
        Some(alert) => {
            let severity = alert.severity.max(issue.severity);
            let updated = store.bump_alert(alert.id, severity, issue.detected_at).await?;
            let should_notify = crossed_escalation(updated.occurrence_count, config.escalation_threshold)
                || outside_silent_period(updated.last_notified_at, issue.detected_at, config);
            Ok(DedupOutcome::Updated { alert: updated, should_notify })
        }
        None => {
            let created = store
                .create_alert(
                    issue.org_id,
                    issue.device_id,
                    issue.severity,
                    &issue.alert_type,
                    &issue.title,
                    &issue.message,
                    issue.metadata.clone(),
                )
                .await?;
            Ok(DedupOutcome::Created(created))
        }
    }
}

fn within_window(last_seen_at: DateTime<Utc>, now: DateTime<Utc>, config: &AlertConfig) -> bool {
    (now - last_seen_at) <= chrono::Duration::from_std(config.dedupe_window).unwrap_or_default()
}

fn outside_silent_period(last_notified_at: Option<DateTime<Utc>>, now: DateTime<Utc>, config: &AlertConfig) -> bool {
    match last_notified_at {
        None => true,
        Some(t) => (now - t) >= chrono::Duration::from_std(config.silent_period).unwrap_or_default(),
    }
}

fn crossed_escalation(occurrence_count: i32, threshold: u32) -> bool {
    threshold > 0 && occurrence_count > 1 && (occurrence_count as u32) % threshold == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn config() -> AlertConfig {
        AlertConfig {
            dedupe_window: std::time::Duration::from_secs(600),
            silent_period: std::time::Duration::from_secs(300),
            escalation_threshold: 10,
            lock_timeout: std::time::Duration::from_secs(5),
            check_interval: std::time::Duration::from_secs(60),
            device_offline_threshold: std::time::Duration::from_secs(300),
            high_latency_threshold_ms: 300,
            rate_limit_per_minute: 100,
            max_retries: 3,
            worker_count: 4,
            rules_path: None,
            rules_reload_interval: std::time::Duration::from_secs(60),
        }
    }

    #[test]
    fn within_window_accepts_reoccurrence_inside_dedupe_window() {
        let last_seen = Utc::now();
        let now = last_seen + ChronoDuration::minutes(5);
        assert!(within_window(last_seen, now, &config()));
    }

    #[test]
    fn within_window_rejects_reoccurrence_past_dedupe_window() {
        let last_seen = Utc::now();
        let now = last_seen + ChronoDuration::minutes(11);
        assert!(!within_window(last_seen, now, &config()));
    }

    #[test]
    fn silent_period_suppresses_notification_right_after_the_last_one() {
        let last_notified = Utc::now();
        let now = last_notified + ChronoDuration::minutes(1);
        assert!(!outside_silent_period(Some(last_notified), now, &config()));
    }

    #[test]
    fn silent_period_lifts_once_it_elapses() {
        let last_notified = Utc::now();
        let now = last_notified + ChronoDuration::minutes(6);
        assert!(outside_silent_period(Some(last_notified), now, &config()));
    }

    #[test]
    fn never_notified_is_always_outside_the_silent_period() {
        assert!(outside_silent_period(None, Utc::now(), &config()));
    }

    #[test]
    fn escalation_fires_on_exact_multiples_of_the_threshold() {
        assert!(!crossed_escalation(1, 10));
        assert!(!crossed_escalation(9, 10));
        assert!(crossed_escalation(10, 10));
        assert!(crossed_escalation(20, 10));
        assert!(!crossed_escalation(21, 10));
    }

    #[test]
    fn escalation_never_fires_when_threshold_is_disabled() {
        assert!(!crossed_escalation(10, 0));
    }
}
