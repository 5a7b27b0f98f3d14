//! Rule file loading and channel selection. Filesystem-only, no live
//! store or cache required.

use chrono::Utc;
use meshctl::alerts::rules::{RuleEngine, RuleSet};
use meshctl::store::models::{Alert, AlertStatus, Severity};
use uuid::Uuid;
use std::io::Write;

fn alert(severity: Severity, alert_type: &str, device_id: Option<Uuid>) -> Alert {
    let now = Utc::now();
    Alert {
        id: Uuid::new_v4(),
        org_id: Uuid::new_v4(),
        device_id,
        severity,
        r#type: alert_type.to_string(),
        title: "title".to_string(),
        message: "message".to_string(),
        status: AlertStatus::Active,
        metadata: serde_json::json!({}),
        occurrence_count: 1,
        first_seen_at: now,
        last_seen_at: now,
        created_at: now,
        last_notified_at: None,
    }
}

#[test]
fn engine_falls_back_to_default_channels_with_no_rules_path() {
    let engine = RuleEngine::new(None);
    let channels = engine.channels_for(&alert(Severity::Low, "device_offline", None));
    assert_eq!(channels, vec!["email".to_string(), "webhook".to_string()]);
}

#[test]
fn engine_falls_back_to_default_channels_when_the_file_is_missing() {
    let engine = RuleEngine::new(Some("/nonexistent/path/rules.toml".to_string()));
    let channels = engine.channels_for(&alert(Severity::High, "device_offline", None));
    assert_eq!(channels, vec!["email".to_string(), "webhook".to_string()]);
}

#[test]
fn ruleset_loads_rules_from_a_toml_file() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        r#"
        [[rules]]
        name = "critical-pages-oncall"
        actions = ["pagerduty"]

        [rules.match]
        min_severity = "critical"
        "#
    )
    .expect("write rule file");

    let set = RuleSet::load(file.path().to_str().unwrap()).expect("load ruleset");
    assert_eq!(set.rules.len(), 1);
    assert_eq!(set.rules[0].name, "critical-pages-oncall");
    assert_eq!(set.rules[0].actions, vec!["pagerduty".to_string()]);
}

#[test]
fn engine_selects_the_first_matching_rules_actions() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        r#"
        [[rules]]
        name = "critical-pages-oncall"
        actions = ["pagerduty"]

        [rules.match]
        min_severity = "critical"

        [[rules]]
        name = "device-offline-webhook-only"
        actions = ["webhook"]

        [rules.match]
        alert_type = "device_offline"
        "#
    )
    .expect("write rule file");

    let engine = RuleEngine::new(Some(file.path().to_str().unwrap().to_string()));

    let critical = alert(Severity::Critical, "high_latency", None);
    assert_eq!(engine.channels_for(&critical), vec!["pagerduty".to_string()]);

    let offline = alert(Severity::Low, "device_offline", None);
    assert_eq!(engine.channels_for(&offline), vec!["webhook".to_string()]);

    let unmatched = alert(Severity::Medium, "something_else", None);
    assert_eq!(unmatched_channels(&engine, &unmatched), vec!["email".to_string(), "webhook".to_string()]);
}

fn unmatched_channels(engine: &RuleEngine, alert: &Alert) -> Vec<String> {
    engine.channels_for(alert)
}

#[test]
fn reload_picks_up_a_rewritten_rule_file() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(file, "rules = []").expect("write initial empty ruleset");

    let engine = RuleEngine::new(Some(file.path().to_str().unwrap().to_string()));
    let before = alert(Severity::Critical, "device_offline", None);
    assert_eq!(engine.channels_for(&before), vec!["email".to_string(), "webhook".to_string()]);

    let mut file = std::fs::File::create(file.path()).expect("reopen for overwrite");
    writeln!(
        file,
        r#"
        [[rules]]
        name = "catch-all"
        actions = ["slack"]
        "#
    )
    .expect("write updated rule file");

    engine.reload();
    let after = alert(Severity::Critical, "device_offline", None);
    assert_eq!(engine.channels_for(&after), vec!["slack".to_string()]);
}
