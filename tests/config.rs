//! `Settings::load`: TOML file plus `MESHCTL_*` environment overrides.

use meshctl::config::Settings;
use std::io::Write;

#[test]
fn load_with_no_path_returns_defaults() {
    let settings = Settings::load(None).expect("defaults always load");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.register_rate_limit_per_minute, 30);
}

#[test]
fn load_reads_a_toml_file_and_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        r#"
        [server]
        host = "127.0.0.1"
        port = 9999
        read_timeout = 5
        write_timeout = 5
        register_rate_limit_per_minute = 5

        [store]
        dsn = "postgres://test/test"
        max_open = 20
        max_idle = 5
        max_lifetime = 1800
        max_idle_time = 600

        [ephemeral]
        addr = "redis://127.0.0.1:6379"
        pool_size = 10

        [alerts]
        dedupe_window = 1800
        silent_period = 300
        escalation_threshold = 10
        lock_timeout = 5
        check_interval = 60
        device_offline_threshold = 300
        high_latency_threshold_ms = 300
        rate_limit_per_minute = 100
        max_retries = 3
        worker_count = 4
        rules_reload_interval = 60

        [email]
        provider = "Smtp"
        smtp_host = ""
        smtp_user = ""
        smtp_password = ""
        api_key = ""
        from_address = "alerts@meshctl.local"
        recipients = []
        queue_size = 1000

        [webhook]
        "#
    )
    .expect("write config file");

    let settings = Settings::load(Some(file.path().to_str().unwrap())).expect("load settings from file");
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 9999);
    assert_eq!(settings.server.register_rate_limit_per_minute, 5);
    assert_eq!(settings.store.dsn, "postgres://test/test");
}

#[test]
fn env_vars_override_a_loaded_file() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        r#"
        [server]
        host = "127.0.0.1"
        port = 9999
        read_timeout = 5
        write_timeout = 5
        register_rate_limit_per_minute = 5

        [store]
        dsn = "postgres://test/test"
        max_open = 20
        max_idle = 5
        max_lifetime = 1800
        max_idle_time = 600

        [ephemeral]
        addr = "redis://127.0.0.1:6379"
        pool_size = 10

        [alerts]
        dedupe_window = 1800
        silent_period = 300
        escalation_threshold = 10
        lock_timeout = 5
        check_interval = 60
        device_offline_threshold = 300
        high_latency_threshold_ms = 300
        rate_limit_per_minute = 100
        max_retries = 3
        worker_count = 4
        rules_reload_interval = 60

        [email]
        provider = "Smtp"
        smtp_host = ""
        smtp_user = ""
        smtp_password = ""
        api_key = ""
        from_address = "alerts@meshctl.local"
        recipients = []
        queue_size = 1000

        [webhook]
        "#
    )
    .expect("write config file");

    std::env::set_var("MESHCTL_HOST", "192.0.2.10");
    std::env::set_var("MESHCTL_PORT", "1234");
    let settings = Settings::load(Some(file.path().to_str().unwrap())).expect("load settings from file");
    std::env::remove_var("MESHCTL_HOST");
    std::env::remove_var("MESHCTL_PORT");

    assert_eq!(settings.server.host, "192.0.2.10");
    assert_eq!(settings.server.port, 1234);
    // field not touched by an env var keeps the file's value.
    assert_eq!(settings.server.register_rate_limit_per_minute, 5);
}
