use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use stockinfo_cli::commands::{config, doctor, migrate};

#[test]
fn migrate_applies_schema_then_reports_up_to_date() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("cli.db").display());

    with_env(&[("STOCKINFO_DATABASE_URL", url.as_str())], || {
        let first = migrate::run();
        assert_eq!(first.exit_code, 0, "expected successful migrate run");
        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "applied 2 pending migration(s)");

        let second = migrate::run();
        assert_eq!(second.exit_code, 0);
        assert_eq!(parse_payload(&second.output)["message"], "schema already up to date");
    });
}

#[test]
fn migrate_returns_config_failure_for_malformed_delay() {
    with_env(&[("STOCKINFO_PRICE_UPDATE_DELAY_MINUTES", "five")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_db_failure_for_unreachable_database() {
    with_env(&[("STOCKINFO_DATABASE_URL", "sqlite:///nonexistent-stockinfo-dir/cli.db")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "db_connectivity");
    });
}

#[test]
fn config_attributes_env_values() {
    with_env(
        &[("STOCKINFO_PRICE_UPDATE_DELAY_MINUTES", "12"), ("STOCKINFO_LOG_LEVEL", "debug")],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "config");
            let message = payload["message"].as_str().unwrap_or_default();
            assert!(message.contains(
                "- price_update.delay_minutes = 12 (source: env (STOCKINFO_PRICE_UPDATE_DELAY_MINUTES))"
            ));
            assert!(message.contains("- logging.level = debug (source: env (STOCKINFO_LOG_LEVEL))"));
            assert!(message.contains("- price_update.overlap_policy = last_fire_wins (source: default)"));
        },
    );
}

#[test]
fn doctor_flags_pending_migrations_until_migrate_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("doctor.db").display());

    with_env(&[("STOCKINFO_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][1]["name"], "database_connectivity");
        assert_eq!(report["checks"][1]["status"], "pass");
        assert_eq!(report["checks"][2]["status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0);
        assert_eq!(parse_payload(&after.output)["overall_status"], "pass");

        let human = doctor::run(false);
        assert!(human.output.starts_with("doctor: all readiness checks passed"));
        assert!(human.output.contains("- [ok] schema_migrations: schema is up to date"));
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("STOCKINFO_PRICE_UPDATE_OVERLAP_POLICY", "first_wins")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
        assert_eq!(report["checks"][2]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STOCKINFO_DATABASE_URL",
        "STOCKINFO_DATABASE_MAX_CONNECTIONS",
        "STOCKINFO_DATABASE_TIMEOUT_SECS",
        "STOCKINFO_SERVER_BIND_ADDRESS",
        "STOCKINFO_SERVER_PORT",
        "STOCKINFO_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "STOCKINFO_PRICE_UPDATE_DELAY_MINUTES",
        "STOCKINFO_PRICE_UPDATE_OVERLAP_POLICY",
        "STOCKINFO_PRICE_UPDATE_QUEUE_CAPACITY",
        "STOCKINFO_LOGGING_LEVEL",
        "STOCKINFO_LOGGING_FORMAT",
        "STOCKINFO_LOG_LEVEL",
        "STOCKINFO_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
