//! Configuration loading tests

use std::fs;

use replydash::config::Config;
use replydash::domain::EventKind;
use tempfile::TempDir;

#[test]
fn test_load_explicit_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("replydash.yml");
    fs::write(
        &path,
        r#"
dashboard:
  strict-order: true
  shutdown-grace-ms: 50
strategies:
  - name: archive
    max-tries: 3
    jitter-ms: 5
    default-kind: weak-main
"#,
    )
    .expect("Failed to write config");

    let config = Config::load(Some(&path)).expect("Failed to load config");

    assert!(config.dashboard.strict_order);
    assert_eq!(config.dashboard.shutdown_grace_ms, 50);
    assert_eq!(config.dashboard.hard_timeout_ms, 10_000);
    assert_eq!(config.strategies[0].name, "archive");
    assert_eq!(config.strategies[0].max_tries, 3);
    assert_eq!(config.strategies[0].default_kind, Some(EventKind::WeakMain));
}

#[test]
fn test_load_rejects_malformed_yaml() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("broken.yml");
    fs::write(&path, "dashboard: [not, a, map]\n").expect("Failed to write config");

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(format!("{:?}", err).contains("Failed to parse config file"));
}

#[tokio::test]
async fn test_configured_runner_answers_packet() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("replydash.yml");
    fs::write(
        &path,
        r#"
dashboard:
  soft-timeout-ms: 100
  hard-timeout-ms: 2000
strategies:
  - name: cache
    default-kind: weak-main
    forecast-ahead: true
  - name: primary
    latency-ms: 10
    default-kind: strong-main
"#,
    )
    .expect("Failed to write config");

    let config = Config::load(Some(&path)).expect("Failed to load config");
    config.validate().expect("config should be valid");

    let outcome = config.runner().run(["x", "y"]).await.expect("run failed");
    assert_eq!(outcome.replies.len(), 2);
    assert!(outcome.replies.iter().all(|r| r.strength() == EventKind::StrongMain));
}
