use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use assert_matches::assert_matches;
use backtest_parity::batch::BackoffShape;
use backtest_parity::config::{
    ApplicationConfig, ConfigLoadError, ConfigValidationError, DataSourceKind, Environment,
};
use backtest_parity::contract::CanonicalMetric;
use serial_test::serial;
use tempfile::tempdir;

const DEVELOPMENT: &str = r#"
[log]
level = "debug"
format = "json"

[batch]
attempt_timeout_seconds = 2.5

[batch.retry]
retry_failed = true
max_retry_attempts = 3
retry_backoff_seconds = 0.25

[batch.retry.backoff]
shape = "linear"

[parity.tolerances.metrics.sharpe]
kind = "absolute"
threshold = 0.1

[[parity.deviations]]
id = "whole-shares"
explanation = "residual cash from whole-share fills"
metrics = ["mean_cash_utilization"]
"#;

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

#[test]
#[serial]
fn test_load_environment_file() {
    let dir = tempdir().unwrap();
    write(dir.path(), "development.toml", DEVELOPMENT);

    let config = ApplicationConfig::load_from(dir.path(), Environment::Development).unwrap();
    assert_eq!(config.log.format, "json");

    let settings = config.batch.settings();
    assert_eq!(settings.retry.max_attempts(), 4);
    assert_eq!(settings.retry.backoff, BackoffShape::Linear);
    assert_eq!(settings.attempt_timeout, Some(Duration::from_millis(2500)));

    let harness = config.parity.harness();
    assert_eq!(harness.tolerances().tolerance_for(CanonicalMetric::Sharpe).threshold, 0.1);
    // 未覆寫的指標沿用預設
    assert_eq!(harness.tolerances().tolerance_for(CanonicalMetric::Roi).threshold, 0.001);
    assert_eq!(harness.deviations()[0].metrics, vec![CanonicalMetric::MeanCashUtilization]);
    assert_eq!(config.data.source, DataSourceKind::Synthetic);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let config = ApplicationConfig::load_from(dir.path(), Environment::Production).unwrap();
    assert_eq!(config.log.level, "info");
    assert!(!config.batch.retry.retry_failed);
}

#[test]
#[serial]
fn test_environment_variables_override_file() {
    let dir = tempdir().unwrap();
    write(dir.path(), "development.toml", DEVELOPMENT);

    env::set_var("PARITY__BATCH__MAX_CONCURRENCY", "7");
    env::set_var("PARITY__LOG__LEVEL", "warn");
    let config = ApplicationConfig::load_from(dir.path(), Environment::Development);
    env::remove_var("PARITY__BATCH__MAX_CONCURRENCY");
    env::remove_var("PARITY__LOG__LEVEL");

    let config = config.unwrap();
    assert_eq!(config.batch.max_concurrency, Some(7));
    assert_eq!(config.log.level, "warn");
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "development.toml",
        r#"
[data]
source = "csv"
"#,
    );

    let err = ApplicationConfig::load_from(dir.path(), Environment::Development).unwrap_err();
    assert_matches!(
        err,
        ConfigLoadError::Invalid(ConfigValidationError::DependencyError { .. })
    );
}

#[test]
#[serial]
fn test_shipped_configurations_are_valid() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    for env in [Environment::Development, Environment::Production] {
        let config = ApplicationConfig::load_from(&root, env);
        assert!(config.is_ok(), "{:?}: {:?}", env, config.err());
    }
}
