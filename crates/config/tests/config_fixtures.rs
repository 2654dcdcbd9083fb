//! Integration tests for parsing config fixtures from the workspace testkit.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use stratus_config::{
    CURRENT_CONFIG_VERSION, LogLevelSetting, LogSinkKind, StratusEnv,
    load_stratus_config_from_path, parse_stratus_config_json, parse_stratus_config_toml,
};
use stratus_domain::{QuotaLimits, QuotaMode, ServiceId, Verb};
use stratus_shared::ErrorCode;

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn fixture_path(relative: &str) -> PathBuf {
    workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join(relative)
}

fn read_fixture(relative: &str) -> Result<String, Box<dyn Error>> {
    Ok(fs::read_to_string(fixture_path(relative))?)
}

#[test]
fn parses_valid_fixture_and_normalizes() -> Result<(), Box<dyn Error>> {
    let contents = read_fixture("config/stratus.valid.json")?;
    let config = parse_stratus_config_json(&contents)?;

    assert_eq!(config.version, CURRENT_CONFIG_VERSION);
    assert_eq!(config.quota.mode, QuotaMode::Block);
    assert_eq!(config.quota.cache_expiry_secs, 600);
    assert_eq!(config.scheduler.execution_time_limit_secs, 90);
    assert_eq!(
        config.storage.path.as_ref(),
        "/var/lib/stratus/stats.db",
        "path should be trimmed"
    );
    assert_eq!(config.logging.level, LogLevelSetting::Debug);
    assert_eq!(config.logging.sink, LogSinkKind::Tracing);
    assert_eq!(
        config.schedules.background_processes.interval.as_ref(),
        "2_minutes"
    );
    assert!(config.schedules.background_processes.enabled);

    let policy = config.policy();
    assert_eq!(
        policy.limits(&ServiceId::parse("owm")?, Verb::Get),
        Some(QuotaLimits::new(100_000, 3_000))
    );
    assert_eq!(
        policy.limits(&ServiceId::parse("meteoblue")?, Verb::Get),
        Some(QuotaLimits::new(5_000, 100))
    );
    assert_eq!(policy.limits(&ServiceId::parse("meteoblue")?, Verb::Post), None);
    Ok(())
}

#[test]
fn parses_default_toml_fixture() -> Result<(), Box<dyn Error>> {
    let contents = read_fixture("config/stratus.default.toml")?;
    let config = parse_stratus_config_toml(&contents)?;

    assert_eq!(config.quota.mode, QuotaMode::LogOnly);
    assert_eq!(config.retention.quota_day_days, 4);
    assert_eq!(config.schedules.stats_flush.interval.as_ref(), "10_minutes");
    assert_eq!(config.policy().len(), 5);
    Ok(())
}

#[test]
fn invalid_fixture_reports_error_code() -> Result<(), Box<dyn Error>> {
    let contents = read_fixture("config/stratus.invalid.json")?;
    let error = parse_stratus_config_json(&contents)
        .err()
        .ok_or_else(|| std::io::Error::other("expected invalid fixture error"))?;

    assert_eq!(error.code, ErrorCode::new("config", "invalid_limit"));
    assert_eq!(
        error.metadata.get("section").map(String::as_str),
        Some("retention")
    );
    assert_eq!(
        error.metadata.get("field").map(String::as_str),
        Some("quotaDayDays")
    );
    Ok(())
}

#[test]
fn unknown_plan_fixture_is_rejected_through_the_path_loader() -> Result<(), Box<dyn Error>> {
    let error = load_stratus_config_from_path(
        Some(fixture_path("config/stratus.unknown-plan.toml").as_path()),
        None,
        &StratusEnv::default(),
    )
    .err()
    .ok_or_else(|| std::io::Error::other("expected unknown plan error"))?;

    assert_eq!(error.code, ErrorCode::new("config", "unknown_plan"));
    assert_eq!(
        error.metadata.get("plan").map(String::as_str),
        Some("enterprise")
    );
    Ok(())
}

#[test]
fn missing_config_file_reports_not_found() -> Result<(), Box<dyn Error>> {
    let error = load_stratus_config_from_path(
        Some(fixture_path("config/does-not-exist.json").as_path()),
        None,
        &StratusEnv::default(),
    )
    .err()
    .ok_or_else(|| std::io::Error::other("expected missing file error"))?;
    assert_eq!(error.code, ErrorCode::new("config", "config_file_not_found"));
    Ok(())
}
