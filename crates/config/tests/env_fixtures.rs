//! Integration tests for env parsing and env-to-config merging.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use stratus_config::{
    EnvParseError, LogLevelSetting, StratusConfig, StratusEnv, apply_env_overrides,
};
use stratus_domain::{QuotaLimits, QuotaMode, ServiceId, Verb};
use stratus_shared::{ErrorCode, ErrorEnvelope};

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn read_env_map(relative: &str) -> Result<BTreeMap<String, String>, Box<dyn Error>> {
    let path = workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join(relative);
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[test]
fn env_fixtures_merge_into_effective_config() -> Result<(), Box<dyn Error>> {
    let env_map = read_env_map("env/stratus-env.valid.json")?;
    let env = StratusEnv::from_map(&env_map)?;

    let config = apply_env_overrides(StratusConfig::default(), &env)?;

    assert_eq!(config.quota.mode, QuotaMode::Probabilistic);
    assert_eq!(config.quota.cache_expiry_secs, 120);
    assert_eq!(config.scheduler.execution_time_limit_secs, 240);
    assert!(config.storage.in_memory);
    assert_eq!(config.logging.level, LogLevelSetting::Warn);
    assert_eq!(
        config.policy().limits(&ServiceId::parse("owm")?, Verb::Get),
        Some(QuotaLimits::new(30_000, 600))
    );
    assert_eq!(
        config.policy().limits(&ServiceId::parse("pws")?, Verb::Post),
        Some(QuotaLimits::new(0, 10))
    );
    Ok(())
}

#[test]
fn invalid_env_fixture_is_rejected() -> Result<(), Box<dyn Error>> {
    let env_map = read_env_map("env/stratus-env.invalid.json")?;
    let error = StratusEnv::from_map(&env_map).err();
    assert!(matches!(error, Some(EnvParseError::InvalidPlanEntry { .. })));

    let envelope: ErrorEnvelope = error
        .ok_or_else(|| std::io::Error::other("expected invalid env error"))?
        .into();
    assert_eq!(envelope.code, ErrorCode::new("config", "invalid_env_csv"));
    assert_eq!(
        envelope.metadata.get("entry").map(String::as_str),
        Some("owm:developer")
    );
    Ok(())
}
