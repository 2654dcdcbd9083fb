//! Config loading helpers (env + file + overrides).
//!
//! The loader is responsible for deterministic merge order and surfacing
//! user-facing errors as typed `ErrorEnvelope`s.

use crate::env::merge_env_overrides;
use crate::plans::PlanLimits;
use crate::schema::{LogLevelSetting, LogSinkKind, ScheduleToggle};
use crate::{StratusConfig, StratusEnv, ValidatedStratusConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use stratus_domain::QuotaMode;
use stratus_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

/// Load the config from sources using a deterministic precedence order.
///
/// Precedence (highest wins):
/// - env overrides (`StratusEnv`)
/// - overrides JSON (partial config)
/// - config JSON (file content)
/// - defaults (`StratusConfig::default()`)
pub fn load_stratus_config_from_sources(
    config_json: Option<&str>,
    overrides_json: Option<&str>,
    env: &StratusEnv,
) -> Result<ValidatedStratusConfig, ErrorEnvelope> {
    let config = match config_json {
        None => StratusConfig::default(),
        Some(input) => parse_config_unvalidated(input, ConfigFormat::Json)?,
    };
    finish(config, overrides_json, env)
}

/// Load the config from an optional file path (`.json` or `.toml`).
pub fn load_stratus_config_from_path(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    env: &StratusEnv,
) -> Result<ValidatedStratusConfig, ErrorEnvelope> {
    let config = match config_path {
        None => StratusConfig::default(),
        Some(path) => {
            let config_text = read_config_file(path)?;
            let format = detect_config_format(path)?;
            parse_config_unvalidated(&config_text, format)?
        },
    };
    finish(config, overrides_json, env)
}

/// Load the config from std env and an optional file path.
pub fn load_stratus_config_std_env(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<ValidatedStratusConfig, ErrorEnvelope> {
    let env = StratusEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    load_stratus_config_from_path(config_path, overrides_json, &env)
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &StratusConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &StratusConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

fn finish(
    mut config: StratusConfig,
    overrides_json: Option<&str>,
    env: &StratusEnv,
) -> Result<ValidatedStratusConfig, ErrorEnvelope> {
    if let Some(input) = overrides_json {
        let overrides = parse_overrides_json(input)?;
        overrides.apply(&mut config);
    }

    // env is applied last; validation runs once on the merged result.
    merge_env_overrides(&mut config, env);
    config.validate_and_normalize().map_err(Into::into)
}

fn parse_config_unvalidated(
    input: &str,
    format: ConfigFormat,
) -> Result<StratusConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn parse_overrides_json(input: &str) -> Result<StratusConfigOverrides, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid overrides JSON: {error}"),
        )
        .with_metadata("source", "overrides")
    })
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

fn detect_config_format(path: &Path) -> Result<ConfigFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("config", "unsupported_format"),
            "unsupported config format; use .json or .toml",
        )
        .with_metadata("extension", other.to_string())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct StratusConfigOverrides {
    version: Option<u32>,
    quota: QuotaOverrides,
    scheduler: SchedulerOverrides,
    retention: RetentionOverrides,
    storage: StorageOverrides,
    logging: LoggingOverrides,
    schedules: SchedulesOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct QuotaOverrides {
    mode: Option<QuotaMode>,
    cache_expiry_secs: Option<u64>,
    cache_max_entries: Option<u64>,
    strict_threshold_pct: Option<u64>,
    safety_margin: Option<u64>,
    alert_ttl_secs: Option<u64>,
    plans: Option<BTreeMap<Box<str>, Box<str>>>,
    custom_services: Option<BTreeMap<Box<str>, PlanLimits>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct SchedulerOverrides {
    execution_time_limit_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct RetentionOverrides {
    chrono_days: Option<u64>,
    quota_day_days: Option<u64>,
    quota_year_days: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct StorageOverrides {
    path: Option<Box<str>>,
    in_memory: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct LoggingOverrides {
    level: Option<LogLevelSetting>,
    sink: Option<LogSinkKind>,
    base_fields: Option<BTreeMap<Box<str>, Box<str>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct SchedulesOverrides {
    stats_flush: Option<ScheduleToggle>,
    quota_rotate: Option<ScheduleToggle>,
    chrono_rotate: Option<ScheduleToggle>,
    background_processes: Option<ScheduleToggle>,
}

impl StratusConfigOverrides {
    fn apply(self, config: &mut StratusConfig) {
        set(&mut config.version, self.version);

        let quota = self.quota;
        set(&mut config.quota.mode, quota.mode);
        set(&mut config.quota.cache_expiry_secs, quota.cache_expiry_secs);
        set(&mut config.quota.cache_max_entries, quota.cache_max_entries);
        set(
            &mut config.quota.strict_threshold_pct,
            quota.strict_threshold_pct,
        );
        set(&mut config.quota.safety_margin, quota.safety_margin);
        set(&mut config.quota.alert_ttl_secs, quota.alert_ttl_secs);
        if let Some(plans) = quota.plans {
            config.quota.plans.extend(plans);
        }
        if let Some(custom) = quota.custom_services {
            config.quota.custom_services.extend(custom);
        }

        set(
            &mut config.scheduler.execution_time_limit_secs,
            self.scheduler.execution_time_limit_secs,
        );

        set(&mut config.retention.chrono_days, self.retention.chrono_days);
        set(
            &mut config.retention.quota_day_days,
            self.retention.quota_day_days,
        );
        set(
            &mut config.retention.quota_year_days,
            self.retention.quota_year_days,
        );

        set(&mut config.storage.path, self.storage.path);
        set(&mut config.storage.in_memory, self.storage.in_memory);

        set(&mut config.logging.level, self.logging.level);
        set(&mut config.logging.sink, self.logging.sink);
        if let Some(fields) = self.logging.base_fields {
            config.logging.base_fields.extend(fields);
        }

        set(&mut config.schedules.stats_flush, self.schedules.stats_flush);
        set(
            &mut config.schedules.quota_rotate,
            self.schedules.quota_rotate,
        );
        set(
            &mut config.schedules.chrono_rotate,
            self.schedules.chrono_rotate,
        );
        set(
            &mut config.schedules.background_processes,
            self.schedules.background_processes,
        );
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_precedence_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let config_json = r#"{
          "version": 1,
          "quota": { "cacheExpirySecs": 600 }
        }"#;

        let overrides_json = r#"{
          "quota": { "cacheExpirySecs": 700 }
        }"#;

        let env = StratusEnv {
            quota_cache_expiry_secs: Some(800),
            ..StratusEnv::default()
        };

        let config =
            load_stratus_config_from_sources(Some(config_json), Some(overrides_json), &env)?;
        assert_eq!(config.quota.cache_expiry_secs, 800);

        let config = load_stratus_config_from_sources(
            Some(config_json),
            Some(overrides_json),
            &StratusEnv::default(),
        )?;
        assert_eq!(config.quota.cache_expiry_secs, 700);
        Ok(())
    }

    #[test]
    fn serialization_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_stratus_config_from_sources(None, None, &StratusEnv::default())?;
        let first = to_pretty_json(&config)?;
        let second = to_pretty_json(&config)?;
        assert_eq!(first, second);
        let toml = to_pretty_toml(&config)?;
        assert!(toml.contains("cacheExpirySecs = 900"));
        Ok(())
    }

    #[test]
    fn invalid_config_value_overridden_by_valid_env_succeeds()
    -> Result<(), Box<dyn std::error::Error>> {
        let config_json = r#"{ "quota": { "cacheExpirySecs": 0 } }"#;
        let env = StratusEnv {
            quota_cache_expiry_secs: Some(300),
            ..StratusEnv::default()
        };

        let config = load_stratus_config_from_sources(Some(config_json), None, &env)?;
        assert_eq!(config.quota.cache_expiry_secs, 300);
        Ok(())
    }

    #[test]
    fn malformed_overrides_report_their_source() -> Result<(), Box<dyn std::error::Error>> {
        let overrides_json = r#"{ "quota": { "mode": }"#;
        let error = load_stratus_config_from_sources(None, Some(overrides_json), &StratusEnv::default())
            .err()
            .ok_or_else(|| std::io::Error::other("expected overrides error"))?;
        assert_eq!(error.code, ErrorCode::new("config", "invalid_json"));
        assert_eq!(
            error.metadata.get("source").map(String::as_str),
            Some("overrides")
        );
        Ok(())
    }

    #[test]
    fn schedule_overrides_replace_whole_toggle() -> Result<(), Box<dyn std::error::Error>> {
        let overrides_json = r#"{
          "schedules": { "statsFlush": { "enabled": false, "interval": "5_minutes" } }
        }"#;
        let config =
            load_stratus_config_from_sources(None, Some(overrides_json), &StratusEnv::default())?;
        assert!(!config.schedules.stats_flush.enabled);
        assert_eq!(config.schedules.stats_flush.interval.as_ref(), "5_minutes");
        assert!(config.schedules.quota_rotate.enabled);
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let error = detect_config_format(Path::new("stratus.yaml")).err();
        assert_eq!(
            error.map(|error| error.code),
            Some(ErrorCode::new("config", "unsupported_format"))
        );
    }
}
