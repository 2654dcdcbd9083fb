//! Environment variable parsing and env-to-config merging.
//!
//! This module keeps env parsing:
//! - strict (invalid values fail fast)
//! - deterministic (plan lists normalize to sorted, deduped pairs)
//! - safe (secret-looking values are redacted in error metadata)

use crate::schema::{LogLevelSetting, LogSinkKind, StratusConfig, ValidatedStratusConfig};
use std::collections::BTreeMap;
use stratus_domain::QuotaMode;
use stratus_shared::{ErrorCode, ErrorEnvelope, REDACTED, is_secret_key};

/// Env var: quota enforcement mode (`0`..`3` or `disabled|log|block|probabilistic`).
pub const ENV_QUOTA_MODE: &str = "STRATUS_QUOTA_MODE";
/// Env var: actual-usage cache lifetime in seconds.
pub const ENV_QUOTA_CACHE_EXPIRY_SECS: &str = "STRATUS_QUOTA_CACHE_EXPIRY_SECS";
/// Env var: plan selection as CSV (`owm=developer,wug=commercial`).
pub const ENV_QUOTA_PLANS: &str = "STRATUS_QUOTA_PLANS";
/// Env var: platform execution-time limit in seconds.
pub const ENV_SCHEDULER_EXECUTION_TIME_LIMIT_SECS: &str =
    "STRATUS_SCHEDULER_EXECUTION_TIME_LIMIT_SECS";
/// Env var: statistics database path.
pub const ENV_STORAGE_PATH: &str = "STRATUS_STORAGE_PATH";
/// Env var: keep statistics in memory (true/false).
pub const ENV_STORAGE_IN_MEMORY: &str = "STRATUS_STORAGE_IN_MEMORY";
/// Env var: minimum log level.
pub const ENV_LOG_LEVEL: &str = "STRATUS_LOG_LEVEL";
/// Env var: log sink (`json` | `tracing`).
pub const ENV_LOG_SINK: &str = "STRATUS_LOG_SINK";

const ALL_ENV_VARS: [&str; 8] = [
    ENV_QUOTA_MODE,
    ENV_QUOTA_CACHE_EXPIRY_SECS,
    ENV_QUOTA_PLANS,
    ENV_SCHEDULER_EXECUTION_TIME_LIMIT_SECS,
    ENV_STORAGE_PATH,
    ENV_STORAGE_IN_MEMORY,
    ENV_LOG_LEVEL,
    ENV_LOG_SINK,
];

const MAX_PLAN_ENTRIES: usize = 64;

/// Parsed env overrides. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StratusEnv {
    /// Quota enforcement mode.
    pub quota_mode: Option<QuotaMode>,
    /// Actual-usage cache lifetime.
    pub quota_cache_expiry_secs: Option<u64>,
    /// Plan selection per service.
    pub quota_plans: Option<BTreeMap<Box<str>, Box<str>>>,
    /// Platform execution-time limit.
    pub execution_time_limit_secs: Option<u64>,
    /// Statistics database path.
    pub storage_path: Option<Box<str>>,
    /// In-memory statistics.
    pub storage_in_memory: Option<bool>,
    /// Minimum log level.
    pub log_level: Option<LogLevelSetting>,
    /// Log sink.
    pub log_sink: Option<LogSinkKind>,
}

impl StratusEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            quota_mode: parse_optional_quota_mode(map, ENV_QUOTA_MODE)?,
            quota_cache_expiry_secs: parse_optional_u64(map, ENV_QUOTA_CACHE_EXPIRY_SECS)?,
            quota_plans: parse_optional_plan_csv(map, ENV_QUOTA_PLANS)?,
            execution_time_limit_secs: parse_optional_u64(
                map,
                ENV_SCHEDULER_EXECUTION_TIME_LIMIT_SECS,
            )?,
            storage_path: parse_optional_trimmed_string(map, ENV_STORAGE_PATH)?,
            storage_in_memory: parse_optional_bool(map, ENV_STORAGE_IN_MEMORY)?,
            log_level: parse_optional_enum(map, ENV_LOG_LEVEL, LogLevelSetting::parse)?,
            log_sink: parse_optional_enum(map, ENV_LOG_SINK, LogSinkKind::parse)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let mut map = BTreeMap::new();
        for name in ALL_ENV_VARS {
            if let Ok(value) = std::env::var(name) {
                map.insert(name.to_string(), value);
            }
        }
        Self::from_map(&map)
    }

    /// Returns true when no override is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: StratusConfig,
    env: &StratusEnv,
) -> Result<ValidatedStratusConfig, ErrorEnvelope> {
    let mut config = base;
    merge_env_overrides(&mut config, env);
    config.validate_and_normalize().map_err(Into::into)
}

pub(crate) fn merge_env_overrides(config: &mut StratusConfig, env: &StratusEnv) {
    if let Some(mode) = env.quota_mode {
        config.quota.mode = mode;
    }
    if let Some(secs) = env.quota_cache_expiry_secs {
        config.quota.cache_expiry_secs = secs;
    }
    if let Some(plans) = &env.quota_plans {
        for (service, plan) in plans {
            config.quota.plans.insert(service.clone(), plan.clone());
        }
    }
    if let Some(secs) = env.execution_time_limit_secs {
        config.scheduler.execution_time_limit_secs = secs;
    }
    if let Some(path) = &env.storage_path {
        config.storage.path = path.clone();
    }
    if let Some(in_memory) = env.storage_in_memory {
        config.storage.in_memory = in_memory;
    }
    if let Some(level) = env.log_level {
        config.logging.level = level;
    }
    if let Some(sink) = env.log_sink {
        config.logging.sink = sink;
    }
}

/// Typed env parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    #[error("{var} must be non-empty")]
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// Boolean env var had an invalid value.
    #[error("{var} must be a boolean")]
    InvalidBool {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Integer env var had an invalid value.
    #[error("{var} must be an integer")]
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Enum env var had an invalid value.
    #[error("{var} has an unsupported value")]
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// A plan CSV entry is not `service=plan`.
    #[error("{var} contains invalid plan entry: {entry}")]
    InvalidPlanEntry {
        /// Env var name.
        var: &'static str,
        /// Invalid entry.
        entry: String,
    },
    /// Plan CSV exceeds a safety limit.
    #[error("{var} is too large ({len} items, max {max})")]
    CsvTooLarge {
        /// Env var name.
        var: &'static str,
        /// Number of parsed items.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } => ErrorCode::new("config", "empty_env_var"),
            Self::InvalidBool { .. } => ErrorCode::new("config", "invalid_env_bool"),
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
            Self::InvalidEnum { .. } => ErrorCode::new("config", "invalid_env_enum"),
            Self::InvalidPlanEntry { .. } | Self::CsvTooLarge { .. } => {
                ErrorCode::new("config", "invalid_env_csv")
            },
        }
    }
}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            EnvParseError::EmptyValue { var } => envelope.with_metadata("env_var", var),
            EnvParseError::InvalidBool { var, value }
            | EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidEnum { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_value(var, &value)),
            EnvParseError::InvalidPlanEntry { var, entry } => envelope
                .with_metadata("env_var", var)
                .with_metadata("entry", entry),
            EnvParseError::CsvTooLarge { var, len, max } => envelope
                .with_metadata("env_var", var)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
        }
    }
}

fn raw_value<'a>(
    map: &'a BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<(&'a String, &'a str)>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    Ok(Some((raw, trimmed)))
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    Ok(raw_value(map, var)?.map(|(_, trimmed)| trimmed.to_owned().into_boxed_str()))
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    let Some((raw, trimmed)) = raw_value(map, var)? else {
        return Ok(None);
    };

    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_bool(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<bool>, EnvParseError> {
    let Some((raw, trimmed)) = raw_value(map, var)? else {
        return Ok(None);
    };

    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(EnvParseError::InvalidBool {
            var,
            value: raw.clone(),
        }),
    }
}

fn parse_optional_enum<T>(
    map: &BTreeMap<String, String>,
    var: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, EnvParseError> {
    let Some((raw, trimmed)) = raw_value(map, var)? else {
        return Ok(None);
    };

    parse(trimmed)
        .map(Some)
        .ok_or_else(|| EnvParseError::InvalidEnum {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_quota_mode(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<QuotaMode>, EnvParseError> {
    parse_optional_enum(map, var, |input| {
        match input.to_ascii_lowercase().as_str() {
            "0" | "disabled" | "off" => Some(QuotaMode::Disabled),
            "1" | "log" | "log-only" => Some(QuotaMode::LogOnly),
            "2" | "block" => Some(QuotaMode::Block),
            "3" | "probabilistic" => Some(QuotaMode::Probabilistic),
            _ => None,
        }
    })
}

fn parse_optional_plan_csv(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<BTreeMap<Box<str>, Box<str>>>, EnvParseError> {
    let Some((_, trimmed)) = raw_value(map, var)? else {
        return Ok(None);
    };

    let entries: Vec<&str> = trimmed
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();
    if entries.len() > MAX_PLAN_ENTRIES {
        return Err(EnvParseError::CsvTooLarge {
            var,
            len: entries.len(),
            max: MAX_PLAN_ENTRIES,
        });
    }

    let mut plans = BTreeMap::new();
    for entry in entries {
        let Some((service, plan)) = entry.split_once('=') else {
            return Err(EnvParseError::InvalidPlanEntry {
                var,
                entry: entry.to_owned(),
            });
        };
        let service = service.trim().to_ascii_lowercase();
        let plan = plan.trim().to_ascii_lowercase();
        if service.is_empty() || plan.is_empty() {
            return Err(EnvParseError::InvalidPlanEntry {
                var,
                entry: entry.to_owned(),
            });
        }
        plans.insert(service.into_boxed_str(), plan.into_boxed_str());
    }
    Ok(Some(plans))
}

fn redact_value(var: &str, value: &str) -> String {
    if is_secret_key(var) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn missing_vars_parse_to_none() -> Result<(), Box<dyn Error>> {
        let env = StratusEnv::from_map(&BTreeMap::new())?;
        assert!(env.is_empty());
        assert_eq!(parse_optional_u64(&BTreeMap::new(), "MISSING")?, None);
        Ok(())
    }

    #[test]
    fn quota_mode_accepts_numbers_and_names() -> Result<(), Box<dyn Error>> {
        let env = StratusEnv::from_map(&env_map(&[(ENV_QUOTA_MODE, " 2 ")]))?;
        assert_eq!(env.quota_mode, Some(QuotaMode::Block));
        let env = StratusEnv::from_map(&env_map(&[(ENV_QUOTA_MODE, "Probabilistic")]))?;
        assert_eq!(env.quota_mode, Some(QuotaMode::Probabilistic));
        let error = StratusEnv::from_map(&env_map(&[(ENV_QUOTA_MODE, "7")])).err();
        assert!(matches!(error, Some(EnvParseError::InvalidEnum { .. })));
        Ok(())
    }

    #[test]
    fn plan_csv_is_normalized_deterministically() -> Result<(), Box<dyn Error>> {
        let env = StratusEnv::from_map(&env_map(&[(
            ENV_QUOTA_PLANS,
            " WUG = Commercial, owm=developer ,owm=startup",
        )]))?;
        let plans = env.quota_plans.ok_or("missing plans")?;
        let pairs: Vec<(&str, &str)> = plans
            .iter()
            .map(|(service, plan)| (service.as_ref(), plan.as_ref()))
            .collect();
        assert_eq!(pairs, vec![("owm", "startup"), ("wug", "commercial")]);
        Ok(())
    }

    #[test]
    fn invalid_values_map_to_envelopes_with_metadata() -> Result<(), Box<dyn Error>> {
        let error = StratusEnv::from_map(&env_map(&[(ENV_QUOTA_CACHE_EXPIRY_SECS, "soon")]))
            .err()
            .ok_or("expected parse error")?;
        let envelope = ErrorEnvelope::from(error);
        assert_eq!(envelope.code, ErrorCode::new("config", "invalid_env_int"));
        assert_eq!(
            envelope.metadata.get("env_var").map(String::as_str),
            Some(ENV_QUOTA_CACHE_EXPIRY_SECS)
        );
        assert_eq!(envelope.metadata.get("value").map(String::as_str), Some("soon"));
        Ok(())
    }

    #[test]
    fn empty_values_are_rejected() {
        let error = StratusEnv::from_map(&env_map(&[(ENV_STORAGE_PATH, "  ")])).err();
        assert_eq!(
            error,
            Some(EnvParseError::EmptyValue {
                var: ENV_STORAGE_PATH
            })
        );
    }

    #[test]
    fn overrides_win_over_base_values() -> Result<(), Box<dyn Error>> {
        let env = StratusEnv::from_map(&env_map(&[
            (ENV_STORAGE_IN_MEMORY, "yes"),
            (ENV_LOG_SINK, "tracing"),
            (ENV_SCHEDULER_EXECUTION_TIME_LIMIT_SECS, "30"),
        ]))?;
        let config = apply_env_overrides(StratusConfig::default(), &env)?;
        assert!(config.storage.in_memory);
        assert_eq!(config.logging.sink, LogSinkKind::Tracing);
        assert_eq!(config.scheduler.execution_time_limit_secs, 30);
        Ok(())
    }
}
