//! Stratus configuration schema, defaults, validation, and normalization.
//!
//! - Deserialization uses `serde` (JSON or TOML).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Plan selection is resolved into a `PolicyTable` during validation.

use crate::plans::{PlanCatalog, PlanLimits, PolicyTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use stratus_domain::{CronInterval, QuotaMode, ServiceId, schedule_names};
use stratus_shared::{ErrorCode, ErrorEnvelope};

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

const CACHE_EXPIRY_MIN_SECS: u64 = 1;
const CACHE_EXPIRY_MAX_SECS: u64 = 86_400;
const STRICT_THRESHOLD_MIN_PCT: u64 = 1;
const STRICT_THRESHOLD_MAX_PCT: u64 = 99;
const SAFETY_MARGIN_MAX: u64 = 1_000;
const CACHE_MAX_ENTRIES_MIN: u64 = 1;
const CACHE_MAX_ENTRIES_MAX: u64 = 1_000_000;
const EXECUTION_LIMIT_MAX_SECS: u64 = 86_400;
const CHRONO_RETENTION_MIN_DAYS: u64 = 1;
const CHRONO_RETENTION_MAX_DAYS: u64 = 3_650;
const QUOTA_DAY_RETENTION_MIN_DAYS: u64 = 3;
const QUOTA_DAY_RETENTION_MAX_DAYS: u64 = 60;
const QUOTA_YEAR_RETENTION_MIN_DAYS: u64 = 2;
const QUOTA_YEAR_RETENTION_MAX_DAYS: u64 = 3_660;

/// Top-level stratus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct StratusConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// Admission control settings.
    pub quota: QuotaConfig,
    /// Job runner settings.
    pub scheduler: SchedulerConfig,
    /// Persistent data retention.
    pub retention: RetentionConfig,
    /// Statistics store location.
    pub storage: StorageConfig,
    /// Logger selection.
    pub logging: LoggingConfig,
    /// Watchdog maintenance schedules.
    pub schedules: SchedulesConfig,
}

impl Default for StratusConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            quota: QuotaConfig::default(),
            scheduler: SchedulerConfig::default(),
            retention: RetentionConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            schedules: SchedulesConfig::default(),
        }
    }
}

impl StratusConfig {
    /// Validate and normalize the config, resolving plans against the built-in catalog.
    pub fn validate_and_normalize(self) -> Result<ValidatedStratusConfig, ConfigSchemaError> {
        self.validate_and_normalize_with(&PlanCatalog::builtin())
    }

    /// Validate and normalize against an explicit catalog.
    pub fn validate_and_normalize_with(
        mut self,
        catalog: &PlanCatalog,
    ) -> Result<ValidatedStratusConfig, ConfigSchemaError> {
        self.validate_version()?;
        self.quota.normalize();
        self.quota.validate()?;
        self.scheduler.validate()?;
        self.retention.validate()?;
        self.storage.normalize();
        self.storage.validate()?;
        self.logging.normalize();
        self.schedules.validate()?;

        let policy = self.quota.resolve_policy(catalog)?;
        Ok(ValidatedStratusConfig { raw: self, policy })
    }

    const fn validate_version(&self) -> Result<(), ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }
        Ok(())
    }
}

/// Validated config wrapper carrying the resolved policy table.
#[derive(Debug, Clone)]
pub struct ValidatedStratusConfig {
    raw: StratusConfig,
    policy: PolicyTable,
}

impl ValidatedStratusConfig {
    /// Resolved `(service, verb)` quota table.
    #[must_use]
    pub const fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Consume the wrapper and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> StratusConfig {
        self.raw
    }
}

impl AsRef<StratusConfig> for ValidatedStratusConfig {
    fn as_ref(&self) -> &StratusConfig {
        &self.raw
    }
}

impl std::ops::Deref for ValidatedStratusConfig {
    type Target = StratusConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Parse and validate a JSON config.
pub fn parse_stratus_config_json(input: &str) -> Result<ValidatedStratusConfig, ErrorEnvelope> {
    let config: StratusConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;
    config.validate_and_normalize().map_err(Into::into)
}

/// Parse and validate a TOML config.
pub fn parse_stratus_config_toml(input: &str) -> Result<ValidatedStratusConfig, ErrorEnvelope> {
    let config: StratusConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;
    config.validate_and_normalize().map_err(Into::into)
}

/// Admission control settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct QuotaConfig {
    /// Enforcement mode: 0 disabled, 1 log-only, 2 hard-block, 3 probabilistic.
    pub mode: QuotaMode,
    /// Lifetime of cached actual usage, in seconds.
    pub cache_expiry_secs: u64,
    /// Maximum number of cached entries.
    pub cache_max_entries: u64,
    /// Fraction of the day (percent) after which the strict projection applies.
    pub strict_threshold_pct: u64,
    /// Calls added to every projection.
    pub safety_margin: u64,
    /// Lifetime of the admin alert flag, in seconds.
    pub alert_ttl_secs: u64,
    /// Plan chosen per service (`owm = "developer"`).
    pub plans: BTreeMap<Box<str>, Box<str>>,
    /// Services not in the built-in catalog.
    pub custom_services: BTreeMap<Box<str>, PlanLimits>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            mode: QuotaMode::LogOnly,
            cache_expiry_secs: 900,
            cache_max_entries: 1_024,
            strict_threshold_pct: 20,
            safety_margin: 1,
            alert_ttl_secs: 86_400,
            plans: BTreeMap::new(),
            custom_services: BTreeMap::new(),
        }
    }
}

impl QuotaConfig {
    /// Cache expiry as a `Duration`.
    #[must_use]
    pub const fn cache_expiry(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_secs)
    }

    fn normalize(&mut self) {
        self.plans = std::mem::take(&mut self.plans)
            .into_iter()
            .map(|(service, plan)| {
                (
                    service.trim().to_ascii_lowercase().into_boxed_str(),
                    plan.trim().to_ascii_lowercase().into_boxed_str(),
                )
            })
            .collect();
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_limit_u64(
            "quota",
            "cacheExpirySecs",
            self.cache_expiry_secs,
            CACHE_EXPIRY_MIN_SECS,
            CACHE_EXPIRY_MAX_SECS,
        )?;
        validate_limit_u64(
            "quota",
            "cacheMaxEntries",
            self.cache_max_entries,
            CACHE_MAX_ENTRIES_MIN,
            CACHE_MAX_ENTRIES_MAX,
        )?;
        validate_limit_u64(
            "quota",
            "strictThresholdPct",
            self.strict_threshold_pct,
            STRICT_THRESHOLD_MIN_PCT,
            STRICT_THRESHOLD_MAX_PCT,
        )?;
        validate_limit_u64("quota", "safetyMargin", self.safety_margin, 0, SAFETY_MARGIN_MAX)?;
        validate_limit_u64(
            "quota",
            "alertTtlSecs",
            self.alert_ttl_secs,
            CACHE_EXPIRY_MIN_SECS,
            CACHE_EXPIRY_MAX_SECS,
        )?;
        Ok(())
    }

    fn resolve_policy(&self, catalog: &PlanCatalog) -> Result<PolicyTable, ConfigSchemaError> {
        let mut entries = BTreeMap::new();
        for (service, plans) in catalog.services() {
            let plan = self
                .plans
                .get(service.as_str())
                .map_or(plans.default_plan.as_ref(), AsRef::as_ref);
            let Some(limits) = plans.plans.get(plan) else {
                return Err(ConfigSchemaError::UnknownPlan {
                    service: service.to_string(),
                    plan: plan.to_owned(),
                });
            };
            entries.insert(service.clone(), limits.clone());
        }
        for service in self.plans.keys() {
            let known = ServiceId::parse(service)
                .ok()
                .is_some_and(|id| catalog.service(&id).is_some());
            if !known {
                return Err(ConfigSchemaError::UnknownService {
                    service: service.to_string(),
                });
            }
        }
        for (service, limits) in &self.custom_services {
            let id =
                ServiceId::parse(service).map_err(|_| ConfigSchemaError::InvalidServiceName {
                    service: service.to_string(),
                })?;
            entries.insert(id, limits.clone());
        }
        Ok(PolicyTable::new(entries))
    }
}

/// Job runner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SchedulerConfig {
    /// Platform execution-time limit in seconds (0 = none).
    pub execution_time_limit_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            execution_time_limit_secs: 0,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_limit_u64(
            "scheduler",
            "executionTimeLimitSecs",
            self.execution_time_limit_secs,
            0,
            EXECUTION_LIMIT_MAX_SECS,
        )
    }
}

/// Persistent data retention, in days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RetentionConfig {
    /// Hourly chrono buckets.
    pub chrono_days: u64,
    /// 10-minute quota buckets.
    pub quota_day_days: u64,
    /// Compacted per-day quota rows.
    pub quota_year_days: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            chrono_days: 30,
            quota_day_days: 4,
            quota_year_days: 366,
        }
    }
}

impl RetentionConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_limit_u64(
            "retention",
            "chronoDays",
            self.chrono_days,
            CHRONO_RETENTION_MIN_DAYS,
            CHRONO_RETENTION_MAX_DAYS,
        )?;
        validate_limit_u64(
            "retention",
            "quotaDayDays",
            self.quota_day_days,
            QUOTA_DAY_RETENTION_MIN_DAYS,
            QUOTA_DAY_RETENTION_MAX_DAYS,
        )?;
        validate_limit_u64(
            "retention",
            "quotaYearDays",
            self.quota_year_days,
            QUOTA_YEAR_RETENTION_MIN_DAYS,
            QUOTA_YEAR_RETENTION_MAX_DAYS,
        )
    }
}

/// Statistics store location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct StorageConfig {
    /// SQLite database path.
    pub path: Box<str>,
    /// Keep everything in memory (nothing survives the process).
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: ".stratus/stats.db".to_owned().into_boxed_str(),
            in_memory: false,
        }
    }
}

impl StorageConfig {
    fn normalize(&mut self) {
        self.path = self.path.trim().to_owned().into_boxed_str();
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        if !self.in_memory && self.path.is_empty() {
            return Err(ConfigSchemaError::InvalidStoragePath {
                path: self.path.to_string(),
            });
        }
        Ok(())
    }
}

/// Structured log sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSinkKind {
    /// One JSON object per line on stderr.
    #[default]
    Json,
    /// Forward events to the `tracing` subscriber.
    Tracing,
}

impl LogSinkKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Tracing => "tracing",
        }
    }

    /// Parse a sink name (case-insensitive).
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "tracing" => Some(Self::Tracing),
            _ => None,
        }
    }
}

impl fmt::Display for LogSinkKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Minimum level accepted by the logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevelSetting {
    /// Debug and above.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warn and above.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevelSetting {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name (case-insensitive, `warning` accepted).
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Logger selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Minimum level.
    pub level: LogLevelSetting,
    /// Output sink.
    pub sink: LogSinkKind,
    /// Fields attached to every event (`site = "eu-west"`).
    pub base_fields: BTreeMap<Box<str>, Box<str>>,
}

impl LoggingConfig {
    fn normalize(&mut self) {
        self.base_fields.retain(|key, _| !key.trim().is_empty());
    }
}

/// One maintenance schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleToggle {
    /// Whether the watchdog keeps the schedule registered.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron interval id (`10_minutes`, `6_hours`, ...).
    pub interval: Box<str>,
}

impl ScheduleToggle {
    fn every(interval: &str) -> Self {
        Self {
            enabled: true,
            interval: interval.to_owned().into_boxed_str(),
        }
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigSchemaError> {
        if CronInterval::find(&self.interval).is_none() {
            return Err(ConfigSchemaError::UnknownInterval {
                field,
                interval: self.interval.to_string(),
            });
        }
        Ok(())
    }
}

const fn default_true() -> bool {
    true
}

/// Watchdog maintenance schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SchedulesConfig {
    /// Chrono + quota ledger flush.
    pub stats_flush: ScheduleToggle,
    /// Quota compaction and retention.
    pub quota_rotate: ScheduleToggle,
    /// Chrono retention.
    pub chrono_rotate: ScheduleToggle,
    /// Background process runner.
    pub background_processes: ScheduleToggle,
}

impl Default for SchedulesConfig {
    fn default() -> Self {
        Self {
            stats_flush: ScheduleToggle::every("10_minutes"),
            quota_rotate: ScheduleToggle::every("6_hours"),
            chrono_rotate: ScheduleToggle::every("6_hours"),
            background_processes: ScheduleToggle::every("3_minutes"),
        }
    }
}

impl SchedulesConfig {
    /// `(schedule name, toggle)` pairs in registration order.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &ScheduleToggle); 4] {
        [
            (schedule_names::STATS_FLUSH, &self.stats_flush),
            (schedule_names::QUOTA_ROTATE, &self.quota_rotate),
            (schedule_names::CHRONO_ROTATE, &self.chrono_rotate),
            (schedule_names::BACKGROUND_PROCESSES, &self.background_processes),
        ]
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        self.stats_flush.validate("statsFlush")?;
        self.quota_rotate.validate("quotaRotate")?;
        self.chrono_rotate.validate("chronoRotate")?;
        self.background_processes.validate("backgroundProcesses")
    }
}

/// Typed validation errors for the configuration schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigSchemaError {
    /// The config version is not supported by this binary.
    #[error("unsupported config version: {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version supported by this crate.
        supported: u32,
    },
    /// A numeric limit is out of bounds.
    #[error("{section}.{field} must be between {min} and {max} (got {value})")]
    LimitOutOfRange {
        /// Schema section (e.g. `quota`).
        section: &'static str,
        /// Field name in the config file (e.g. `cacheExpirySecs`).
        field: &'static str,
        /// Value provided.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
    /// `quota.plans` names a service missing from the catalog.
    #[error("quota.plans references unknown service `{service}`")]
    UnknownService {
        /// Service key.
        service: String,
    },
    /// A plan name is not offered by the service.
    #[error("service `{service}` has no plan `{plan}`")]
    UnknownPlan {
        /// Service key.
        service: String,
        /// Plan name.
        plan: String,
    },
    /// A custom service key is not a valid service id.
    #[error("quota.customServices key `{service}` is not a valid service id")]
    InvalidServiceName {
        /// Service key.
        service: String,
    },
    /// A schedule names an interval outside the registered family.
    #[error("schedules.{field} uses unknown interval `{interval}`")]
    UnknownInterval {
        /// Field name in the config file.
        field: &'static str,
        /// Interval id.
        interval: String,
    },
    /// Storage path is empty while persistence is enabled.
    #[error("storage.path must be non-empty unless storage.inMemory is set")]
    InvalidStoragePath {
        /// Path value.
        path: String,
    },
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::LimitOutOfRange { .. } => ErrorCode::new("config", "invalid_limit"),
            Self::UnknownService { .. } | Self::InvalidServiceName { .. } => {
                ErrorCode::new("config", "invalid_service")
            },
            Self::UnknownPlan { .. } => ErrorCode::new("config", "unknown_plan"),
            Self::UnknownInterval { .. } => ErrorCode::new("config", "unknown_interval"),
            Self::InvalidStoragePath { .. } => ErrorCode::new("config", "invalid_storage_path"),
        }
    }
}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string())
                .with_metadata("min", min.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::UnknownService { service }
            | ConfigSchemaError::InvalidServiceName { service } => {
                envelope.with_metadata("service", service)
            },
            ConfigSchemaError::UnknownPlan { service, plan } => envelope
                .with_metadata("service", service)
                .with_metadata("plan", plan),
            ConfigSchemaError::UnknownInterval { field, interval } => envelope
                .with_metadata("field", field)
                .with_metadata("interval", interval),
            ConfigSchemaError::InvalidStoragePath { path } => envelope.with_metadata("path", path),
        }
    }
}

const fn validate_limit_u64(
    section: &'static str,
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<(), ConfigSchemaError> {
    if value < min || value > max {
        return Err(ConfigSchemaError::LimitOutOfRange {
            section,
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_domain::{QuotaLimits, Verb};

    #[test]
    fn defaults_validate() -> Result<(), ConfigSchemaError> {
        let config = StratusConfig::default().validate_and_normalize()?;
        assert_eq!(config.quota.cache_expiry_secs, 900);
        assert_eq!(config.quota.mode, QuotaMode::LogOnly);
        let owm = ServiceId::parse("owm").map_err(|_| ConfigSchemaError::UnknownService {
            service: "owm".into(),
        })?;
        assert_eq!(
            config.policy().limits(&owm, Verb::Get),
            Some(QuotaLimits::new(1_000, 60))
        );
        Ok(())
    }

    #[test]
    fn plan_selection_is_normalized() -> Result<(), ConfigSchemaError> {
        let mut config = StratusConfig::default();
        config
            .quota
            .plans
            .insert(" OWM ".into(), "Developer".into());
        let validated = config.validate_and_normalize()?;
        assert_eq!(
            validated.quota.plans.get("owm").map(AsRef::as_ref),
            Some("developer")
        );
        Ok(())
    }

    #[test]
    fn unknown_plan_is_rejected() {
        let mut config = StratusConfig::default();
        config.quota.plans.insert("owm".into(), "platinum".into());
        let error = config.validate_and_normalize().err();
        assert!(matches!(
            error,
            Some(ConfigSchemaError::UnknownPlan { ref plan, .. }) if plan == "platinum"
        ));
    }

    #[test]
    fn out_of_range_values_map_to_envelopes() -> Result<(), Box<dyn std::error::Error>> {
        let mut config = StratusConfig::default();
        config.quota.strict_threshold_pct = 0;
        let error = config
            .validate_and_normalize()
            .err()
            .ok_or("expected validation failure")?;
        let envelope = ErrorEnvelope::from(error);
        assert_eq!(envelope.code, ErrorCode::new("config", "invalid_limit"));
        assert_eq!(
            envelope.metadata.get("field").map(String::as_str),
            Some("strictThresholdPct")
        );
        Ok(())
    }

    #[test]
    fn unknown_intervals_are_rejected() {
        let mut config = StratusConfig::default();
        config.schedules.stats_flush.interval = "7_minutes".into();
        assert!(matches!(
            config.validate_and_normalize(),
            Err(ConfigSchemaError::UnknownInterval { field: "statsFlush", .. })
        ));
    }
}
