//! Domain primitives with validated constructors.

use serde::{Deserialize, Serialize};
use std::fmt;
use stratus_shared::{ErrorCode, ErrorEnvelope};

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// `ServiceId` is empty after trimming.
    EmptyServiceId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `ServiceId` contains characters outside `[a-z0-9_-]`.
    InvalidServiceId {
        /// Normalized service id that failed validation.
        input: String,
    },
    /// `OperationKey` is empty after trimming.
    EmptyOperationKey {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `JobKind` is empty after trimming.
    EmptyJobKind {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// Verb name is not one of GET, POST, PUT, PATCH, DELETE.
    UnknownVerb {
        /// Rejected verb name.
        input: String,
    },
    /// Quota mode outside `0..=3`.
    UnknownQuotaMode {
        /// Rejected mode value.
        value: u8,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyServiceId { .. } | Self::InvalidServiceId { .. } => {
                ErrorCode::new("domain", "invalid_service_id")
            },
            Self::EmptyOperationKey { .. } => ErrorCode::new("domain", "invalid_operation_key"),
            Self::EmptyJobKind { .. } => ErrorCode::new("domain", "invalid_job_kind"),
            Self::UnknownVerb { .. } => ErrorCode::new("domain", "unknown_verb"),
            Self::UnknownQuotaMode { .. } => ErrorCode::new("domain", "unknown_quota_mode"),
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyServiceId { .. } => formatter.write_str("ServiceId must be non-empty"),
            Self::InvalidServiceId { .. } => {
                formatter.write_str("ServiceId must match /^[a-z0-9_-]+$/")
            },
            Self::EmptyOperationKey { .. } => {
                formatter.write_str("OperationKey must be non-empty")
            },
            Self::EmptyJobKind { .. } => formatter.write_str("JobKind must be non-empty"),
            Self::UnknownVerb { input } => write!(formatter, "unknown verb `{input}`"),
            Self::UnknownQuotaMode { value } => {
                write!(formatter, "quota mode must be 0..=3, got {value}")
            },
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            PrimitiveError::EmptyServiceId { input_length }
            | PrimitiveError::EmptyOperationKey { input_length }
            | PrimitiveError::EmptyJobKind { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::InvalidServiceId { input } | PrimitiveError::UnknownVerb { input } => {
                envelope.with_metadata("input", input)
            },
            PrimitiveError::UnknownQuotaMode { value } => {
                envelope.with_metadata("value", value.to_string())
            },
        }
    }
}

/// Identifier of an external quota-limited service (`owm`, `wug`, ...).
///
/// Normalized to lowercase on parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId(Box<str>);

impl ServiceId {
    /// Parse a `ServiceId` from user input.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let Some(trimmed) = trimmed_non_empty(raw) else {
            return Err(PrimitiveError::EmptyServiceId {
                input_length: raw.len(),
            });
        };
        let normalized = trimmed.to_ascii_lowercase();
        if !normalized
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(PrimitiveError::InvalidServiceId { input: normalized });
        }
        Ok(Self(normalized.into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceId {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ServiceId> for String {
    fn from(value: ServiceId) -> Self {
        value.0.into_string()
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Name of an instrumented operation (`watchdog.tick`, `job.owm-fetch`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKey(Box<str>);

impl OperationKey {
    /// Parse an `OperationKey` from user input.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let Some(trimmed) = trimmed_non_empty(raw) else {
            return Err(PrimitiveError::EmptyOperationKey {
                input_length: raw.len(),
            });
        };
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Key used for the timing of one background job kind.
    #[must_use]
    pub fn for_job(kind: &JobKind) -> Self {
        Self(format!("job.{}", kind.as_str()).into_boxed_str())
    }

    /// Key used for the timing of one named schedule.
    #[must_use]
    pub fn for_schedule(name: &str) -> Self {
        Self(format!("schedule.{}", name.trim()).into_boxed_str())
    }

    /// Key of the watchdog's own tick.
    #[must_use]
    pub fn watchdog_tick() -> Self {
        Self("watchdog.tick".into())
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for OperationKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Kind of background process, resolved through the job catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKind(Box<str>);

impl JobKind {
    /// Parse a `JobKind` from user input.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let Some(trimmed) = trimmed_non_empty(raw) else {
            return Err(PrimitiveError::EmptyJobKind {
                input_length: raw.len(),
            });
        };
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn trimmed_non_empty(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_ids_are_normalized() -> Result<(), PrimitiveError> {
        let service = ServiceId::parse("  OWM ")?;
        assert_eq!(service.as_str(), "owm");
        assert!(matches!(
            ServiceId::parse("o w m"),
            Err(PrimitiveError::InvalidServiceId { .. })
        ));
        assert!(matches!(
            ServiceId::parse(""),
            Err(PrimitiveError::EmptyServiceId { input_length: 0 })
        ));
        Ok(())
    }

    #[test]
    fn job_operation_keys_are_prefixed() -> Result<(), PrimitiveError> {
        let kind = JobKind::parse("owm-fetch")?;
        assert_eq!(OperationKey::for_job(&kind).as_str(), "job.owm-fetch");
        assert_eq!(
            OperationKey::for_schedule(" stats-flush ").as_str(),
            "schedule.stats-flush"
        );
        assert_eq!(OperationKey::watchdog_tick().as_str(), "watchdog.tick");
        Ok(())
    }

    #[test]
    fn service_id_deserialization_validates() {
        let parsed: Result<ServiceId, _> = serde_json::from_str("\"Netatmo\"");
        assert!(matches!(parsed, Ok(ref id) if id.as_str() == "netatmo"));
        let rejected: Result<ServiceId, _> = serde_json::from_str("\"bad id\"");
        assert!(rejected.is_err());
    }
}
