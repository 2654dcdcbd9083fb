//! Environment validation helpers for CLI surfaces.

use std::collections::BTreeMap;
use stratus_config::{StratusConfig, StratusEnv, apply_env_overrides};
use stratus_shared::ErrorEnvelope;

/// Infra-level error type (shared error envelope).
pub type InfraError = ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Validate that the provided `STRATUS_*` overrides parse and merge into a valid config.
pub fn validate_env_parsing(env: &BTreeMap<String, String>) -> InfraResult<()> {
    let parsed = StratusEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    let _ = apply_env_overrides(StratusConfig::default(), &parsed)?;
    Ok(())
}
