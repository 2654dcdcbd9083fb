//! Config loading helpers for CLI surfaces.

use crate::InfraResult;
use std::collections::BTreeMap;
use std::path::Path;
use stratus_config::{
    StratusEnv, ValidatedStratusConfig, load_stratus_config_from_path, to_pretty_json,
    to_pretty_toml,
};
use stratus_shared::ErrorEnvelope;

/// Serialization of the effective config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigRendering {
    /// Pretty JSON.
    Json,
    /// Pretty TOML.
    Toml,
}

/// Load and validate the effective config from an env map, a file, and JSON overrides.
pub fn load_effective_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<ValidatedStratusConfig> {
    let env = StratusEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    load_stratus_config_from_path(config_path, overrides_json, &env)
}

/// Load and validate the effective config, returning it in deterministic pretty form.
pub fn load_effective_config_text(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    rendering: ConfigRendering,
) -> InfraResult<String> {
    let config = load_effective_config(env, config_path, overrides_json)?;
    match rendering {
        ConfigRendering::Json => to_pretty_json(&config),
        ConfigRendering::Toml => to_pretty_toml(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_reach_the_rendered_config() -> InfraResult<()> {
        let env = BTreeMap::from([
            ("STRATUS_QUOTA_MODE".to_owned(), "2".to_owned()),
            ("STRATUS_STORAGE_IN_MEMORY".to_owned(), "true".to_owned()),
        ]);
        let json = load_effective_config_text(&env, None, None, ConfigRendering::Json)?;
        let value: serde_json::Value = serde_json::from_str(&json).map_err(|error| {
            ErrorEnvelope::expected(stratus_shared::ErrorCode::invalid_input(), error.to_string())
        })?;
        assert_eq!(value["quota"]["mode"], 2);
        assert_eq!(value["storage"]["inMemory"], true);
        Ok(())
    }

    #[test]
    fn overrides_json_is_validated() {
        let result = load_effective_config(
            &BTreeMap::new(),
            None,
            Some(r#"{"retention":{"chronoDays":0}}"#),
        );
        assert!(result.is_err());
    }
}
