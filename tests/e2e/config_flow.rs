//! Config E2E tests: file, overrides, and env precedence.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::{fs, io};

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

fn stratus(args: &[&str], config: Option<&Path>, env: &[(&str, &str)]) -> io::Result<Output> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_stratus"));
    command.args(args);
    if let Some(path) = config {
        command.arg("--config").arg(path);
    }
    for (key, value) in env {
        command.env(key, value);
    }
    command.output()
}

fn json_stdout(output: &Output) -> io::Result<serde_json::Value> {
    serde_json::from_slice(&output.stdout).map_err(io::Error::other)
}

#[test]
fn valid_config_resolves_plans_and_custom_services() -> io::Result<()> {
    let path = fixture_path("config/stratus.valid.json");
    let output = stratus(&["--output", "json", "config", "check"], Some(&path), &[])?;
    assert!(output.status.success());

    let value = json_stdout(&output)?;
    assert_eq!(value["status"], "ok");
    let services = value["services"]
        .as_array()
        .ok_or_else(|| io::Error::other("missing services"))?;
    assert!(services.iter().any(|service| service == "meteoblue"));
    assert!(services.iter().any(|service| service == "owm"));
    Ok(())
}

#[test]
fn env_beats_overrides_and_file() -> io::Result<()> {
    let path = fixture_path("config/stratus.valid.json");
    let output = stratus(
        &[
            "--output",
            "json",
            "config",
            "show",
            "--overrides-json",
            r#"{"quota":{"mode":3},"scheduler":{"executionTimeLimitSecs":45}}"#,
        ],
        Some(&path),
        &[("STRATUS_QUOTA_MODE", "0")],
    )?;
    assert!(output.status.success());

    let value = json_stdout(&output)?;
    let effective = &value["effectiveConfig"];
    assert_eq!(effective["quota"]["mode"], 0);
    assert_eq!(effective["scheduler"]["executionTimeLimitSecs"], 45);
    assert_eq!(effective["quota"]["cacheExpirySecs"], 600);
    Ok(())
}

#[test]
fn invalid_configs_exit_with_invalid_input() -> io::Result<()> {
    for fixture in ["config/stratus.invalid.json", "config/stratus.unknown-plan.toml"] {
        let path = fixture_path(fixture);
        let output = stratus(&["config", "check"], Some(&path), &[])?;
        assert_eq!(output.status.code(), Some(2), "fixture {fixture}");
        assert!(String::from_utf8_lossy(&output.stdout).contains("status: error"));
    }
    Ok(())
}

#[test]
fn toml_rendering_round_trips_through_a_file() -> io::Result<()> {
    let output = stratus(&["config", "show", "--format", "toml", "--no-progress"], None, &[])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let toml = stdout
        .strip_prefix("status: ok\nconfig:\n")
        .ok_or_else(|| io::Error::other("missing header"))?;

    let dir = std::env::temp_dir().join(format!("stratus-e2e-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let path = dir.join("effective.toml");
    fs::write(&path, toml)?;

    let output = stratus(&["config", "check"], Some(&path), &[])?;
    let _ = fs::remove_dir_all(&dir);
    assert!(output.status.success());
    Ok(())
}
