//! CLI E2E smoke tests.

use std::io;
use std::process::{Command, Output};

fn stratus(args: &[&str]) -> io::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_stratus"))
        .args(args)
        .env("STRATUS_STORAGE_IN_MEMORY", "true")
        .env_remove("STRATUS_STORAGE_PATH")
        .output()
}

fn json_stdout(output: &Output) -> io::Result<serde_json::Value> {
    serde_json::from_slice(&output.stdout).map_err(io::Error::other)
}

#[test]
fn info_output_is_deterministic() -> io::Result<()> {
    let first = stratus(&["--output", "json", "info"])?;
    let second = stratus(&["--output", "json", "info"])?;
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout, "info output should be deterministic");

    let value = json_stdout(&first)?;
    assert_eq!(value["status"], "ok");
    assert_eq!(value["build"]["name"], "stratus-cli");
    let services = value["services"]
        .as_array()
        .ok_or_else(|| io::Error::other("missing services"))?;
    assert!(services.iter().any(|service| service == "owm"));
    Ok(())
}

#[test]
fn maintenance_runs_against_an_in_memory_store() -> io::Result<()> {
    let output = stratus(&["--agent", "maintenance"])?;
    assert!(output.status.success());

    let value = json_stdout(&output)?;
    assert_eq!(value["type"], "summary");
    assert_eq!(value["kind"], "maintenance");
    assert_eq!(value["maintenance"]["quotaFailed"], 0);
    Ok(())
}

#[test]
fn unknown_subcommand_is_rejected() -> io::Result<()> {
    let output = stratus(&["reindex"])?;
    assert!(!output.status.success());
    Ok(())
}
