//! Quota inspection E2E tests.

use std::process::{Command, Output};
use std::{fs, io};

fn stratus(args: &[&str], env: &[(&str, &str)]) -> io::Result<Output> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_stratus"));
    command.args(args).env("STRATUS_STORAGE_IN_MEMORY", "true");
    for (key, value) in env {
        command.env(key, value);
    }
    command.output()
}

fn json_stdout(output: &Output) -> io::Result<serde_json::Value> {
    serde_json::from_slice(&output.stdout).map_err(io::Error::other)
}

#[test]
fn report_follows_plan_selection_from_env() -> io::Result<()> {
    let output = stratus(
        &["--output", "json", "quota", "report", "--service", "owm"],
        &[("STRATUS_QUOTA_PLANS", "owm=developer")],
    )?;
    assert!(output.status.success());

    let value = json_stdout(&output)?;
    let services = value["quota"]["services"]
        .as_array()
        .ok_or_else(|| io::Error::other("missing services"))?;
    assert_eq!(services.len(), 1);
    let get = services
        .first()
        .and_then(|service| service["verbs"].as_array())
        .and_then(|verbs| verbs.iter().find(|verb| verb["verb"] == "GET"))
        .ok_or_else(|| io::Error::other("missing GET entry"))?;
    assert_eq!(get["limits"]["count"], 100_000);
    assert_eq!(get["delta"], 0);
    Ok(())
}

#[test]
fn check_evaluates_at_a_frozen_instant() -> io::Result<()> {
    let output = stratus(
        &[
            "--output",
            "json",
            "quota",
            "check",
            "--service",
            "wug",
            "--at",
            "2026-06-01T12:00:00+02:00",
        ],
        &[("STRATUS_QUOTA_MODE", "2")],
    )?;
    assert!(output.status.success());

    let value = json_stdout(&output)?;
    let check = &value["check"];
    assert_eq!(check["service"], "wug");
    assert_eq!(check["mode"], 2);
    assert_eq!(check["evaluation"]["wouldAdmit"], true);
    assert_eq!(check["evaluation"]["usage"]["rolling"], 0);
    Ok(())
}

#[test]
fn pairs_without_quota_report_no_evaluation() -> io::Result<()> {
    let output = stratus(
        &["quota", "check", "--service", "owm", "--verb", "delete"],
        &[],
    )?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("quota: none\n"));
    assert!(stdout.contains("admit: true\n"));
    Ok(())
}

#[test]
fn file_store_survives_repeated_maintenance() -> io::Result<()> {
    let dir = std::env::temp_dir().join(format!("stratus-quota-e2e-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let db = dir.join("stats.db");
    let db_path = db.to_string_lossy().to_string();

    for _ in 0..2 {
        let output = Command::new(env!("CARGO_BIN_EXE_stratus"))
            .args(["--agent", "maintenance"])
            .env("STRATUS_STORAGE_IN_MEMORY", "false")
            .env("STRATUS_STORAGE_PATH", &db_path)
            .output()?;
        assert!(output.status.success());
    }
    let exists = db.exists();
    let _ = fs::remove_dir_all(&dir);
    assert!(exists, "database file should be created");
    Ok(())
}
