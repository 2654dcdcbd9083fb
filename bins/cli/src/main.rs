//! CLI binary entrypoint.

mod commands;
mod error;
mod format;

use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::{
    run_config_check, run_config_show, run_info, run_maintenance, run_quota_check,
    run_quota_report, run_scheduler,
};
use error::{CliError, ExitCode};
use format::{OutputArgs, OutputMode};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use stratus_config::{LogSinkKind, LoggingConfig, ValidatedStratusConfig};
use stratus_infra::{ConfigRendering, REDACTED, is_secret_key, load_effective_config};
use stratus_shared::ErrorEnvelope;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "stratus",
    version,
    about = "Quota-aware scheduler for weather API ingestion",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where the effective config comes from (env always applies on top).
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Optional config file path (JSON/TOML).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Optional JSON overrides (partial config).
    #[arg(long)]
    pub overrides_json: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show build and version details.
    Info,
    /// Start the watchdog and run until Ctrl-C.
    Run {
        #[command(flatten)]
        source: SourceArgs,
        /// Seed of the probabilistic admission generator.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Flush pending statistics and rotate the quota tables once.
    Maintenance {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Quota inspection commands.
    Quota {
        #[command(subcommand)]
        command: QuotaCommands,
    },
    /// Config-related commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
enum QuotaCommands {
    /// Show usage and limits per service and verb.
    Report {
        /// Restrict the report to one service.
        #[arg(long)]
        service: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Show what admission control would decide for one call.
    Check {
        /// Service identifier (e.g. `owm`).
        #[arg(long)]
        service: String,
        /// HTTP verb (`GET`, `POST`, ...).
        #[arg(long, default_value = "GET")]
        verb: String,
        /// Evaluate at this RFC 3339 instant instead of now.
        #[arg(long)]
        at: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Validate config loading, merging, and plan resolution.
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Show the effective config after applying overrides.
    Show {
        #[command(flatten)]
        source: SourceArgs,
        /// Rendering of the config in text mode.
        #[arg(long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConfigFormat {
    Json,
    Toml,
}

impl From<ConfigFormat> for ConfigRendering {
    fn from(value: ConfigFormat) -> Self {
        match value {
            ConfigFormat::Json => Self::Json,
            ConfigFormat::Toml => Self::Toml,
        }
    }
}

/// Rendered command result.
#[derive(Debug)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: ExitCode,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mode = OutputMode::from_args(&cli.output);

    match run(&cli.command, mode) {
        Ok(output) => match write_output(&output) {
            Ok(()) => std::process::ExitCode::from(output.exit_code.as_u8()),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    std::process::ExitCode::from(error.exit_code().as_u8())
}

fn run(command: &Commands, mode: OutputMode) -> Result<CliOutput, CliError> {
    let env = collect_scoped_env("STRATUS_");
    match command {
        Commands::Info => run_info(mode),
        Commands::Run { source, seed } => run_scheduler(mode, &env, source, *seed),
        Commands::Maintenance { source } => run_maintenance(mode, &env, source),
        Commands::Quota { command } => match command {
            QuotaCommands::Report { service, source } => {
                run_quota_report(mode, &env, source, service.as_deref())
            },
            QuotaCommands::Check {
                service,
                verb,
                at,
                source,
            } => run_quota_check(mode, &env, source, service, verb, at.as_deref()),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Check { source } => run_config_check(mode, &env, source),
            ConfigCommands::Show { source, format } => {
                run_config_show(mode, &env, source, (*format).into())
            },
        },
    }
}

/// Load the effective config for a runtime command.
pub(crate) fn load_config(
    env: &BTreeMap<String, String>,
    source: &SourceArgs,
) -> Result<ValidatedStratusConfig, ErrorEnvelope> {
    load_effective_config(
        env,
        source.config.as_deref(),
        source.overrides_json.as_deref(),
    )
}

/// Multi-threaded runtime hosting the scheduler for one command.
pub(crate) fn tokio_runtime() -> Result<tokio::runtime::Runtime, CliError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Install the global `tracing` subscriber when the tracing sink is selected.
///
/// `RUST_LOG` takes precedence over `logging.level`.
pub(crate) fn init_tracing(logging: &LoggingConfig, mode: OutputMode) {
    if logging.sink != LogSinkKind::Tracing {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if mode.is_machine() {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init()
    };
    if let Err(error) = installed {
        let _ = writeln!(io::stderr(), "warn: tracing subscriber not installed: {error}");
    }
}

pub(crate) fn format_error_output(mode: OutputMode, error: &ErrorEnvelope) -> CliOutput {
    let error = sanitize_error(error.clone());

    let mut stderr = String::new();
    log_info(&mut stderr, "command failed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_error(&error)
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": "error",
            "error": error,
        });

        // This is a CLI boundary, so JSON serialization errors are internal.
        let mut output = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\"}}".to_string()
        });
        output.push('\n');
        output
    } else {
        format_error_text(&error)
    };

    CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::for_envelope(&error),
    }
}

fn sanitize_error(mut error: ErrorEnvelope) -> ErrorEnvelope {
    for (key, value) in &mut error.metadata {
        if is_secret_key(key) {
            *value = REDACTED.to_string();
        }
    }
    error
}

fn format_error_text(error: &ErrorEnvelope) -> String {
    let mut out = String::new();
    out.push_str("status: error\n");
    out.push_str("code: ");
    out.push_str(&error.code.to_string());
    out.push('\n');
    out.push_str("message: ");
    out.push_str(&error.message);
    out.push('\n');
    out.push_str("kind: ");
    out.push_str(&error.kind.to_string());
    out.push('\n');

    if !error.metadata.is_empty() {
        out.push_str("meta:\n");
        for (key, value) in &error.metadata {
            out.push_str("  ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
    }

    out
}

pub(crate) fn log_info(stderr: &mut String, message: &str, no_progress: bool) {
    if no_progress {
        return;
    }
    stderr.push_str("info: ");
    stderr.push_str(message);
    stderr.push('\n');
}

/// Render an `ok` payload: pretty JSON, one NDJSON summary line, or nothing in text mode.
pub(crate) fn format_ok_payload(
    mode: OutputMode,
    kind: &str,
    body: serde_json::Value,
) -> Result<Option<String>, CliError> {
    if mode.is_ndjson() {
        return Ok(Some(format_ndjson_summary("ok", kind, Some(body))));
    }
    if !mode.is_json() {
        return Ok(None);
    }
    let mut payload = serde_json::Map::new();
    payload.insert(
        "status".to_string(),
        serde_json::Value::String("ok".to_string()),
    );
    if let serde_json::Value::Object(map) = body {
        payload.extend(map);
    }
    let mut output = serde_json::to_string_pretty(&serde_json::Value::Object(payload))?;
    output.push('\n');
    Ok(Some(output))
}

fn format_ndjson_summary(status: &str, kind: &str, extra: Option<serde_json::Value>) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert(
        "type".to_string(),
        serde_json::Value::String("summary".to_string()),
    );
    payload.insert(
        "status".to_string(),
        serde_json::Value::String(status.to_string()),
    );
    payload.insert(
        "kind".to_string(),
        serde_json::Value::String(kind.to_string()),
    );
    if let Some(serde_json::Value::Object(map)) = extra {
        for (key, value) in map {
            payload.insert(key, value);
        }
    }
    let mut out = serde_json::to_string(&serde_json::Value::Object(payload)).unwrap_or_else(|_| {
        "{\"type\":\"summary\",\"status\":\"error\",\"kind\":\"internal\"}".to_string()
    });
    out.push('\n');
    out
}

fn format_ndjson_error(error: &ErrorEnvelope) -> String {
    let payload = serde_json::json!({
        "type": "error",
        "status": "error",
        "error": error,
    });
    let mut out = serde_json::to_string(&payload).unwrap_or_else(|_| {
        "{\"type\":\"error\",\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\"}}".to_string()
    });
    out.push('\n');
    out
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;

    if !output.stderr.is_empty() {
        let mut stderr = io::stderr();
        stderr.write_all(output.stderr.as_bytes())?;
        stderr.flush()?;
    }

    Ok(())
}

fn collect_scoped_env(prefix: &str) -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(prefix))
        .collect()
}
