//! src/main.rs
//! Command-line shell over the share core: one operation per invocation

use std::{panic::PanicHookInfo, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use smbx_core::{
    config::Config, controller::share_service::ShareService, logging::LoggerBuilder,
    tasks::transfer_task::TransferProgress,
};

/// Browse, transfer and preview files on mounted SMB shares, or wake a host.
#[derive(Debug, Parser)]
#[command(name = "smbx", version, about)]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding `<server>/<share>/...` mounts
    #[arg(long, value_name = "DIR")]
    mount_root: Option<PathBuf>,

    #[arg(long, short = 'u')]
    user: Option<String>,

    #[arg(long, short = 'p', requires = "user")]
    password: Option<String>,

    /// Log level directive, e.g. `debug` or `smbx_core=trace`
    #[arg(long)]
    log_level: Option<String>,

    /// Echo log events to stderr
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Operation name, e.g. `listEntries`, `upload`, `wakeOnLan`
    method: String,

    /// Positional operation arguments; numbers and `null` are passed as JSON
    args: Vec<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    setup_panic_handler();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", json!({ "error": format!("{e:#}") }));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config: Config = match &cli.config {
        Some(path) => Config::load_from(path).await,
        None => Config::load().await,
    }
    .context("Failed to load config")?;

    apply_overrides(&mut config, &cli);

    let _guard: WorkerGuard = LoggerBuilder::new()
        .with_config(config.logging.clone())
        .with_stderr(cli.verbose || config.logging.stderr)
        .build()
        .await
        .context("Failed to initialize logging")?;

    info!(
        marker = "CLI",
        operation_type = "start",
        method = %cli.method,
        args = cli.args.len(),
        mount_root = %config.share.mount_root.display(),
        "smbx invoked"
    );

    let service: ShareService = ShareService::from_config(&config);
    let args: Vec<Value> = cli.args.iter().map(|a: &String| to_json_arg(a)).collect();

    let outcome: Result<Value, String> = tokio::select! {
        res = service.call(&cli.method, &args, print_progress) => res,

        _ = tokio::signal::ctrl_c() => {
            warn!(marker = "CLI", operation_type = "interrupt", "Interrupted by user");
            Err("Interrupted".to_owned())
        }
    };

    match outcome {
        Ok(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(ExitCode::SUCCESS)
        }

        Err(message) => {
            eprintln!("{}", json!({ "error": message }));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(root) = &cli.mount_root {
        config.share.mount_root = root.clone();
    }

    if let Some(user) = &cli.user {
        config.share.username = user.clone();
        config.share.password = cli.password.clone().unwrap_or_default();
    }

    if let Some(level) = &cli.log_level {
        config.logging.log_level = level.as_str().into();
    }
}

/// Numbers and `null` go through as JSON; everything else is a string.
fn to_json_arg(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Null)) => v,
        _ => Value::String(raw.to_owned()),
    }
}

fn print_progress(progress: TransferProgress) {
    eprintln!(
        "{}",
        json!({
            "transferred": progress.transferred,
            "total": progress.total,
            "fraction": progress.fraction(),
        })
    );
}

fn setup_panic_handler() {
    let original_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        error!("smbx panicked: {}", panic_info);
        original_hook(panic_info);
    }));
}
