use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ssh_fleet_probe::cli::{Cli, apply_overrides, expand_path, resolve_config, run_probe};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.log_file.as_deref())?;

    let mut config = resolve_config(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli).context("Invalid command-line options")?;

    info!(
        workers = config.dispatch.effective_workers(),
        commands = config.dispatch.commands.len(),
        "Configuration loaded"
    );

    let mut stdout = std::io::stdout().lock();
    let summary = run_probe(&config, &cli.hosts, !cli.no_header, &mut stdout)
        .await
        .with_context(|| format!("Failed to probe hosts from {}", cli.hosts.display()))?;

    if summary.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            failed = summary.failures.len(),
            total = summary.total,
            "Some hosts could not be probed"
        );
        Ok(ExitCode::FAILURE)
    }
}

/// Logs go to stderr unless a log file is given, so stdout only carries
/// the report.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_file {
        Some(path) => {
            let path = expand_path(path);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}
