//! CLI runner functions
//!
//! Glue between parsed arguments and the domain: config resolution,
//! overrides and the fleet run itself.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::{Config, default_config_path, load_config};
use crate::domain::{DispatchSettings, DispatchSummary, FleetDispatcher, read_host_list};
use crate::error::{FleetError, Result};
use crate::keystore::SqlKeyStore;
use crate::ssh::RealSshConnector;

/// First line printed before any report
pub const REPORT_HEADER: &str = "Hostname\t:\t#cpu_cores";

/// Expand a leading `~` in a user-supplied path
#[must_use]
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

/// Load the configuration named on the command line, or the default one
///
/// An explicit path must exist. A missing default file falls back to the
/// built-in defaults, which still need a `database` section to be useful.
///
/// # Errors
///
/// Returns an error if the chosen file cannot be read, parsed or
/// validated.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(&expand_path(path));
    }

    let path = default_config_path();
    if path.exists() {
        load_config(&path)
    } else {
        warn!(path = %path.display(), "No configuration file found, using defaults");
        Ok(Config::default())
    }
}

/// Fold command-line overrides into the loaded configuration
///
/// # Errors
///
/// Returns `ConfigInvalid` if an overriding command is blank.
pub fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(workers) = cli.workers {
        config.dispatch.workers = Some(usize::try_from(workers).unwrap_or(usize::MAX));
    }

    if !cli.commands.is_empty() {
        if cli.commands.iter().any(|c| c.trim().is_empty()) {
            return Err(FleetError::ConfigInvalid {
                field: "--command".to_string(),
                reason: "commands must not be blank".to_string(),
            });
        }
        config.dispatch.commands.clone_from(&cli.commands);
    }

    Ok(())
}

/// Probe every host listed in `hosts` and write the report to `out`
///
/// # Errors
///
/// Fails only on setup problems: an unreadable host list, unusable
/// database settings or a failed header write. Per-host failures are
/// returned in the summary.
pub async fn run_probe<W: Write>(
    config: &Config,
    hosts: &Path,
    header: bool,
    out: &mut W,
) -> Result<DispatchSummary> {
    let hosts = expand_path(hosts);
    let records = read_host_list(&hosts)?;
    info!(path = %hosts.display(), records = records.len(), "Host list loaded");

    let key_store = Arc::new(SqlKeyStore::from_config(&config.database)?);
    let connector = Arc::new(RealSshConnector::new());
    let dispatcher = FleetDispatcher::new(key_store, connector, DispatchSettings::from_config(config));

    if header {
        writeln!(out, "{REPORT_HEADER}")?;
        out.flush()?;
    }

    Ok(dispatcher.dispatch_all(records, out).await)
}
