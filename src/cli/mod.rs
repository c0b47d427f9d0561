//! Command-line front end
//!
//! Parses arguments, folds them into the loaded configuration and drives
//! one fleet run.

mod runner;

use std::path::PathBuf;

use clap::Parser;

pub use runner::{REPORT_HEADER, apply_overrides, expand_path, resolve_config, run_probe};

/// SSH fleet probe - report CPU core counts for every host in a list
#[derive(Parser, Debug)]
#[command(name = "ssh-fleet-probe")]
#[command(about = "Query CPU core counts across a fleet of hosts over SSH")]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Probe every host in ./hostfile.txt
    ssh-fleet-probe

    # Use a specific host list and eight concurrent workers
    ssh-fleet-probe --hosts ~/fleet/hosts.txt --workers 8

    # Run other commands instead of the core count probe
    ssh-fleet-probe --command nproc --command 'uname -r'

    # Keep a log file instead of writing logs to stderr
    RUST_LOG=debug ssh-fleet-probe --log-file probe.log")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// File with one `hostname,username` record per line
    #[arg(long, default_value = "hostfile.txt")]
    pub hosts: PathBuf,

    /// Maximum number of hosts probed at once
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Command to run on each host (repeatable, replaces the configured list)
    #[arg(long = "command", value_name = "CMD")]
    pub commands: Vec<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Do not print the header line
    #[arg(long)]
    pub no_header: bool,
}
