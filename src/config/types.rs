use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::ConnectOptions;
use sqlx::any::AnyConnectOptions;
use sqlx::postgres::PgConnectOptions;
use zeroize::Zeroizing;

use crate::error::{FleetError, Result};

/// Remote command that reports the number of processors on a Linux host.
pub const PROBE_COMMAND: &str = "grep -c ^processor /proc/cpuinfo";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Connection settings for the relational key store.
///
/// Either `url` is given (any driver sqlx's `Any` backend understands,
/// e.g. `postgres://...` or `sqlite://...`), or the discrete
/// `host`/`port`/`name`/`user`/`password` fields describe a `PostgreSQL`
/// server. `url` wins when both are present.
///
/// Secrets are wrapped in [`Zeroizing`] so they are erased when the
/// config is dropped.
#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<Zeroizing<String>>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<Zeroizing<String>>,

    /// Table holding one private key per host
    #[serde(default = "default_table")]
    pub table: String,

    /// Column matched exactly against the hostname
    #[serde(default = "default_host_column")]
    pub host_column: String,

    /// Column holding the PEM/OpenSSH private key text
    #[serde(default = "default_key_column")]
    pub key_column: String,
}

/// Keeps the driver scheme and hides everything after it, since the
/// URL may embed credentials
fn redact_url(url: &str) -> String {
    match url.split_once(':') {
        Some((scheme, _)) => format!("{scheme}:***"),
        None => "***".to_string(),
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|url| redact_url(url)))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("table", &self.table)
            .field("host_column", &self.host_column)
            .field("key_column", &self.key_column)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: default_db_port(),
            name: None,
            user: None,
            password: None,
            table: default_table(),
            host_column: default_host_column(),
            key_column: default_key_column(),
        }
    }
}

impl DatabaseConfig {
    /// Build driver-agnostic connect options for the key store.
    ///
    /// # Errors
    ///
    /// Returns an error if neither a URL nor the discrete `PostgreSQL`
    /// settings are present, or if the URL cannot be parsed.
    pub fn connect_options(&self) -> Result<AnyConnectOptions> {
        if let Some(url) = &self.url {
            return AnyConnectOptions::from_str(url.as_str()).map_err(|e| {
                FleetError::ConfigInvalid {
                    field: "database.url".to_string(),
                    reason: e.to_string(),
                }
            });
        }

        let (Some(host), Some(name), Some(user)) = (&self.host, &self.name, &self.user) else {
            return Err(FleetError::ConfigInvalid {
                field: "database".to_string(),
                reason: "set either 'url' or 'host', 'name' and 'user'".to_string(),
            });
        };

        let mut pg = PgConnectOptions::new()
            .host(host)
            .port(self.port)
            .database(name)
            .username(user);
        if let Some(password) = &self.password {
            pg = pg.password(password.as_str());
        }

        AnyConnectOptions::from_url(&pg.to_url_lossy()).map_err(|e| FleetError::ConfigInvalid {
            field: "database".to_string(),
            reason: e.to_string(),
        })
    }

    /// The lookup statement, with the hostname bound as `$1`.
    #[must_use]
    pub fn lookup_query(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} = $1",
            self.key_column, self.table, self.host_column
        )
    }
}

const fn default_db_port() -> u16 {
    5432
}

fn default_table() -> String {
    "keys".to_string()
}

fn default_host_column() -> String {
    "host".to_string()
}

fn default_key_column() -> String {
    "key".to_string()
}

/// SSH connection settings shared by every session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    #[serde(default = "default_keepalive")]
    pub keepalive_interval_seconds: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default)]
    pub host_key_verification: HostKeyVerification,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: default_ssh_port(),
            connection_timeout_seconds: default_connection_timeout(),
            command_timeout_seconds: default_command_timeout(),
            keepalive_interval_seconds: default_keepalive(),
            max_output_bytes: default_max_output_bytes(),
            host_key_verification: HostKeyVerification::default(),
        }
    }
}

const fn default_ssh_port() -> u16 {
    22
}

const fn default_connection_timeout() -> u64 {
    500
}

const fn default_command_timeout() -> u64 {
    500
}

const fn default_keepalive() -> u64 {
    30
}

const fn default_max_output_bytes() -> usize {
    1024 * 1024
}

/// Host key verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Strict: reject unknown hosts, reject mismatched keys
    Strict,
    /// Accept new: add unknown hosts to `known_hosts`, reject mismatched keys
    #[default]
    AcceptNew,
    /// Off: accept all keys (insecure, for testing only)
    Off,
}

/// How the fleet is fanned out and what runs on each host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Concurrent host tasks. Defaults to the machine's available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Commands run in order on every host. Only the first line of each
    /// command's output is kept.
    #[serde(default = "default_commands")]
    pub commands: Vec<String>,

    /// Treat a non-zero remote exit status as a failure for that host.
    #[serde(default = "default_check_exit_status")]
    pub check_exit_status: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: None,
            commands: default_commands(),
            check_exit_status: default_check_exit_status(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        })
    }
}

fn default_commands() -> Vec<String> {
    vec![PROBE_COMMAND.to_string()]
}

const fn default_check_exit_status() -> bool {
    true
}
