use super::types::{Config, DatabaseConfig};
use crate::error::{FleetError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Load configuration from a YAML file
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file does not exist
/// - The file cannot be read
/// - The YAML content is invalid or cannot be parsed
/// - The configuration fails validation (e.g., no database, zero workers)
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(FleetError::ConfigNotFound {
            path: path.display().to_string(),
        });
    }

    // Database credentials live in this file
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.mode() & 0o777;
            if mode & 0o037 != 0 {
                warn!(
                    config_path = %path.display(),
                    permissions = format!("{mode:04o}"),
                    "Config file may contain secrets and has permissive permissions. \
                     Consider: chmod 640 {}",
                    path.display()
                );
            }
        }
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    debug!(config_path = %path.display(), "Configuration parsed");

    Ok(config)
}

/// Parse and validate configuration from YAML text
///
/// # Errors
///
/// Returns an error if the YAML is malformed or fails validation.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = serde_saphyr::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration
fn validate_config(config: &Config) -> Result<()> {
    validate_database(&config.database)?;

    if config.ssh.connection_timeout_seconds == 0 {
        return Err(FleetError::ConfigInvalid {
            field: "ssh.connection_timeout_seconds".to_string(),
            reason: "Timeout must be greater than zero".to_string(),
        });
    }

    if config.ssh.command_timeout_seconds == 0 {
        return Err(FleetError::ConfigInvalid {
            field: "ssh.command_timeout_seconds".to_string(),
            reason: "Timeout must be greater than zero".to_string(),
        });
    }

    if config.dispatch.workers == Some(0) {
        return Err(FleetError::ConfigInvalid {
            field: "dispatch.workers".to_string(),
            reason: "At least one worker is required".to_string(),
        });
    }

    if config.dispatch.commands.is_empty() {
        return Err(FleetError::ConfigInvalid {
            field: "dispatch.commands".to_string(),
            reason: "At least one command must be defined".to_string(),
        });
    }

    if config.dispatch.commands.iter().any(|c| c.trim().is_empty()) {
        return Err(FleetError::ConfigInvalid {
            field: "dispatch.commands".to_string(),
            reason: "Commands cannot be empty".to_string(),
        });
    }

    Ok(())
}

fn validate_database(db: &DatabaseConfig) -> Result<()> {
    // Identifiers are interpolated into the lookup statement
    for (field, value) in [
        ("database.table", &db.table),
        ("database.host_column", &db.host_column),
        ("database.key_column", &db.key_column),
    ] {
        if !is_sql_identifier(value) {
            return Err(FleetError::ConfigInvalid {
                field: field.to_string(),
                reason: format!("'{value}' is not a plain SQL identifier"),
            });
        }
    }

    db.connect_options().map(|_| ())
}

/// `name` or `schema.name`, each part `[A-Za-z_][A-Za-z0-9_]*`
fn is_sql_identifier(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Get the default config path
#[must_use]
pub fn default_config_path() -> std::path::PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("ssh-fleet-probe")
        .join("config.yaml")
}
