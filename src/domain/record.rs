//! Host records
//!
//! A host list is plain text with one `hostname,username` pair per line.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{FleetError, Result};

/// One `hostname,username` pair from the fleet list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    hostname: String,
    username: String,
}

impl HostRecord {
    /// Parse a raw `host,user` line.
    ///
    /// Surrounding whitespace on the line and on each field is ignored.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` unless the line holds exactly two
    /// non-empty comma-separated fields.
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        let malformed = |reason: &str| FleetError::MalformedRecord {
            record: trimmed.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let [hostname, username] = fields.as_slice() else {
            return Err(malformed("expected exactly two fields 'hostname,username'"));
        };

        if hostname.is_empty() {
            return Err(malformed("hostname is empty"));
        }
        if username.is_empty() {
            return Err(malformed("username is empty"));
        }

        Ok(Self {
            hostname: (*hostname).to_string(),
            username: (*username).to_string(),
        })
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl FromStr for HostRecord {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.hostname)
    }
}

/// Split host-list text into raw records.
///
/// Blank lines and `#` comments are dropped. Every other line is kept
/// verbatim so malformed records still reach the dispatcher and get
/// reported against the host that produced them.
#[must_use]
pub fn parse_host_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read a host-list file.
///
/// # Errors
///
/// Returns an error if the file cannot be read as UTF-8 text.
pub fn read_host_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_host_list(&content))
}
