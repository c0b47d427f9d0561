//! Server host key checks against the user's `known_hosts`

use russh::keys::known_hosts::{check_known_hosts, learn_known_hosts};
use russh::keys::{Error as KeyError, HashAlg, PublicKey};
use tracing::{debug, warn};

use crate::config::HostKeyVerification;
use crate::error::{FleetError, Result};

/// Outcome of looking a server key up in `known_hosts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Match,
    /// Host is listed with a different key at this line
    Mismatch { line: usize },
    Unknown,
}

/// Look up a server key in `known_hosts`
///
/// # Errors
///
/// Returns an error if the `known_hosts` file cannot be read or parsed.
pub fn verify(hostname: &str, port: u16, key: &PublicKey) -> Result<VerifyResult> {
    match check_known_hosts(hostname, port, key) {
        Ok(true) => Ok(VerifyResult::Match),
        Ok(false) => Ok(VerifyResult::Unknown),
        Err(KeyError::KeyChanged { line }) => Ok(VerifyResult::Mismatch { line }),
        Err(e) => Err(FleetError::Connection {
            host: hostname.to_string(),
            reason: format!("cannot read known_hosts: {e}"),
        }),
    }
}

/// SHA-256 fingerprint of a server key
#[must_use]
pub fn fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

/// Apply the verification policy to a server key
///
/// `AcceptNew` records unknown hosts, like `StrictHostKeyChecking=accept-new`.
///
/// # Errors
///
/// Returns `Connection` if the key changed, if the host is unknown in
/// `Strict` mode, or if `known_hosts` cannot be read or written.
pub fn verify_host_key(
    hostname: &str,
    port: u16,
    key: &PublicKey,
    mode: HostKeyVerification,
) -> Result<()> {
    if mode == HostKeyVerification::Off {
        warn!(host = %hostname, "Host key verification is disabled");
        return Ok(());
    }

    match verify(hostname, port, key)? {
        VerifyResult::Match => {
            debug!(host = %hostname, port, "Host key verified");
            Ok(())
        }
        VerifyResult::Mismatch { line } => {
            warn!(host = %hostname, port, line, "Host key mismatch");
            Err(FleetError::Connection {
                host: hostname.to_string(),
                reason: format!(
                    "host key {} does not match known_hosts line {line}",
                    fingerprint(key)
                ),
            })
        }
        VerifyResult::Unknown if mode == HostKeyVerification::Strict => {
            Err(FleetError::Connection {
                host: hostname.to_string(),
                reason: format!("unknown host key {}", fingerprint(key)),
            })
        }
        VerifyResult::Unknown => {
            learn_known_hosts(hostname, port, key).map_err(|e| FleetError::Connection {
                host: hostname.to_string(),
                reason: format!("cannot record host key in known_hosts: {e}"),
            })?;
            debug!(host = %hostname, port, fingerprint = %fingerprint(key), "Recorded new host key");
            Ok(())
        }
    }
}
