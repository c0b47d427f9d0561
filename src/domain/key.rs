//! Private key material for one host

use std::fmt;
use std::sync::Arc;

use russh::keys::{PrivateKey, decode_secret_key};

use crate::error::{FleetError, Result};

/// A decoded private key bound to the single host it was stored for.
///
/// Fetched fresh for every session and never written anywhere. The
/// underlying key zeroizes its secret parts when the last reference
/// is dropped.
#[derive(Clone)]
pub struct KeyMaterial {
    hostname: String,
    key: Arc<PrivateKey>,
}

impl KeyMaterial {
    /// Decode PEM or `OpenSSH` private key text.
    ///
    /// # Errors
    ///
    /// Returns `KeyParse` if the text is not an unencrypted private key
    /// russh can read.
    pub fn decode(hostname: &str, text: &str) -> Result<Self> {
        let key = decode_secret_key(text, None).map_err(|e| FleetError::KeyParse {
            host: hostname.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            hostname: hostname.to_string(),
            key: Arc::new(key),
        })
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn private_key(&self) -> Arc<PrivateKey> {
        Arc::clone(&self.key)
    }

    /// Key algorithm name, e.g. `ssh-rsa`
    #[must_use]
    pub fn algorithm(&self) -> String {
        self.key.algorithm().to_string()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("hostname", &self.hostname)
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) const TEST_RSA_KEY: &str = include_str!("../../tests/fixtures/test_rsa_key");
