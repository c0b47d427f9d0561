//! Key Store Port
//!
//! This module defines the trait for private key lookup, abstracting
//! away the relational store that holds one key per host.

use async_trait::async_trait;

use crate::domain::KeyMaterial;
use crate::error::Result;

/// Trait for fetching a host's private key
///
/// Every call is a fresh lookup; implementations must not cache keys
/// across hosts or across calls.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetch and decode the private key stored for `hostname`
    ///
    /// # Errors
    /// * `KeyNotFound` - no row matches the hostname exactly
    /// * `KeyParse` - the stored text is not a valid private key
    /// * `KeyStore` - the backing store could not be queried
    async fn fetch_key(&self, hostname: &str) -> Result<KeyMaterial>;
}
