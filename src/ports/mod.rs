//! Ports module - Trait definitions for hexagonal architecture
//!
//! This module contains the trait definitions (ports) that define
//! the boundaries between the fleet logic and external adapters.

mod connector;
mod key_store;

pub use connector::{SessionState, SshConnector, SshSessionTrait};
pub use key_store::KeyStore;

#[cfg(test)]
pub use connector::mock::{MockSshConnector, MockSshSession, OpenCall, output as mock_output};

#[cfg(test)]
pub use key_store::mock::MockKeyStore;
