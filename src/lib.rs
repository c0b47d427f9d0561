#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod keystore;
pub mod ports;
pub mod ssh;

pub use config::Config;
pub use domain::{CoreCountReport, DispatchSettings, DispatchSummary, FleetDispatcher, HostRecord};
pub use error::{FleetError, Result};
pub use keystore::SqlKeyStore;
pub use ports::{KeyStore, SshConnector, SshSessionTrait};
pub use ssh::RealSshConnector;
