mod client;
mod connector;
pub mod known_hosts;

pub use client::{CommandOutput, SshSession};
pub use connector::RealSshConnector;
pub use known_hosts::{VerifyResult, verify_host_key};
