//! Domain module - host records, key material, command results and the
//! fleet dispatch loop

pub mod dispatcher;
pub mod key;
pub mod record;
pub mod report;
pub mod runner;

pub use dispatcher::{DispatchSettings, DispatchSummary, FleetDispatcher, HostFailure};
pub use key::KeyMaterial;
#[cfg(test)]
pub(crate) use key::TEST_RSA_KEY;
pub use record::{HostRecord, parse_host_list, read_host_list};
pub use report::{CommandResult, CoreCountReport};
pub use runner::CommandRunner;
