//! SSH Connector Adapter
//!
//! Concrete implementation of the `SshConnector` and `SshSessionTrait` ports
//! using the russh SSH client.

use async_trait::async_trait;

use crate::config::SshConfig;
use crate::domain::{HostRecord, KeyMaterial};
use crate::error::Result;
use crate::ports::{SessionState, SshConnector, SshSessionTrait};
use crate::ssh::{CommandOutput, SshSession};

/// Real SSH connector using russh
#[derive(Debug, Default, Clone, Copy)]
pub struct RealSshConnector;

impl RealSshConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SshConnector for RealSshConnector {
    type Session = SshSession;

    async fn open(
        &self,
        record: &HostRecord,
        key: KeyMaterial,
        settings: &SshConfig,
    ) -> Result<Self::Session> {
        SshSession::open(record, key, settings).await
    }
}

#[async_trait]
impl SshSessionTrait for SshSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.exec(command).await
    }

    fn host_name(&self) -> &str {
        self.host_name()
    }

    fn user(&self) -> &str {
        self.user()
    }

    fn state(&self) -> SessionState {
        self.state()
    }

    async fn close(&mut self) -> Result<()> {
        self.close().await
    }
}
