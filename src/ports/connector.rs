//! SSH Connector Port
//!
//! This module defines traits for SSH session creation and operations,
//! abstracting away the underlying SSH implementation for testability.

use async_trait::async_trait;

use crate::config::SshConfig;
use crate::domain::{HostRecord, KeyMaterial};
use crate::error::Result;
use crate::ssh::CommandOutput;

/// Lifecycle of one SSH session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, user not yet accepted
    Unauthenticated,
    /// Ready to run commands
    Authenticated,
    /// Terminal: transport and key released
    Closed,
}

/// Trait for opening SSH sessions
///
/// This trait abstracts session creation, allowing for mock
/// implementations in tests without requiring real SSH servers.
#[async_trait]
pub trait SshConnector: Send + Sync {
    /// The type of session returned by this connector
    type Session: SshSessionTrait;

    /// Open an authenticated session to `record` using `key`
    ///
    /// The key must belong to the record's host. A failed open never
    /// yields a session; any transport it created is released first.
    ///
    /// # Errors
    /// * `Authentication` - the server rejected the key for this user
    /// * `Connection` - any other connection-level fault
    /// * `KeyHostMismatch` - `key` was fetched for a different host
    async fn open(
        &self,
        record: &HostRecord,
        key: KeyMaterial,
        settings: &SshConfig,
    ) -> Result<Self::Session>;
}

/// Trait for operations on an open SSH session
#[async_trait]
pub trait SshSessionTrait: Send + Sync {
    /// Execute one command on a fresh channel
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// Target host of this session
    fn host_name(&self) -> &str;

    /// User the session authenticated as
    fn user(&self) -> &str;

    fn state(&self) -> SessionState;

    /// Close the transport and drop the key
    ///
    /// Calling this on a closed session fails with `AlreadyClosed`.
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use crate::error::FleetError;

    /// How a mocked host behaves when a session is opened
    #[derive(Clone)]
    enum MockHostBehavior {
        Responds {
            responses: HashMap<String, CommandOutput>,
            default_response: CommandOutput,
        },
        RejectsKey,
        Unreachable(String),
    }

    /// Record of a session open attempt
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct OpenCall {
        pub host_name: String,
        pub user: String,
    }

    /// Shared log of what happened to mock sessions
    #[derive(Default)]
    struct SessionLog {
        exec_calls: Vec<(String, String)>,
        closed: Vec<String>,
        released_on_failure: Vec<String>,
    }

    /// Build stdout-only command output
    #[must_use]
    pub fn output(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            exit_signal: None,
            duration_ms: 5,
        }
    }

    /// Mock SSH connector for testing
    #[derive(Default)]
    pub struct MockSshConnector {
        hosts: Mutex<HashMap<String, MockHostBehavior>>,
        open_calls: Mutex<Vec<OpenCall>>,
        log: Arc<Mutex<SessionLog>>,
    }

    impl MockSshConnector {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a host that answers every command with `stdout`
        pub fn add_host(&self, host_name: &str, stdout: &str) {
            self.add_host_with_output(host_name, output(stdout));
        }

        /// Add a host that answers every command with `output`
        pub fn add_host_with_output(&self, host_name: &str, output: CommandOutput) {
            self.hosts.lock().unwrap().insert(
                host_name.to_string(),
                MockHostBehavior::Responds {
                    responses: HashMap::new(),
                    default_response: output,
                },
            );
        }

        /// Add a host with per-command responses
        pub fn add_host_with_responses(
            &self,
            host_name: &str,
            responses: HashMap<String, CommandOutput>,
        ) {
            self.hosts.lock().unwrap().insert(
                host_name.to_string(),
                MockHostBehavior::Responds {
                    responses,
                    default_response: output(""),
                },
            );
        }

        /// Add a host whose server rejects the offered key
        pub fn add_rejecting_host(&self, host_name: &str) {
            self.hosts
                .lock()
                .unwrap()
                .insert(host_name.to_string(), MockHostBehavior::RejectsKey);
        }

        /// Add a host that cannot be reached
        pub fn add_unreachable_host(&self, host_name: &str, reason: &str) {
            self.hosts.lock().unwrap().insert(
                host_name.to_string(),
                MockHostBehavior::Unreachable(reason.to_string()),
            );
        }

        #[must_use]
        pub fn open_calls(&self) -> Vec<OpenCall> {
            self.open_calls.lock().unwrap().clone()
        }

        #[must_use]
        pub fn open_count(&self, host_name: &str) -> usize {
            self.open_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.host_name == host_name)
                .count()
        }

        /// `(host, command)` pairs in execution order
        #[must_use]
        pub fn exec_calls(&self) -> Vec<(String, String)> {
            self.log.lock().unwrap().exec_calls.clone()
        }

        /// Hosts whose sessions were closed, once per close
        #[must_use]
        pub fn closed_sessions(&self) -> Vec<String> {
            self.log.lock().unwrap().closed.clone()
        }

        /// Hosts whose partial transport was released after a failed open
        #[must_use]
        pub fn released_on_failure(&self) -> Vec<String> {
            self.log.lock().unwrap().released_on_failure.clone()
        }
    }

    #[async_trait]
    impl SshConnector for MockSshConnector {
        type Session = MockSshSession;

        async fn open(
            &self,
            record: &HostRecord,
            key: KeyMaterial,
            _settings: &SshConfig,
        ) -> Result<Self::Session> {
            self.open_calls.lock().unwrap().push(OpenCall {
                host_name: record.hostname().to_string(),
                user: record.username().to_string(),
            });

            if key.hostname() != record.hostname() {
                return Err(FleetError::KeyHostMismatch {
                    host: record.hostname().to_string(),
                    key_host: key.hostname().to_string(),
                });
            }

            let behavior = self.hosts.lock().unwrap().get(record.hostname()).cloned();
            match behavior {
                Some(MockHostBehavior::Responds {
                    responses,
                    default_response,
                }) => Ok(MockSshSession {
                    host_name: record.hostname().to_string(),
                    user: record.username().to_string(),
                    responses,
                    default_response,
                    state: SessionState::Authenticated,
                    key: Some(key),
                    log: Arc::clone(&self.log),
                }),
                Some(MockHostBehavior::RejectsKey) => {
                    self.log
                        .lock()
                        .unwrap()
                        .released_on_failure
                        .push(record.hostname().to_string());
                    Err(FleetError::Authentication {
                        user: record.username().to_string(),
                        host: record.hostname().to_string(),
                    })
                }
                Some(MockHostBehavior::Unreachable(reason)) => Err(FleetError::Connection {
                    host: record.hostname().to_string(),
                    reason,
                }),
                None => Err(FleetError::Connection {
                    host: record.hostname().to_string(),
                    reason: "Host not configured in mock".to_string(),
                }),
            }
        }
    }

    /// Mock SSH session for testing
    pub struct MockSshSession {
        host_name: String,
        user: String,
        responses: HashMap<String, CommandOutput>,
        default_response: CommandOutput,
        state: SessionState,
        key: Option<KeyMaterial>,
        log: Arc<Mutex<SessionLog>>,
    }

    impl MockSshSession {
        #[must_use]
        pub const fn holds_key(&self) -> bool {
            self.key.is_some()
        }
    }

    #[async_trait]
    impl SshSessionTrait for MockSshSession {
        async fn exec(&self, command: &str) -> Result<CommandOutput> {
            if self.state == SessionState::Closed {
                return Err(FleetError::AlreadyClosed {
                    host: self.host_name.clone(),
                });
            }

            self.log
                .lock()
                .unwrap()
                .exec_calls
                .push((self.host_name.clone(), command.to_string()));

            Ok(self
                .responses
                .get(command)
                .unwrap_or(&self.default_response)
                .clone())
        }

        fn host_name(&self) -> &str {
            &self.host_name
        }

        fn user(&self) -> &str {
            &self.user
        }

        fn state(&self) -> SessionState {
            self.state
        }

        async fn close(&mut self) -> Result<()> {
            if self.state == SessionState::Closed {
                return Err(FleetError::AlreadyClosed {
                    host: self.host_name.clone(),
                });
            }
            self.key = None;
            self.state = SessionState::Closed;
            self.log.lock().unwrap().closed.push(self.host_name.clone());
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::domain::TEST_RSA_KEY;

        fn record(line: &str) -> HostRecord {
            HostRecord::parse(line).unwrap()
        }

        fn key(host: &str) -> KeyMaterial {
            KeyMaterial::decode(host, TEST_RSA_KEY).unwrap()
        }

        #[tokio::test]
        async fn test_mock_connector_opens_configured_host() {
            let connector = MockSshConnector::new();
            connector.add_host("web-01", "4\n");

            let session = connector
                .open(&record("web-01,deploy"), key("web-01"), &SshConfig::default())
                .await
                .unwrap();

            assert_eq!(session.host_name(), "web-01");
            assert_eq!(session.user(), "deploy");
            assert_eq!(session.state(), SessionState::Authenticated);
            assert_eq!(connector.open_count("web-01"), 1);
        }

        #[tokio::test]
        async fn test_mock_connector_unknown_host_is_connection_error() {
            let connector = MockSshConnector::new();
            let result = connector
                .open(&record("ghost,deploy"), key("ghost"), &SshConfig::default())
                .await;
            assert!(matches!(result, Err(FleetError::Connection { .. })));
        }

        #[tokio::test]
        async fn test_mock_connector_rejects_foreign_key() {
            let connector = MockSshConnector::new();
            connector.add_host("web-02", "4\n");
            let result = connector
                .open(&record("web-02,deploy"), key("web-01"), &SshConfig::default())
                .await;
            assert!(matches!(result, Err(FleetError::KeyHostMismatch { .. })));
        }

        #[tokio::test]
        async fn test_mock_session_close_twice() {
            let connector = MockSshConnector::new();
            connector.add_host("web-01", "4\n");
            let mut session = connector
                .open(&record("web-01,deploy"), key("web-01"), &SshConfig::default())
                .await
                .unwrap();

            assert!(session.holds_key());
            session.close().await.unwrap();
            assert!(!session.holds_key());
            assert_eq!(session.state(), SessionState::Closed);

            let err = session.close().await.unwrap_err();
            assert!(matches!(err, FleetError::AlreadyClosed { .. }));
            assert_eq!(connector.closed_sessions(), vec!["web-01".to_string()]);
        }

        #[tokio::test]
        async fn test_mock_session_exec_after_close() {
            let connector = MockSshConnector::new();
            connector.add_host("web-01", "4\n");
            let mut session = connector
                .open(&record("web-01,deploy"), key("web-01"), &SshConfig::default())
                .await
                .unwrap();
            session.close().await.unwrap();

            let err = session.exec("nproc").await.unwrap_err();
            assert!(matches!(err, FleetError::AlreadyClosed { .. }));
        }
    }
}
