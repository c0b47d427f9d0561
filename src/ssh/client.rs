use std::sync::Arc;
use std::time::Duration;

use russh::ChannelMsg;
use russh::client::{self, Config, Handle, Handler};
use russh::keys::PublicKey;
use russh::keys::key::PrivateKeyWithHashAlg;
use tokio::time::timeout;

use crate::config::{HostKeyVerification, SshConfig};
use crate::domain::{HostRecord, KeyMaterial};
use crate::error::{FleetError, Result};
use crate::ports::SessionState;
use crate::ssh::known_hosts;

/// Upper bound on the disconnect handshake during close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sanitize SSH error messages to prevent credential leakage.
/// Masks authentication method names and truncates data dumps.
fn sanitize_ssh_error(error: &impl std::fmt::Display) -> String {
    let mut msg = error.to_string();
    for method in &["publickey", "keyboard-interactive", "gssapi-with-mic"] {
        msg = msg.replace(method, "***");
    }
    if msg.len() > 500 {
        let cut = (0..=500).rev().find(|i| msg.is_char_boundary(*i)).unwrap_or(0);
        format!("{}... (truncated)", &msg[..cut])
    } else {
        msg
    }
}

/// Output from a command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the server never sent an exit status
    pub exit_code: Option<u32>,
    /// Signal name when the remote process was killed by a signal
    pub exit_signal: Option<String>,
    pub duration_ms: u64,
}

impl CommandOutput {
    /// True only for an explicit zero status and no signal
    #[must_use]
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0) && self.exit_signal.is_none()
    }
}

/// SSH client handler for russh with host key verification
pub(crate) struct ClientHandler {
    hostname: String,
    port: u16,
    verification_mode: HostKeyVerification,
}

impl ClientHandler {
    const fn new(hostname: String, port: u16, verification_mode: HostKeyVerification) -> Self {
        Self {
            hostname,
            port,
            verification_mode,
        }
    }
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match known_hosts::verify_host_key(
            &self.hostname,
            self.port,
            server_public_key,
            self.verification_mode,
        ) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!(host = %self.hostname, error = %e, "Host key verification failed");
                Ok(false)
            }
        }
    }
}

/// One key-authenticated SSH session to one host.
///
/// Owns the transport handle and the key it authenticated with until
/// [`SshSession::close`] releases both.
pub struct SshSession {
    handle: Option<Handle<ClientHandler>>,
    key: Option<KeyMaterial>,
    host_name: String,
    user: String,
    state: SessionState,
    command_timeout_seconds: u64,
    max_output_bytes: usize,
}

impl SshSession {
    /// Connect to `record` and authenticate with `key`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `key` was fetched for a different host (`KeyHostMismatch`)
    /// - The TCP/SSH connection cannot be established, times out, or the
    ///   host key is rejected (`Connection`)
    /// - The server refuses the key for this user (`Authentication`)
    #[must_use = "the SSH session must be used or closed"]
    pub async fn open(record: &HostRecord, key: KeyMaterial, settings: &SshConfig) -> Result<Self> {
        if key.hostname() != record.hostname() {
            return Err(FleetError::KeyHostMismatch {
                host: record.hostname().to_string(),
                key_host: key.hostname().to_string(),
            });
        }

        let handle = Self::establish_connection(record.hostname(), settings).await?;

        let mut session = Self {
            handle: Some(handle),
            key: Some(key),
            host_name: record.hostname().to_string(),
            user: record.username().to_string(),
            state: SessionState::Unauthenticated,
            command_timeout_seconds: settings.command_timeout_seconds,
            max_output_bytes: settings.max_output_bytes,
        };

        if let Err(e) = session.authenticate().await {
            // Never hand back a half-open transport
            if let Err(close_err) = session.release().await {
                tracing::debug!(host = %session.host_name, error = %close_err, "Release after failed authentication");
            }
            return Err(e);
        }

        tracing::debug!(host = %session.host_name, user = %session.user, "SSH session authenticated");
        Ok(session)
    }

    /// Establish the TCP/SSH connection
    async fn establish_connection(
        host_name: &str,
        settings: &SshConfig,
    ) -> Result<Handle<ClientHandler>> {
        let keepalive = Duration::from_secs(settings.keepalive_interval_seconds);
        let config = Config {
            inactivity_timeout: Some(Duration::from_secs(settings.command_timeout_seconds) + keepalive),
            keepalive_interval: Some(keepalive),
            keepalive_max: 3,
            ..Default::default()
        };
        let config = Arc::new(config);

        let port = settings.port;
        let handler = ClientHandler::new(
            host_name.to_string(),
            port,
            settings.host_key_verification,
        );

        let timeout_secs = settings.connection_timeout_seconds;
        let connect_timeout = Duration::from_secs(timeout_secs);

        timeout(
            connect_timeout,
            client::connect(config, (host_name, port), handler),
        )
        .await
        .map_err(|_| {
            tracing::error!(host = %host_name, port, timeout_secs, "SSH connection timeout");
            FleetError::Connection {
                host: host_name.to_string(),
                reason: format!("Connection timeout after {timeout_secs}s"),
            }
        })?
        .map_err(|e| {
            tracing::error!(host = %host_name, port, error = %e, "SSH connection failed");
            FleetError::Connection {
                host: host_name.to_string(),
                reason: sanitize_ssh_error(&e),
            }
        })
    }

    /// Public key authentication with the stored key
    async fn authenticate(&mut self) -> Result<()> {
        let (Some(handle), Some(key)) = (self.handle.as_mut(), self.key.as_ref()) else {
            return Err(FleetError::AlreadyClosed {
                host: self.host_name.clone(),
            });
        };

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        let key_with_hash = PrivateKeyWithHashAlg::new(key.private_key(), hash_alg);

        let auth_result = handle
            .authenticate_publickey(self.user.as_str(), key_with_hash)
            .await
            .map_err(|e| {
                tracing::error!(host = %self.host_name, user = %self.user, error = %sanitize_ssh_error(&e), "SSH transport error during authentication");
                FleetError::Connection {
                    host: self.host_name.clone(),
                    reason: format!("authentication exchange failed: {}", sanitize_ssh_error(&e)),
                }
            })?;

        if !auth_result.success() {
            tracing::info!(host = %self.host_name, "Authentication failed: is the stored key authorized for this user?");
            tracing::error!(host = %self.host_name, user = %self.user, algorithm = %key.algorithm(), "SSH key authentication failed");
            return Err(FleetError::Authentication {
                user: self.user.clone(),
                host: self.host_name.clone(),
            });
        }

        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Execute a command on the remote host
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The session is not authenticated or already closed
    /// - The SSH channel cannot be opened
    /// - The command execution fails
    /// - The command times out
    /// - The output exceeds the maximum allowed size
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let handle = match (&self.handle, self.state) {
            (Some(handle), SessionState::Authenticated) => handle,
            _ => {
                return Err(FleetError::AlreadyClosed {
                    host: self.host_name.clone(),
                });
            }
        };

        let start = std::time::Instant::now();

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FleetError::Exec {
                reason: format!("Failed to open channel: {e}"),
            })?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| FleetError::Exec {
                reason: format!("Failed to execute command: {e}"),
            })?;

        let (stdout, stderr, exit_code, exit_signal) = self.read_command_output(&mut channel).await?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            exit_signal,
            duration_ms,
        })
    }

    /// Read command output from channel with timeout
    async fn read_command_output(
        &self,
        channel: &mut russh::Channel<russh::client::Msg>,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<u32>, Option<String>)> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut exit_signal = None;
        let mut total_bytes = 0usize;
        let limit_bytes = self.max_output_bytes;
        let command_timeout = Duration::from_secs(self.command_timeout_seconds);

        let result = timeout(command_timeout, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        total_bytes += data.len();
                        if total_bytes > limit_bytes {
                            return Err(FleetError::OutputTooLarge { limit_bytes });
                        }
                        stdout.extend_from_slice(&data);
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        if ext == 1 {
                            total_bytes += data.len();
                            if total_bytes > limit_bytes {
                                return Err(FleetError::OutputTooLarge { limit_bytes });
                            }
                            stderr.extend_from_slice(&data);
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exit_code = Some(exit_status);
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                        exit_signal = Some(format!("{signal_name:?}"));
                    }
                    None => {
                        break;
                    }
                    // ExitStatus may arrive after Eof; keep reading until the
                    // channel is fully closed.
                    _ => {}
                }
            }
            Ok((stdout, stderr, exit_code, exit_signal))
        })
        .await;

        match result {
            Ok(output) => output,
            Err(_) => {
                let _ = channel.close().await;
                Err(FleetError::Timeout {
                    seconds: self.command_timeout_seconds,
                })
            }
        }
    }

    /// Get the host name
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Get the authenticated user
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Close the connection and drop the key
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` if the session was closed before, or
    /// `Connection` if the disconnect message could not be sent. The
    /// session is closed afterwards in both cases.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(FleetError::AlreadyClosed {
                host: self.host_name.clone(),
            });
        }
        self.release().await
    }

    /// Take and release the transport and key; runs at most once
    async fn release(&mut self) -> Result<()> {
        self.state = SessionState::Closed;
        self.key = None;

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match timeout(
            CLOSE_TIMEOUT,
            handle.disconnect(russh::Disconnect::ByApplication, "", "en"),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FleetError::Connection {
                host: self.host_name.clone(),
                reason: e.to_string(),
            }),
            Err(_) => {
                // The handle is dropped here, which tears the transport down anyway
                tracing::warn!(host = %self.host_name, "Timeout closing SSH connection, forcing drop");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TEST_RSA_KEY;

    /// Server whose handler keeps russh's default of rejecting every key
    struct RejectingServer;

    impl russh::server::Handler for RejectingServer {
        type Error = russh::Error;
    }

    fn record(line: &str) -> HostRecord {
        HostRecord::parse(line).unwrap()
    }

    // ============== CommandOutput Tests ==============

    #[test]
    fn test_command_output_fields() {
        let output = CommandOutput {
            stdout: "8\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            exit_signal: None,
            duration_ms: 12,
        };

        assert_eq!(output.stdout, "8\n");
        assert!(output.exited_cleanly());
        assert_eq!(output.clone(), output);
    }

    #[test]
    fn test_command_output_without_status_is_not_clean() {
        let missing = CommandOutput {
            stdout: "3\n".to_string(),
            stderr: String::new(),
            exit_code: None,
            exit_signal: None,
            duration_ms: 1,
        };
        assert!(!missing.exited_cleanly());

        let killed = CommandOutput {
            exit_code: Some(0),
            exit_signal: Some("KILL".to_string()),
            ..missing
        };
        assert!(!killed.exited_cleanly());
    }

    // ============== ClientHandler Tests ==============

    #[test]
    fn test_client_handler_new() {
        let handler = ClientHandler::new("web-01".to_string(), 22, HostKeyVerification::AcceptNew);
        assert_eq!(handler.hostname, "web-01");
        assert_eq!(handler.port, 22);
        assert_eq!(handler.verification_mode, HostKeyVerification::AcceptNew);
    }

    // ============== Sanitizer Tests ==============

    #[test]
    fn test_sanitize_ssh_error_masks_auth_methods() {
        let msg = sanitize_ssh_error(&"No more methods: publickey, keyboard-interactive");
        assert!(!msg.contains("publickey"));
        assert!(!msg.contains("keyboard-interactive"));
        assert!(msg.contains("***"));
    }

    #[test]
    fn test_sanitize_ssh_error_truncates_long_messages() {
        let long = "x".repeat(1000);
        let msg = sanitize_ssh_error(&long);
        assert!(msg.len() < 600);
        assert!(msg.ends_with("(truncated)"));
    }

    #[test]
    fn test_sanitize_ssh_error_respects_char_boundaries() {
        let long = "é".repeat(400);
        let msg = sanitize_ssh_error(&long);
        assert!(msg.ends_with("(truncated)"));
    }

    // ============== Open Failures ==============

    #[tokio::test]
    async fn test_open_rejects_key_for_other_host() {
        let key = KeyMaterial::decode("web-01", TEST_RSA_KEY).unwrap();
        let result = SshSession::open(&record("web-02,deploy"), key, &SshConfig::default()).await;
        assert!(matches!(result, Err(FleetError::KeyHostMismatch { .. })));
    }

    #[tokio::test]
    async fn test_open_unreachable_host_is_connection_error() {
        // Port 1 on loopback is closed on any sane test machine
        let settings = SshConfig {
            port: 1,
            connection_timeout_seconds: 5,
            ..Default::default()
        };
        let key = KeyMaterial::decode("127.0.0.1", TEST_RSA_KEY).unwrap();
        let result = SshSession::open(&record("127.0.0.1,deploy"), key, &settings).await;
        assert!(matches!(result, Err(FleetError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_open_times_out_as_connection_error() {
        // A listener that accepts but never speaks SSH
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let settings = SshConfig {
            port,
            connection_timeout_seconds: 1,
            ..Default::default()
        };
        let key = KeyMaterial::decode("127.0.0.1", TEST_RSA_KEY).unwrap();
        let result = SshSession::open(&record("127.0.0.1,deploy"), key, &settings).await;
        assert!(
            matches!(result, Err(FleetError::Connection { ref reason, .. }) if reason.contains("timeout"))
        );
    }

    // ============== Authentication Against A Live Server ==============

    #[tokio::test]
    async fn test_rejected_key_is_authentication_error_and_releases_transport() {
        let host_key = KeyMaterial::decode("server", TEST_RSA_KEY)
            .unwrap()
            .private_key();
        let server_config = Arc::new(russh::server::Config {
            keys: vec![(*host_key).clone()],
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            match russh::server::run_stream(server_config, socket, RejectingServer).await {
                Ok(running) => running.await,
                Err(e) => Err(e),
            }
        });

        let settings = SshConfig {
            port,
            connection_timeout_seconds: 5,
            command_timeout_seconds: 5,
            host_key_verification: HostKeyVerification::Off,
            ..Default::default()
        };
        let key = KeyMaterial::decode("127.0.0.1", TEST_RSA_KEY).unwrap();
        let result = SshSession::open(&record("127.0.0.1,deploy"), key, &settings).await;

        assert!(
            matches!(result, Err(FleetError::Authentication { ref user, ref host }) if user == "deploy" && host == "127.0.0.1")
        );

        // The server's session only ends once the client drops the connection
        let server_done = timeout(Duration::from_secs(5), server).await;
        assert!(server_done.is_ok(), "connection was left open after failed authentication");
    }
}
