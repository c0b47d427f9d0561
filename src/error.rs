use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    // Configuration errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid { field: String, reason: String },

    // Host list errors
    #[error("Malformed host record '{record}': {reason}")]
    MalformedRecord { record: String, reason: String },

    // Key store errors
    #[error("No private key stored for host {host}")]
    KeyNotFound { host: String },

    #[error("Stored private key for {host} is invalid: {reason}")]
    KeyParse { host: String, reason: String },

    #[error("Key for {key_host} cannot open a session to {host}")]
    KeyHostMismatch { host: String, key_host: String },

    #[error("Key store error: {0}")]
    KeyStore(#[from] sqlx::Error),

    // SSH errors
    #[error("SSH authentication failed for {user}@{host}")]
    Authentication { user: String, host: String },

    #[error("SSH connection failed to {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("SSH session to {host} is already closed")]
    AlreadyClosed { host: String },

    #[error("SSH command execution failed: {reason}")]
    Exec { reason: String },

    #[error("SSH command timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("SSH output too large (limit: {limit_bytes} bytes)")]
    OutputTooLarge { limit_bytes: usize },

    // Command errors
    #[error("Command '{command}' on {host} produced no output")]
    EmptyOutput { host: String, command: String },

    #[error("Command '{command}' on {host} exited with status {exit_code}")]
    CommandFailed {
        host: String,
        command: String,
        exit_code: u32,
    },

    #[error("Command '{command}' on {host} did not exit normally: {reason}")]
    CommandAborted {
        host: String,
        command: String,
        reason: String,
    },

    // Dispatch errors
    #[error("Host task failed: {reason}")]
    TaskFailed { reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;
