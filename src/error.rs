//! Error types for mailgate.

/// Top-level error type for a gateway invocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox session error: {0}")]
    Session(#[from] SessionError),

    #[error("MIME error: {0}")]
    Mime(#[from] MimeError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail retrieval protocol errors (connect, auth, list, fetch, mark, close).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Authentication failed for {user}: {reason}")]
    AuthFailed { user: String, reason: String },

    #[error("Server rejected {command}: {reply}")]
    Rejected { command: String, reply: String },

    #[error("Unexpected server response to {command}: {reply}")]
    Protocol { command: String, reply: String },

    #[error("Connection closed by server")]
    Closed,

    #[error("Mailbox is not open")]
    NotOpen,

    #[error("Mailbox is open read-only, cannot mark message {0} deleted")]
    ReadOnly(u32),

    #[error("No such message: {0}")]
    NoSuchMessage(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message structure errors. Always fatal for the current selection attempt.
#[derive(Debug, thiserror::Error)]
pub enum MimeError {
    #[error("Body part {path} could not be decoded: {reason}")]
    MalformedPart { path: String, reason: String },
}

/// Outbound assembly and submission errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Invalid sender address {address}: {reason}")]
    InvalidSender { address: String, reason: String },

    #[error("No valid recipient in {0:?}")]
    NoRecipients(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport setup failed: {0}")]
    Transport(String),

    #[error("SMTP submission failed: {0}")]
    Submit(String),
}

/// Result type alias for mailgate.
pub type Result<T> = std::result::Result<T, Error>;
