//! Error types for the OSC recorder

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed on port {port}: {reason}")]
    BindFailed { port: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Listener is not running")]
    NotListening,
}

/// Host/worker request-response errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Recorder worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Recorder worker exited: {0}")]
    WorkerExited(String),

    #[error("Unknown recorder RPC method: {0}")]
    UnknownMethod(String),

    #[error("Invalid payload for {method}: {reason}")]
    InvalidPayload { method: String, reason: String },

    #[error("{0}")]
    Remote(String),

    #[error("Recorder is shutting down")]
    ShuttingDown,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
