//! Error types for the mentor client

use thiserror::Error;

/// Result type alias for mentor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the mentor client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device unavailable or access denied
    #[error("device error: {0}")]
    Device(String),

    /// Audio stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Malformed inbound audio payload
    #[error("decode error: {0}")]
    Decode(String),

    /// Remote session could not be opened
    #[error("session error: {0}")]
    Session(String),

    /// Connect attempt cancelled by a disconnect
    #[error("connect cancelled")]
    Cancelled,

    /// The session controller has stopped
    #[error("session controller is gone")]
    ControllerGone,

    /// Text chat error
    #[error("chat error: {0}")]
    Chat(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
