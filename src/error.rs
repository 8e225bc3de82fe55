//! Error types for the voice client

use thiserror::Error;

use crate::voice::DecodeError;

/// Result type alias for voice client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone permission denied or input hardware unavailable
    #[error("microphone unavailable: {0}")]
    DeviceAccess(String),

    /// Remote session could not be established
    #[error("session failed to open: {0}")]
    SessionOpen(String),

    /// A session is already connecting or open
    #[error("a session is already active")]
    SessionActive,

    /// Transport failure on an open session
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed audio payload
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid endpoint URL
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// Websocket protocol error
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}
