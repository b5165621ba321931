//! Error types shared across the crate.

use tokio_tungstenite::tungstenite::Error as WsError;

/// Malformed base64 text or data URI.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid data URI: {0}")]
    DataUri(String),
}

/// Error type for assistant, live session and device operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The provider call failed or returned nothing usable.
    #[error("Remote service error: {0}")]
    RemoteService(String),

    /// Microphone or audio context acquisition failed.
    #[error("Device error: {0}")]
    Device(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Invalid session state: {0}")]
    InvalidState(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteService(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }
}
