use thiserror::Error;

use aurora_shared::error::AuroraError;

/// Errors produced by the network layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// A base URL could not be parsed or cannot carry path segments.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// HTTP request, status or body decoding failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket handshake or I/O failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] AuroraError),

    /// The live connection is gone; nothing more can be sent on it.
    #[error("Connection closed")]
    ConnectionClosed,
}
