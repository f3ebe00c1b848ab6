use std::time::Duration;

use thiserror::Error;

use aurora_net::NetError;
use aurora_shared::error::CryptoError;

/// Loading the persisted history failed. The conversation still opens,
/// with an empty message list.
#[derive(Error, Debug)]
pub enum HistoryLoadError {
    #[error("History fetch failed: {0}")]
    Fetch(#[from] NetError),

    #[error("History fetch timed out after {0:?}")]
    TimedOut(Duration),
}

/// Encrypting or handing a message to the transport failed. Reported on
/// the affected message as `failed`.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Encryption failed: {0}")]
    Encrypt(#[from] CryptoError),

    #[error("Transport send failed: {0}")]
    Transport(#[from] NetError),

    #[error("Send timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors from the chat surface itself.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PanelError {
    #[error("Cannot open a conversation with yourself")]
    SelfConversation,
}
