//! JSON frames exchanged with the chat backend.
//!
//! Inbound frames and history records carry the ciphertext under `content`,
//! while outbound frames carry it under `ciphertext`. The backend reads and
//! writes exactly these names, so the asymmetry is kept as-is.

use serde::{Deserialize, Serialize};

use crate::error::AuroraError;
use crate::identity::Identity;

/// A message pushed to us over the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Author of the message
    pub from: Identity,
    /// Ciphertext (base64 nonce || sealed body)
    pub content: String,
    /// Server timestamp, free-form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// A message we push over the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Recipient
    pub to: Identity,
    pub ciphertext: String,
}

/// One persisted message as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub from: Identity,
    /// Ciphertext. The backend stores whatever the sender pushed, so this
    /// can be null or absent.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl InboundFrame {
    pub fn from_json(text: &str) -> Result<Self, AuroraError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl OutboundFrame {
    pub fn to_json(&self) -> Result<String, AuroraError> {
        Ok(serde_json::to_string(self)?)
    }
}
