//! Messages of an open conversation and the ordered log holding them.
//!
//! The log is append-only: entries keep their insertion position for their
//! whole life, and the only in-place mutation is a status change looked up
//! by id. Ciphertext never enters the log.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use aurora_shared::error::CryptoError;
use aurora_shared::Identity;

// ---------------------------------------------------------------------------
// Identifiers and states
// ---------------------------------------------------------------------------

/// Local identifier of a message, unique within one conversation.
/// Never transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Shown optimistically, hand-off to the transport not finished yet.
    Pending,
    /// Received, loaded from history, or handed to the transport.
    Confirmed,
    /// Encryption or transport hand-off failed.
    Failed,
}

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    History,
    Live,
    Local,
}

/// Decrypted content of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    /// The ciphertext could not be opened with the conversation key.
    Undecryptable,
}

impl Body {
    pub fn from_decrypt(result: Result<String, CryptoError>) -> Self {
        match result {
            Ok(text) => Body::Text(text),
            Err(_) => Body::Undecryptable,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Undecryptable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: Identity,
    pub body: Body,
    pub is_mine: bool,
    pub status: MessageStatus,
    pub origin: Origin,
    /// Display timestamp only; never used for ordering.
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Ordered message list with an id -> position index.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
    index: HashMap<MessageId, usize>,
    next_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message built around a freshly allocated id.
    pub fn append(&mut self, build: impl FnOnce(MessageId) -> ChatMessage) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;

        let message = build(id);
        debug_assert_eq!(message.id, id);
        self.index.insert(id, self.entries.len());
        self.entries.push(message);
        id
    }

    /// Drop every entry. Ids keep counting up so they are never reused.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.index.get(&id).map(|&pos| &self.entries[pos])
    }

    /// Change the status of one message in place. Returns false for an
    /// unknown id.
    pub fn set_status(&mut self, id: MessageId, status: MessageStatus) -> bool {
        match self.index.get(&id) {
            Some(&pos) => {
                self.entries[pos].status = status;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
