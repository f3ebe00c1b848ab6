//! Presentation model of a message, as handed to whatever draws the chat.

use serde::Serialize;

use crate::message::{Body, ChatMessage, MessageId, MessageStatus};

/// Shown in place of a body that could not be decrypted.
pub const DECRYPTION_ERROR_MARKER: &str = "⚠️ Decryption Error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub sender: String,
    pub text: String,
    pub is_mine: bool,
    pub status: MessageStatus,
    pub decrypted: bool,
    pub timestamp: String,
}

impl From<&ChatMessage> for MessageView {
    fn from(m: &ChatMessage) -> Self {
        let (text, decrypted) = match &m.body {
            Body::Text(text) => (text.clone(), true),
            Body::Undecryptable => (DECRYPTION_ERROR_MARKER.to_string(), false),
        };
        Self {
            id: m.id,
            sender: m.sender.to_string(),
            text,
            is_mine: m.is_mine,
            status: m.status,
            decrypted,
            timestamp: m.at.to_rfc3339(),
        }
    }
}

impl MessageView {
    /// One-line rendering for a terminal.
    pub fn render_line(&self) -> String {
        let who = if self.is_mine { "you" } else { self.sender.as_str() };
        let marker = match self.status {
            MessageStatus::Pending => " (sending...)",
            MessageStatus::Confirmed => "",
            MessageStatus::Failed => " (failed, /retry to resend)",
        };
        format!("[{}] {}: {}{}", self.id, who, self.text, marker)
    }
}
