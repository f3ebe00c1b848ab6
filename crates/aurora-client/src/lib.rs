//! End-to-end encrypted one-to-one chat client core.
//!
//! A [`ChatPanel`] owns at most one open [`Conversation`]. The conversation
//! derives the pairwise key, replays the decrypted history, then merges live
//! events from the peer with optimistic local sends into one ordered
//! message list.

pub mod commands;
pub mod config;
pub mod error;
pub mod message;
pub mod panel;
pub mod session;
pub mod view;

pub use config::ClientConfig;
pub use error::{HistoryLoadError, PanelError, SendError};
pub use message::{Body, ChatMessage, MessageId, MessageLog, MessageStatus, Origin};
pub use panel::ChatPanel;
pub use session::{Conversation, OutgoingSend, SendOutcome, SessionOptions};
pub use view::{MessageView, DECRYPTION_ERROR_MARKER};
