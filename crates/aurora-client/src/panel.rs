//! The chat widget: at most one open conversation at a time.

use std::sync::Arc;

use aurora_net::{HistorySource, Transport};
use aurora_shared::protocol::InboundFrame;
use aurora_shared::Identity;

use crate::error::PanelError;
use crate::session::{Conversation, SessionOptions};
use crate::view::MessageView;

pub struct ChatPanel {
    me: Identity,
    history: Arc<dyn HistorySource>,
    transport: Arc<dyn Transport>,
    options: SessionOptions,
    current: Option<Conversation>,
}

impl ChatPanel {
    pub fn new(
        me: Identity,
        history: Arc<dyn HistorySource>,
        transport: Arc<dyn Transport>,
        options: SessionOptions,
    ) -> Self {
        Self {
            me,
            history,
            transport,
            options,
            current: None,
        }
    }

    pub fn me(&self) -> &Identity {
        &self.me
    }

    /// Switch to a conversation with `peer`.
    ///
    /// The current conversation, if any, is torn down first so its
    /// connection is gone before the new one is opened.
    pub async fn open(&mut self, peer: Identity) -> Result<&mut Conversation, PanelError> {
        if peer == self.me {
            return Err(PanelError::SelfConversation);
        }
        self.close();

        let conversation = Conversation::open(
            self.me.clone(),
            peer,
            &*self.history,
            &*self.transport,
            self.options.clone(),
        )
        .await;
        Ok(self.current.insert(conversation))
    }

    /// Tear down the open conversation. No-op when none is open.
    pub fn close(&mut self) {
        if let Some(conversation) = self.current.take() {
            conversation.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.current.as_ref()
    }

    pub fn conversation_mut(&mut self) -> Option<&mut Conversation> {
        self.current.as_mut()
    }

    /// Next live event of the open conversation. Pending while none is open.
    pub async fn next_live(&mut self) -> Option<InboundFrame> {
        match self.current.as_mut() {
            Some(conversation) => conversation.next_live().await,
            None => std::future::pending().await,
        }
    }

    /// Rendered messages of the open conversation, in order.
    pub fn view(&self) -> Vec<MessageView> {
        self.current
            .as_ref()
            .map(|c| c.messages().iter().map(MessageView::from).collect())
            .unwrap_or_default()
    }
}
