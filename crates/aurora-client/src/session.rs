//! One open conversation: key, message log, compose field and live
//! connection, owned together and torn down together.
//!
//! Three sources feed the log:
//! - persisted history, fetched and decrypted once when the conversation
//!   opens, before the live connection exists;
//! - live events from the peer, appended as they arrive (our own echoes are
//!   dropped, they are already on screen);
//! - local sends, appended as `pending` before anything touches the
//!   network and later flipped in place to `confirmed` or `failed`.
//!
//! A send is split in three steps so live events can be processed while it
//! is in flight: [`Conversation::stage_send`] appends the optimistic entry,
//! [`OutgoingSend::dispatch`] encrypts and hands the frame to the transport
//! without borrowing the conversation, and [`Conversation::complete_send`]
//! applies the outcome.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use aurora_net::{Connection, HistorySource, NetError, OutboundHandle, Transport};
use aurora_shared::crypto;
use aurora_shared::protocol::{HistoryRecord, InboundFrame, OutboundFrame};
use aurora_shared::{Identity, SharedKey};

use crate::error::{HistoryLoadError, SendError};
use crate::message::{Body, ChatMessage, MessageId, MessageLog, MessageStatus, Origin};

/// Default limit for the history round trip.
pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default limit for one transport hand-off.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-conversation tunables. `None` disables a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub history_timeout: Option<Duration>,
    pub send_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_timeout: Some(DEFAULT_HISTORY_TIMEOUT),
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
        }
    }
}

pub struct Conversation {
    session: Uuid,
    me: Identity,
    peer: Identity,
    key: SharedKey,
    messages: MessageLog,
    compose: String,
    connection: Option<Connection>,
    options: SessionOptions,
}

impl Conversation {
    /// Conversation with no history and no connection yet.
    pub fn new(me: Identity, peer: Identity, options: SessionOptions) -> Self {
        let key = SharedKey::derive(&me, &peer);
        Self {
            session: Uuid::new_v4(),
            me,
            peer,
            key,
            messages: MessageLog::new(),
            compose: String::new(),
            connection: None,
            options,
        }
    }

    /// Open a conversation: derive the key, load history, then connect.
    ///
    /// Never fails. A failed history load leaves the list empty and a
    /// failed connect leaves the conversation without a connection, in
    /// which case sends are ignored and no live events arrive.
    pub async fn open<H, T>(
        me: Identity,
        peer: Identity,
        history: &H,
        transport: &T,
        options: SessionOptions,
    ) -> Self
    where
        H: HistorySource + ?Sized,
        T: Transport + ?Sized,
    {
        let mut conversation = Self::new(me, peer, options);
        info!(
            session = %conversation.session,
            me = %conversation.me,
            peer = %conversation.peer,
            "Opening conversation"
        );

        if let Err(e) = conversation.load_history(history).await {
            warn!(session = %conversation.session, error = %e, "History unavailable, starting empty");
        }

        if let Err(e) = conversation.connect(transport).await {
            warn!(session = %conversation.session, error = %e, "Live connection unavailable");
        }

        conversation
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Fetch, decrypt and install the persisted history, replacing the
    /// current message list. On failure the list is left empty.
    pub async fn load_history<H>(&mut self, source: &H) -> Result<usize, HistoryLoadError>
    where
        H: HistorySource + ?Sized,
    {
        self.messages.clear();

        let fetch = source.fetch_history(&self.me, &self.peer);
        let records = match self.options.history_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| HistoryLoadError::TimedOut(limit))??,
            None => fetch.await?,
        };

        let count = records.len();
        for record in records {
            self.append_history(record);
        }

        info!(session = %self.session, count, "History loaded");
        Ok(count)
    }

    fn append_history(&mut self, record: HistoryRecord) {
        let body = match record.content.as_deref() {
            Some(ciphertext) => self.open_ciphertext(ciphertext),
            None => {
                warn!(session = %self.session, from = %record.from, "History record has no content");
                Body::Undecryptable
            }
        };
        let is_mine = record.from == self.me;
        let at = record
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        self.messages.append(|id| ChatMessage {
            id,
            sender: record.from,
            body,
            is_mine,
            status: MessageStatus::Confirmed,
            origin: Origin::History,
            at,
        });
    }

    /// Open the live connection for our identity.
    pub async fn connect<T>(&mut self, transport: &T) -> Result<(), NetError>
    where
        T: Transport + ?Sized,
    {
        let connection = transport.open(&self.me).await?;
        self.attach_connection(connection);
        Ok(())
    }

    /// Install a connection, replacing (and closing) any previous one.
    pub fn attach_connection(&mut self, connection: Connection) {
        self.connection = Some(connection);
        debug!(session = %self.session, "Live connection attached");
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn me(&self) -> &Identity {
        &self.me
    }

    pub fn peer(&self) -> &Identity {
        &self.peer
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.get(id)
    }

    /// Fingerprint of the conversation key, equal on both sides.
    pub fn key_fingerprint(&self) -> String {
        self.key.fingerprint()
    }

    pub fn compose(&self) -> &str {
        &self.compose
    }

    pub fn set_compose(&mut self, text: impl Into<String>) {
        self.compose = text.into();
    }

    /// A connection exists and has not been seen closing.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| !c.is_closed())
    }

    // -----------------------------------------------------------------------
    // Live delivery
    // -----------------------------------------------------------------------

    /// Wait for the next live event.
    ///
    /// Resolves to `None` once when the connection drops; never resolves
    /// when there is no connection.
    pub async fn next_live(&mut self) -> Option<InboundFrame> {
        let Some(connection) = self.connection.as_mut() else {
            return std::future::pending().await;
        };

        let frame = connection.recv().await;
        if frame.is_none() {
            warn!(session = %self.session, "Live connection lost");
        }
        frame
    }

    /// Apply one live event. Returns the id of the appended message, or
    /// `None` when the event was discarded.
    pub fn receive_live(&mut self, frame: InboundFrame) -> Option<MessageId> {
        if frame.from == self.me {
            // Echo of something we already rendered optimistically
            debug!(session = %self.session, "Dropping self-echo");
            return None;
        }
        if frame.from != self.peer {
            debug!(session = %self.session, from = %frame.from, "Ignoring event from outside this conversation");
            return None;
        }

        let body = self.open_ciphertext(&frame.content);
        let id = self.messages.append(|id| ChatMessage {
            id,
            sender: frame.from,
            body,
            is_mine: false,
            status: MessageStatus::Confirmed,
            origin: Origin::Live,
            at: Utc::now(),
        });
        debug!(session = %self.session, id = %id, "Live message appended");
        Some(id)
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Optimistic half of a send: take the compose text, clear the compose
    /// field and append the message as `pending`.
    ///
    /// Returns `None` (and leaves the compose field alone) for blank input
    /// or when there is no connection.
    pub fn stage_send(&mut self) -> Option<OutgoingSend> {
        if self.compose.trim().is_empty() {
            return None;
        }
        let outbound = self.connection.as_ref()?.outbound();

        let plaintext = std::mem::take(&mut self.compose);
        let id = self.messages.append(|id| ChatMessage {
            id,
            sender: self.me.clone(),
            body: Body::Text(plaintext.clone()),
            is_mine: true,
            status: MessageStatus::Pending,
            origin: Origin::Local,
            at: Utc::now(),
        });
        debug!(session = %self.session, id = %id, "Message staged");

        Some(self.outgoing(id, plaintext, outbound))
    }

    /// Apply the result of a dispatched send to its message.
    ///
    /// Outcomes from another conversation instance, or for messages that
    /// are not pending, are ignored. Returns the new status when applied.
    pub fn complete_send(&mut self, outcome: SendOutcome) -> Option<MessageStatus> {
        if outcome.session != self.session {
            debug!(
                session = %self.session,
                stale = %outcome.session,
                "Ignoring send outcome from a closed conversation"
            );
            return None;
        }

        let pending = self
            .messages
            .get(outcome.id)
            .is_some_and(|m| m.status == MessageStatus::Pending);
        if !pending {
            debug!(session = %self.session, id = %outcome.id, "No pending message for send outcome");
            return None;
        }

        let status = match outcome.result {
            Ok(()) => MessageStatus::Confirmed,
            Err(e) => {
                warn!(session = %self.session, id = %outcome.id, error = %e, "Message send failed");
                MessageStatus::Failed
            }
        };
        self.messages.set_status(outcome.id, status);
        Some(status)
    }

    /// Stage, dispatch and complete in one go.
    pub async fn send_local(&mut self) -> Option<MessageId> {
        let outgoing = self.stage_send()?;
        let outcome = outgoing.dispatch().await;
        let id = outcome.id;
        self.complete_send(outcome);
        Some(id)
    }

    /// Send a `failed` message again, in place. The message goes back to
    /// `pending`; no new entry is created.
    pub fn retry(&mut self, id: MessageId) -> Option<OutgoingSend> {
        let message = self.messages.get(id)?;
        if !message.is_mine || message.status != MessageStatus::Failed {
            return None;
        }
        let plaintext = message.body.text()?.to_owned();
        let outbound = self.connection.as_ref()?.outbound();

        self.messages.set_status(id, MessageStatus::Pending);
        info!(session = %self.session, id = %id, "Retrying message");
        Some(self.outgoing(id, plaintext, outbound))
    }

    /// End the conversation, closing its connection.
    pub fn close(self) {
        info!(session = %self.session, peer = %self.peer, "Conversation closed");
    }

    fn outgoing(&self, id: MessageId, plaintext: String, outbound: OutboundHandle) -> OutgoingSend {
        OutgoingSend {
            session: self.session,
            id,
            to: self.peer.clone(),
            plaintext,
            key: self.key,
            outbound,
            timeout: self.options.send_timeout,
        }
    }

    fn open_ciphertext(&self, ciphertext: &str) -> Body {
        let result = crypto::decrypt(&self.key, ciphertext);
        if let Err(ref e) = result {
            warn!(session = %self.session, error = %e, "Message could not be decrypted");
        }
        Body::from_decrypt(result)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// In-flight sends
// ---------------------------------------------------------------------------

/// A staged message on its way to the transport. Owns everything it needs,
/// so it can be driven while the conversation keeps handling events.
#[derive(Debug)]
pub struct OutgoingSend {
    session: Uuid,
    id: MessageId,
    to: Identity,
    plaintext: String,
    key: SharedKey,
    outbound: OutboundHandle,
    timeout: Option<Duration>,
}

/// Result of [`OutgoingSend::dispatch`], fed back through
/// [`Conversation::complete_send`].
#[derive(Debug)]
pub struct SendOutcome {
    pub session: Uuid,
    pub id: MessageId,
    pub result: Result<(), SendError>,
}

impl OutgoingSend {
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Encrypt and hand the frame to the transport.
    pub async fn dispatch(self) -> SendOutcome {
        let result = self.deliver().await;
        SendOutcome {
            session: self.session,
            id: self.id,
            result,
        }
    }

    async fn deliver(&self) -> Result<(), SendError> {
        let ciphertext = crypto::encrypt(&self.key, &self.plaintext)?;
        let frame = OutboundFrame {
            to: self.to.clone(),
            ciphertext,
        };

        let send = self.outbound.send(frame);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| SendError::TimedOut(limit))??,
            None => send.await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use aurora_net::{channel, PendingWrite, RemoteEnd};

    use super::*;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    fn seal(a: &str, b: &str, text: &str) -> String {
        crypto::encrypt(&SharedKey::derive(&id(a), &id(b)), text).unwrap()
    }

    fn record(from: &str, content: String) -> HistoryRecord {
        HistoryRecord {
            from: id(from),
            content: Some(content),
            timestamp: None,
        }
    }

    fn live(from: &str, content: String) -> InboundFrame {
        InboundFrame {
            from: id(from),
            content,
            timestamp: None,
        }
    }

    struct FixedHistory(Result<Vec<HistoryRecord>, ()>);

    #[async_trait]
    impl HistorySource for FixedHistory {
        async fn fetch_history(
            &self,
            _me: &Identity,
            _peer: &Identity,
        ) -> Result<Vec<HistoryRecord>, NetError> {
            self.0.clone().map_err(|_| NetError::ConnectionClosed)
        }
    }

    struct HangingHistory;

    #[async_trait]
    impl HistorySource for HangingHistory {
        async fn fetch_history(
            &self,
            _me: &Identity,
            _peer: &Identity,
        ) -> Result<Vec<HistoryRecord>, NetError> {
            std::future::pending().await
        }
    }

    /// Hands out one pre-built connection, then refuses.
    struct OneShotTransport(Mutex<Option<Connection>>);

    #[async_trait]
    impl Transport for OneShotTransport {
        async fn open(&self, _me: &Identity) -> Result<Connection, NetError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .ok_or(NetError::ConnectionClosed)
        }
    }

    /// Acknowledge every write and forward the frames for inspection.
    fn ack_all(mut writes: mpsc::Receiver<PendingWrite>) -> mpsc::UnboundedReceiver<OutboundFrame> {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(write) = writes.recv().await {
                let _ = seen_tx.send(write.frame.clone());
                write.complete(Ok(()));
            }
        });
        seen_rx
    }

    fn connected(me: &str, peer: &str) -> (Conversation, RemoteEnd) {
        let mut conversation = Conversation::new(id(me), id(peer), SessionOptions::default());
        let (connection, remote) = channel(8);
        conversation.attach_connection(connection);
        (conversation, remote)
    }

    fn texts(conversation: &Conversation) -> Vec<(String, Option<String>, MessageStatus)> {
        conversation
            .messages()
            .iter()
            .map(|m| {
                (
                    m.sender.to_string(),
                    m.body.text().map(str::to_owned),
                    m.status,
                )
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_two_party_history_in_order() {
        let history = FixedHistory(Ok(vec![
            record("bob", seal("alice", "bob", "hey alice")),
            record("alice", seal("bob", "alice", "hey bob")),
        ]));
        let (connection, _remote) = channel(8);
        let transport = OneShotTransport(Mutex::new(Some(connection)));

        let conversation = Conversation::open(
            id("alice"),
            id("bob"),
            &history,
            &transport,
            SessionOptions::default(),
        )
        .await;

        let log = conversation.messages().as_slice();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].body, Body::Text("hey alice".into()));
        assert!(!log[0].is_mine);
        assert_eq!(log[1].body, Body::Text("hey bob".into()));
        assert!(log[1].is_mine);
        assert!(log.iter().all(|m| m.status == MessageStatus::Confirmed));
        assert!(log.iter().all(|m| m.origin == Origin::History));
        assert_eq!((log[0].id, log[1].id), (MessageId(0), MessageId(1)));
        assert!(conversation.is_connected());
    }

    #[tokio::test]
    async fn test_one_undecryptable_record_among_three() {
        let history = FixedHistory(Ok(vec![
            record("bob", seal("alice", "bob", "one")),
            record("bob", seal("bob", "mallory", "two")),
            record("alice", seal("alice", "bob", "three")),
        ]));
        let mut conversation = Conversation::new(id("alice"), id("bob"), SessionOptions::default());

        assert_eq!(conversation.load_history(&history).await.unwrap(), 3);

        let bodies: Vec<_> = conversation.messages().iter().map(|m| m.body.clone()).collect();
        assert_eq!(
            bodies,
            [
                Body::Text("one".into()),
                Body::Undecryptable,
                Body::Text("three".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_garbage_history_record_fails_soft() {
        let history = FixedHistory(Ok(vec![record("bob", "%%% not ciphertext".into())]));
        let mut conversation = Conversation::new(id("alice"), id("bob"), SessionOptions::default());

        conversation.load_history(&history).await.unwrap();
        assert_eq!(conversation.messages().as_slice()[0].body, Body::Undecryptable);
    }

    #[tokio::test]
    async fn test_record_without_content_fails_alone() {
        let mut empty = record("alice", String::new());
        empty.content = None;
        let history = FixedHistory(Ok(vec![
            record("bob", seal("alice", "bob", "before")),
            empty,
            record("bob", seal("alice", "bob", "after")),
        ]));
        let mut conversation = Conversation::new(id("alice"), id("bob"), SessionOptions::default());

        assert_eq!(conversation.load_history(&history).await.unwrap(), 3);

        let log = conversation.messages().as_slice();
        assert_eq!(log[0].body, Body::Text("before".into()));
        assert_eq!(log[1].body, Body::Undecryptable);
        assert!(log[1].is_mine);
        assert_eq!(log[2].body, Body::Text("after".into()));
    }

    #[test]
    fn test_both_sides_show_same_fingerprint() {
        let ours = Conversation::new(id("alice"), id("bob"), SessionOptions::default());
        let theirs = Conversation::new(id("bob"), id("alice"), SessionOptions::default());
        assert_eq!(ours.key_fingerprint(), theirs.key_fingerprint());
    }

    #[tokio::test]
    async fn test_history_timestamp_used_when_parsable() {
        let mut rec = record("bob", seal("alice", "bob", "x"));
        rec.timestamp = Some("2024-05-01T10:00:00+00:00".into());
        let history = FixedHistory(Ok(vec![rec]));
        let mut conversation = Conversation::new(id("alice"), id("bob"), SessionOptions::default());

        conversation.load_history(&history).await.unwrap();
        assert_eq!(
            conversation.messages().as_slice()[0].at.to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_history_failure_opens_empty_but_usable() {
        let history = FixedHistory(Err(()));
        let (connection, remote) = channel(8);
        let transport = OneShotTransport(Mutex::new(Some(connection)));

        let mut conversation = Conversation::open(
            id("alice"),
            id("bob"),
            &history,
            &transport,
            SessionOptions::default(),
        )
        .await;
        assert!(conversation.messages().is_empty());

        let _seen = ack_all(remote.writes);
        conversation.set_compose("still works");
        let sent = conversation.send_local().await.unwrap();
        assert_eq!(
            conversation.message(sent).unwrap().status,
            MessageStatus::Confirmed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_timeout() {
        let options = SessionOptions {
            history_timeout: Some(Duration::from_secs(2)),
            send_timeout: None,
        };
        let mut conversation = Conversation::new(id("alice"), id("bob"), options);

        let result = conversation.load_history(&HangingHistory).await;
        assert!(matches!(result, Err(HistoryLoadError::TimedOut(_))));
        assert!(conversation.messages().is_empty());
    }

    // -----------------------------------------------------------------------
    // Live delivery
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_self_echo_is_dropped() {
        let (mut conversation, _remote) = connected("alice", "bob");

        let echo = live("alice", seal("alice", "bob", "mine"));
        assert_eq!(conversation.receive_live(echo), None);
        assert!(conversation.messages().is_empty());
    }

    #[tokio::test]
    async fn test_live_message_from_peer_appended() {
        let (mut conversation, remote) = connected("alice", "bob");

        remote
            .inbound
            .send(live("bob", seal("alice", "bob", "yo")))
            .await
            .unwrap();
        let frame = conversation.next_live().await.unwrap();
        let id = conversation.receive_live(frame).unwrap();

        let message = conversation.message(id).unwrap();
        assert_eq!(message.body, Body::Text("yo".into()));
        assert!(!message.is_mine);
        assert_eq!(message.status, MessageStatus::Confirmed);
        assert_eq!(message.origin, Origin::Live);
    }

    #[tokio::test]
    async fn test_live_undecryptable_marked() {
        let (mut conversation, _remote) = connected("alice", "bob");

        let id = conversation
            .receive_live(live("bob", seal("bob", "carol", "wrong key")))
            .unwrap();
        assert_eq!(conversation.message(id).unwrap().body, Body::Undecryptable);
    }

    #[tokio::test]
    async fn test_event_from_third_party_ignored() {
        let (mut conversation, _remote) = connected("alice", "bob");

        assert_eq!(
            conversation.receive_live(live("carol", seal("alice", "carol", "psst"))),
            None
        );
        assert!(conversation.messages().is_empty());
    }

    #[tokio::test]
    async fn test_connection_drop_is_silent() {
        let (mut conversation, remote) = connected("alice", "bob");
        drop(remote);

        assert!(conversation.next_live().await.is_none());
        assert!(!conversation.is_connected());

        let later =
            tokio::time::timeout(Duration::from_millis(50), conversation.next_live()).await;
        assert!(later.is_err());

        // Sending after the drop fails on the message instead of vanishing
        conversation.set_compose("anyone?");
        let id = conversation.send_local().await.unwrap();
        assert_eq!(conversation.message(id).unwrap().status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_connection_never_yields_events() {
        let mut conversation = Conversation::new(id("alice"), id("bob"), SessionOptions::default());
        let waited =
            tokio::time::timeout(Duration::from_millis(20), conversation.next_live()).await;
        assert!(waited.is_err());
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_stage_is_optimistic() {
        let (mut conversation, _remote) = connected("alice", "bob");
        conversation.set_compose("hello");

        let outgoing = conversation.stage_send().unwrap();

        assert_eq!(conversation.compose(), "");
        let message = conversation.message(outgoing.id()).unwrap();
        assert_eq!(message.body, Body::Text("hello".into()));
        assert!(message.is_mine);
        assert_eq!(message.status, MessageStatus::Pending);
        assert_eq!(message.origin, Origin::Local);
    }

    #[tokio::test]
    async fn test_blank_input_ignored() {
        let (mut conversation, _remote) = connected("alice", "bob");

        conversation.set_compose("   \n");
        assert!(conversation.stage_send().is_none());
        assert_eq!(conversation.compose(), "   \n");
        assert!(conversation.messages().is_empty());
    }

    #[tokio::test]
    async fn test_missing_connection_ignored() {
        let mut conversation = Conversation::new(id("alice"), id("bob"), SessionOptions::default());

        conversation.set_compose("hello");
        assert!(conversation.stage_send().is_none());
        assert_eq!(conversation.compose(), "hello");
        assert!(conversation.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_confirms_same_message() {
        let (mut conversation, remote) = connected("alice", "bob");
        let mut seen = ack_all(remote.writes);

        conversation.set_compose("hello");
        let sent = conversation.send_local().await.unwrap();

        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.message(sent).unwrap().status, MessageStatus::Confirmed);

        let frame = seen.recv().await.unwrap();
        assert_eq!(frame.to.as_str(), "bob");
        let key = SharedKey::derive(&id("bob"), &id("alice"));
        assert_eq!(crypto::decrypt(&key, &frame.ciphertext).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_transport_error_marks_failed() {
        let (mut conversation, mut remote) = connected("alice", "bob");
        tokio::spawn(async move {
            while let Some(write) = remote.writes.recv().await {
                write.complete(Err(NetError::ConnectionClosed));
            }
        });

        conversation.set_compose("doomed");
        let id = conversation.send_local().await.unwrap();

        assert_eq!(conversation.messages().len(), 1);
        let message = conversation.message(id).unwrap();
        assert_eq!(message.status, MessageStatus::Failed);
        assert_eq!(message.body, Body::Text("doomed".into()));
        assert_eq!(conversation.compose(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_marks_failed() {
        let options = SessionOptions {
            history_timeout: None,
            send_timeout: Some(Duration::from_secs(1)),
        };
        let mut conversation = Conversation::new(id("alice"), id("bob"), options);
        let (connection, _remote) = channel(8);
        conversation.attach_connection(connection);

        // Nobody acknowledges the write
        conversation.set_compose("stuck");
        let outgoing = conversation.stage_send().unwrap();
        let outcome = outgoing.dispatch().await;
        assert!(matches!(outcome.result, Err(SendError::TimedOut(_))));

        let id = outcome.id;
        assert_eq!(conversation.complete_send(outcome), Some(MessageStatus::Failed));
        assert_eq!(conversation.message(id).unwrap().status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_interleaved_send_and_receive() {
        let (mut conversation, remote) = connected("alice", "bob");
        let RemoteEnd { writes, inbound } = remote;

        conversation.set_compose("hi");
        let outgoing = conversation.stage_send().unwrap();

        // Peer message lands while ours is still pending
        inbound
            .send(live("bob", seal("alice", "bob", "sup")))
            .await
            .unwrap();
        let frame = conversation.next_live().await.unwrap();
        conversation.receive_live(frame).unwrap();

        let _seen = ack_all(writes);
        let outcome = outgoing.dispatch().await;
        assert_eq!(conversation.complete_send(outcome), Some(MessageStatus::Confirmed));

        assert_eq!(
            texts(&conversation),
            [
                ("alice".to_string(), Some("hi".to_string()), MessageStatus::Confirmed),
                ("bob".to_string(), Some("sup".to_string()), MessageStatus::Confirmed),
            ]
        );
    }

    #[tokio::test]
    async fn test_echo_after_send_does_not_duplicate() {
        let (mut conversation, remote) = connected("alice", "bob");
        let _seen = ack_all(remote.writes);

        conversation.set_compose("once");
        conversation.send_local().await.unwrap();
        conversation.receive_live(live("alice", seal("alice", "bob", "once")));

        assert_eq!(conversation.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_outcome_ignored() {
        let (mut old, old_remote) = connected("alice", "bob");
        let _seen = ack_all(old_remote.writes);
        old.set_compose("from before");
        let outgoing = old.stage_send().unwrap();
        let outcome = outgoing.dispatch().await;

        let (mut fresh, _remote) = connected("alice", "bob");
        fresh.set_compose("new");
        let staged = fresh.stage_send().unwrap();
        assert_eq!(staged.id(), outcome.id);

        assert_eq!(fresh.complete_send(outcome), None);
        assert_eq!(fresh.message(staged.id()).unwrap().status, MessageStatus::Pending);
    }

    #[tokio::test]
    async fn test_retry_failed_message_in_place() {
        let (mut conversation, mut remote) = connected("alice", "bob");

        conversation.set_compose("again");
        let first = conversation.stage_send().unwrap();
        let (outcome, ()) = tokio::join!(first.dispatch(), async {
            let write = remote.writes.recv().await.unwrap();
            write.complete(Err(NetError::ConnectionClosed));
        });
        let id = outcome.id;
        conversation.complete_send(outcome);
        assert_eq!(conversation.message(id).unwrap().status, MessageStatus::Failed);

        let retry = conversation.retry(id).unwrap();
        assert_eq!(retry.id(), id);
        assert_eq!(conversation.message(id).unwrap().status, MessageStatus::Pending);

        let _seen = ack_all(remote.writes);
        let outcome = retry.dispatch().await;
        assert_eq!(conversation.complete_send(outcome), Some(MessageStatus::Confirmed));
        assert_eq!(conversation.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_rejects_non_failed() {
        let (mut conversation, remote) = connected("alice", "bob");
        let _seen = ack_all(remote.writes);

        conversation.set_compose("fine");
        let id = conversation.send_local().await.unwrap();
        assert!(conversation.retry(id).is_none());

        let theirs = conversation
            .receive_live(live("bob", seal("alice", "bob", "x")))
            .unwrap();
        assert!(conversation.retry(theirs).is_none());
        assert!(conversation.retry(MessageId(99)).is_none());
    }

    #[tokio::test]
    async fn test_ids_unique_across_sources() {
        let history = FixedHistory(Ok(vec![record("bob", seal("alice", "bob", "h"))]));
        let mut conversation = Conversation::new(id("alice"), id("bob"), SessionOptions::default());
        conversation.load_history(&history).await.unwrap();
        let (connection, remote) = channel(8);
        conversation.attach_connection(connection);
        let _seen = ack_all(remote.writes);

        let live_id = conversation
            .receive_live(live("bob", seal("alice", "bob", "l")))
            .unwrap();
        conversation.set_compose("m");
        let local_id = conversation.send_local().await.unwrap();

        let ids: Vec<_> = conversation.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, [MessageId(0), live_id, local_id]);
        assert!(live_id < local_id);
    }
}
