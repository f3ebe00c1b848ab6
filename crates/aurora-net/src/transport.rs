//! Live duplex connection, modelled as a pair of tokio channels.
//!
//! A [`Connection`] is the local half: it sends [`OutboundFrame`]s and
//! receives [`InboundFrame`]s. The [`RemoteEnd`] is the other half, driven
//! by whatever actually moves bytes (the WebSocket tasks in
//! [`crate::websocket`], or a test). Every outbound frame carries a oneshot
//! acknowledgment so `send` resolves only once the frame has been written
//! out, or fails.
//!
//! Dropping a `Connection` aborts the I/O tasks attached to it, which closes
//! both channels: no inbound event is delivered afterwards and any send
//! still in flight fails with [`NetError::ConnectionClosed`].

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use aurora_shared::protocol::{InboundFrame, OutboundFrame};
use aurora_shared::Identity;

use crate::error::NetError;

/// Opens live connections addressed by the local identity.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, me: &Identity) -> Result<Connection, NetError>;
}

/// An outbound frame waiting to be written, plus its acknowledgment.
#[derive(Debug)]
pub struct PendingWrite {
    pub frame: OutboundFrame,
    ack: oneshot::Sender<Result<(), NetError>>,
}

impl PendingWrite {
    /// Report the outcome of the write back to the sender.
    pub fn complete(self, result: Result<(), NetError>) {
        // The sender may have stopped waiting (conversation closed).
        let _ = self.ack.send(result);
    }
}

/// Cloneable sending half of a connection.
///
/// Sends do not borrow the [`Connection`], so a send can be awaited while
/// the owner keeps receiving.
#[derive(Debug, Clone)]
pub struct OutboundHandle {
    tx: mpsc::Sender<PendingWrite>,
}

impl OutboundHandle {
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), NetError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(PendingWrite { frame, ack: ack_tx })
            .await
            .map_err(|_| NetError::ConnectionClosed)?;

        ack_rx.await.map_err(|_| NetError::ConnectionClosed)?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Local half of a live connection.
#[derive(Debug)]
pub struct Connection {
    outbound: OutboundHandle,
    inbound: mpsc::Receiver<InboundFrame>,
    closed: bool,
    tasks: Vec<JoinHandle<()>>,
}

/// Remote half of a live connection.
#[derive(Debug)]
pub struct RemoteEnd {
    /// Frames the local side wants written.
    pub writes: mpsc::Receiver<PendingWrite>,
    /// Events to deliver to the local side.
    pub inbound: mpsc::Sender<InboundFrame>,
}

/// Create a connected `Connection`/`RemoteEnd` pair.
pub fn channel(capacity: usize) -> (Connection, RemoteEnd) {
    let capacity = capacity.max(1);
    let (write_tx, write_rx) = mpsc::channel(capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

    let connection = Connection {
        outbound: OutboundHandle { tx: write_tx },
        inbound: inbound_rx,
        closed: false,
        tasks: Vec::new(),
    };
    let remote = RemoteEnd {
        writes: write_rx,
        inbound: inbound_tx,
    };
    (connection, remote)
}

impl Connection {
    /// Tie a background task's lifetime to this connection.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn outbound(&self) -> OutboundHandle {
        self.outbound.clone()
    }

    pub async fn send(&self, frame: OutboundFrame) -> Result<(), NetError> {
        self.outbound.send(frame).await
    }

    /// Next inbound event.
    ///
    /// Returns `None` exactly once, when the remote side goes away. After
    /// that the future never resolves, so a `select!` loop simply stops
    /// seeing events from this connection.
    pub async fn recv(&mut self) -> Option<InboundFrame> {
        if self.closed {
            return std::future::pending().await;
        }

        match self.inbound.recv().await {
            Some(frame) => Some(frame),
            None => {
                debug!("Live connection closed by remote");
                self.closed = true;
                None
            }
        }
    }

    /// Whether the inbound side has been observed closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
