//! WebSocket implementation of [`Transport`].
//!
//! One connection per local identity at `{ws_base}/ws/{me}`. A writer task
//! serializes outbound frames as JSON text messages and acknowledges each
//! one after the socket accepted it; a reader task parses inbound text
//! messages into [`InboundFrame`]s. Both tasks are attached to the returned
//! [`Connection`] and die with it.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use aurora_shared::protocol::InboundFrame;
use aurora_shared::Identity;

use crate::endpoints::Endpoints;
use crate::error::NetError;
use crate::transport::{channel, Connection, RemoteEnd, Transport};

/// Default capacity of the per-connection frame queues.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct WsTransport {
    endpoints: Endpoints,
    capacity: usize,
}

impl WsTransport {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, me: &Identity) -> Result<Connection, NetError> {
        let url = self.endpoints.live_url(me)?;
        let (stream, _response) = connect_async(url.as_str()).await?;
        info!(identity = %me, url = %url, "Live channel connected");

        let (mut sink, mut source) = stream.split();
        let (mut connection, remote) = channel(self.capacity);
        let RemoteEnd {
            mut writes,
            inbound,
        } = remote;

        let writer = tokio::spawn(async move {
            while let Some(write) = writes.recv().await {
                let result = match write.frame.to_json() {
                    Ok(json) => sink.send(Message::Text(json)).await.map_err(NetError::from),
                    Err(e) => Err(NetError::from(e)),
                };

                let failed = result.is_err();
                if let Err(ref e) = result {
                    warn!(error = %e, "Live channel write failed");
                }
                write.complete(result);
                if failed {
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("Live channel writer stopped");
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match InboundFrame::from_json(&text) {
                        Ok(frame) => {
                            debug!(from = %frame.from, "Live frame received");
                            if inbound.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Skipping malformed live frame");
                        }
                    },
                    Ok(Message::Close(close)) => {
                        debug!(frame = ?close, "Live channel closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Live channel read failed");
                        break;
                    }
                }
            }
            debug!("Live channel reader stopped");
        });

        connection.attach(writer);
        connection.attach(reader);
        Ok(connection)
    }
}
