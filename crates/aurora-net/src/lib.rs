// Network layer: the live WebSocket channel and the history HTTP endpoint.

pub mod endpoints;
pub mod error;
pub mod history;
pub mod transport;
pub mod websocket;

pub use endpoints::Endpoints;
pub use error::NetError;
pub use history::{HistorySource, HttpHistory};
pub use transport::{channel, Connection, OutboundHandle, PendingWrite, RemoteEnd, Transport};
pub use websocket::WsTransport;
