//! Transport seam between the engine and the socket.
//!
//! The engine never blocks on the network. It calls [`Transport::poll`] from
//! `tick()` and handles whatever events arrived since the previous call.

mod mock;
mod ws;

pub use mock::MockTransport;
pub use ws::WsTransport;

use crate::endpoint::Endpoint;
use crate::error::Result;

/// Something the socket reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The WebSocket handshake completed.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The socket closed.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// The socket failed.
    Error {
        /// Diagnostic text.
        detail: String,
        /// The failure happened during the TLS handshake.
        tls_handshake: bool,
    },
}

/// A message-oriented, non-blocking socket.
pub trait Transport {
    /// Start connecting to `endpoint`. Completion is reported by
    /// [`TransportEvent::Opened`] or a failure event from [`poll`](Self::poll).
    ///
    /// Any previous connection is dropped first.
    fn open(&mut self, endpoint: &Endpoint) -> Result<()>;

    /// Queue a text frame.
    fn send(&mut self, text: &str) -> Result<()>;

    /// Close the connection. Events of the closed connection are discarded.
    fn close(&mut self);

    /// Drain events that arrived since the last call, in arrival order.
    fn poll(&mut self) -> Vec<TransportEvent>;
}
