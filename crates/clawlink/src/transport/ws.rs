//! WebSocket transport on tokio-tungstenite.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use super::{Transport, TransportEvent};
use crate::endpoint::Endpoint;
use crate::error::{GatewayError, Result};

/// Upper bound on TCP connect plus TLS and WebSocket handshakes.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

enum Command {
    Send(String),
    Close,
}

struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    task: JoinHandle<()>,
}

/// Transport running each socket in a spawned tokio task.
///
/// Frames cross unbounded channels, so [`Transport::poll`] never blocks.
/// Every `open` gets fresh channels; events of an older socket are dropped
/// with its receiver.
pub struct WsTransport {
    runtime: Handle,
    connection: Option<Connection>,
}

impl WsTransport {
    /// Transport spawning onto `runtime`.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            connection: None,
        }
    }

    /// Transport spawning onto the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] outside a tokio runtime.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| GatewayError::Transport(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(runtime))
    }

    /// Whether a socket task is alive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| !c.task.is_finished())
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, endpoint: &Endpoint) -> Result<()> {
        self.close();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let url = endpoint.to_url();
        debug!(url = %url, "opening websocket");
        let task = self.runtime.spawn(run_socket(url, cmd_rx, event_tx));

        self.connection = Some(Connection {
            commands: cmd_tx,
            events: event_rx,
            task,
        });
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| GatewayError::Transport("socket not open".to_string()))?;
        connection
            .commands
            .send(Command::Send(text.to_string()))
            .map_err(|_| GatewayError::Transport("socket task has stopped".to_string()))
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            // The task exits on Close or when the command channel drops.
            let _ = connection.commands.send(Command::Close);
        }
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        if let Some(connection) = self.connection.as_mut() {
            while let Ok(event) = connection.events.try_recv() {
                out.push(event);
            }
        }
        out
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_tls_error(err: &tungstenite::Error) -> bool {
    matches!(err, tungstenite::Error::Tls(_))
}

async fn run_socket(
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let connected =
        tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str())).await;
    let ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            let tls_handshake = is_tls_error(&e);
            warn!(url = %url, error = %e, tls_handshake, "websocket connect failed");
            let _ = events.send(TransportEvent::Error {
                detail: format!("connect failed: {e}"),
                tls_handshake,
            });
            return;
        }
        Err(_) => {
            warn!(url = %url, "websocket connect timed out");
            let _ = events.send(TransportEvent::Error {
                detail: format!("connect timed out after {}s", CONNECT_TIMEOUT.as_secs()),
                tls_handshake: false,
            });
            return;
        }
    };

    if events.send(TransportEvent::Opened).is_err() {
        return;
    }

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        let _ = events.send(TransportEvent::Error {
                            detail: format!("send failed: {e}"),
                            tls_handshake: false,
                        });
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    debug!(url = %url, "websocket closed locally");
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(TransportEvent::Message(text)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if events.send(TransportEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Err(_) => debug!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(u16::from(f.code)), f.reason.to_string())
                    });
                    let _ = events.send(TransportEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error {
                        detail: e.to_string(),
                        tls_handshake: false,
                    });
                    break;
                }
                None => {
                    let _ = events.send(TransportEvent::Closed {
                        code: None,
                        reason: "connection closed".to_string(),
                    });
                    break;
                }
            },
        }
    }
}
