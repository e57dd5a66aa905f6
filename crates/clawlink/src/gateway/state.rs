//! Connection state types.

use serde::Serialize;

/// State of the gateway connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Idle,
    /// Socket requested, waiting for it to open.
    Connecting,
    /// Socket open, handshake not sent yet.
    TransportOpen,
    /// `connect` request sent, waiting for the answer.
    Authenticating,
    /// Handshake accepted.
    Ready,
}

impl ConnectionState {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::TransportOpen => "transport-open",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
        }
    }

    /// Whether a socket is open in this state.
    #[must_use]
    pub const fn has_socket(self) -> bool {
        matches!(self, Self::TransportOpen | Self::Authenticating | Self::Ready)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of the link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// The engine is trying to stay connected.
    pub should_connect: bool,
    /// A socket is open.
    pub ws_connected: bool,
    /// The handshake completed; implies `ws_connected`.
    pub gateway_ready: bool,
    /// Most recent diagnostic, empty when none.
    pub last_error: String,
    /// Monotonic time of the last connection attempt (0 = never).
    pub last_connect_attempt_ms: u64,
    /// Monotonic time of the last successful handshake (0 = never).
    pub last_connect_ok_ms: u64,
    /// Current state.
    pub state: ConnectionState,
    /// Consecutive TLS handshake failures.
    pub tls_fail_streak: u32,
}
