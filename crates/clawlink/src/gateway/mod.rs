//! Gateway connection engine.
//!
//! [`GatewayEngine`] drives the socket lifecycle, the signed `connect`
//! handshake with device-token/shared-credential fallback, request
//! correlation, reconnect pacing and inbound event routing.

mod engine;
mod events;
mod handshake;
mod reconnect;
mod state;

pub use engine::GatewayEngine;
pub use events::{InvokeHandler, InvokeRequest, TelemetryBuilder};
pub use handshake::{build_connect_params, ConnectAttempt};
pub use reconnect::{calculate_backoff, RetryPolicy};
pub use state::{ConnectionState, ConnectionStatus};
