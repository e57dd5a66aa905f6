//! # clawlink-proto
//!
//! Wire definitions for the clawlink device-to-gateway protocol.
//!
//! Every frame is a JSON object sent in a WebSocket text message. Three frame
//! kinds exist, discriminated by the `type` field:
//!
//! - `req`: `{type, id, method, params}`, sent by the device (and occasionally the gateway)
//! - `res`: `{type, id, ok, payload | error}`, correlated to a request by `id`
//! - `event`: `{type, event, payload}`, server pushes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connect;
pub mod error;
pub mod frames;
pub mod invoke;

pub use connect::{
    AuthParams, ClientInfo, ConnectChallenge, ConnectParams, DeviceAuth, HelloAuth, HelloOk,
    PROTOCOL_VERSION,
};
pub use error::ProtoError;
pub use frames::{ErrorShape, EventFrame, Frame, RequestFrame, ResponseFrame};
pub use invoke::{InvokeError, NodeEventParams, NodeInvokeRequest, NodeInvokeResultParams};

/// Method name of the authentication handshake request.
pub const METHOD_CONNECT: &str = "connect";
/// Method name used to publish a node event.
pub const METHOD_NODE_EVENT: &str = "node.event";
/// Method name used to report the outcome of a remote invocation.
pub const METHOD_NODE_INVOKE_RESULT: &str = "node.invoke.result";

/// Event pushed by the gateway right after the socket opens, carrying a nonce.
pub const EVENT_CONNECT_CHALLENGE: &str = "connect.challenge";
/// Event carrying a server-initiated remote invocation.
pub const EVENT_NODE_INVOKE_REQUEST: &str = "node.invoke.request";
/// Gateway keepalive event.
pub const EVENT_TICK: &str = "tick";
