//! Clawlink - device-side gateway link.
//!
//! Keeps an authenticated WebSocket session to a gateway, answers remote
//! invocations, publishes node events and collects user messages into a
//! bounded inbox.
//!
//! The engine is single-threaded and cooperative: the application calls
//! [`GatewayEngine::tick`] from its own loop, and all state changes happen
//! inside that call. Sockets, storage and time are collaborators behind the
//! [`Transport`], [`Persistence`] and [`Clock`] traits.
//!
//! ```no_run
//! use clawlink::{EngineSettings, GatewayConfig, GatewayEngine, MemoryPersistence, WsTransport};
//!
//! # async fn demo() -> Result<(), clawlink::GatewayError> {
//! let mut engine = GatewayEngine::new(
//!     WsTransport::current()?,
//!     MemoryPersistence::new(),
//!     EngineSettings::default(),
//! );
//! engine.configure(GatewayConfig::with_token("wss://gateway.example.com", "token"));
//! engine.connect_now()?;
//! loop {
//!     engine.tick();
//!     tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//! }
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod correlator;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod inbox;
pub mod persist;
pub mod signature;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthMode, ClientProfile, Credential, EngineSettings, GatewayConfig, LinkFileConfig};
pub use correlator::RequestCorrelator;
pub use endpoint::Endpoint;
pub use error::{AuthRejectReason, GatewayError, Result};
pub use gateway::{ConnectionState, ConnectionStatus, GatewayEngine, InvokeRequest};
pub use identity::{DeviceIdentity, IdentityStore};
pub use inbox::{Inbox, InboxMessage, INBOX_CAPACITY};
pub use persist::{JsonFilePersistence, MemoryPersistence, Persistence};
pub use transport::{MockTransport, Transport, TransportEvent, WsTransport};
