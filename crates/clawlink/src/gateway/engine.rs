//! The connection state machine.
//!
//! Everything happens inside [`GatewayEngine::tick`] or one of the explicit
//! control calls. The engine owns its transport and never blocks: socket
//! events are drained from [`Transport::poll`] once per tick and handled in
//! arrival order.

use clawlink_proto::{
    ConnectChallenge, EventFrame, Frame, HelloOk, NodeEventParams, NodeInvokeRequest,
    NodeInvokeResultParams, RequestFrame, ResponseFrame, EVENT_CONNECT_CHALLENGE,
    EVENT_NODE_INVOKE_REQUEST, EVENT_TICK, METHOD_CONNECT, METHOD_NODE_EVENT,
    METHOD_NODE_INVOKE_RESULT,
};
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};

use super::events::{InvokeHandler, InvokeRequest, TelemetryBuilder};
use super::handshake::{build_connect_params, ConnectAttempt};
use super::reconnect::RetryPolicy;
use super::state::{ConnectionState, ConnectionStatus};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineSettings, GatewayConfig};
use crate::correlator::RequestCorrelator;
use crate::endpoint::Endpoint;
use crate::error::{AuthRejectReason, GatewayError, Result};
use crate::identity::{DeviceIdentity, IdentityStore};
use crate::inbox::{Inbox, InboxMessage};
use crate::persist::Persistence;
use crate::signature::generate_nonce;
use crate::transport::{Transport, TransportEvent};

const CONNECT_ID_PREFIX: &str = "connect";
const TELEMETRY_EVENT: &str = "telemetry";
const INVOKE_UNSUPPORTED: &str = "UNSUPPORTED_COMMAND";

/// Device-side gateway link.
pub struct GatewayEngine<T: Transport, P: Persistence, C: Clock = SystemClock> {
    transport: T,
    persistence: P,
    clock: C,
    settings: EngineSettings,
    retry: RetryPolicy,

    config: GatewayConfig,
    endpoint: Option<Endpoint>,
    identity: IdentityStore,
    correlator: RequestCorrelator,
    inbox: Inbox,

    state: ConnectionState,
    should_connect: bool,
    ws_connected: bool,
    gateway_ready: bool,
    last_error: String,
    last_attempt_ms: Option<u64>,
    last_connect_ok_ms: u64,
    last_telemetry_ms: u64,
    tls_fail_streak: u32,
    attempt: Option<ConnectAttempt>,

    invoke_handler: Option<InvokeHandler>,
    telemetry_builder: Option<TelemetryBuilder>,
}

impl<T: Transport, P: Persistence> GatewayEngine<T, P, SystemClock> {
    /// Engine on the system clock.
    pub fn new(transport: T, persistence: P, settings: EngineSettings) -> Self {
        Self::with_clock(transport, persistence, SystemClock::new(), settings)
    }
}

impl<T: Transport, P: Persistence, C: Clock> GatewayEngine<T, P, C> {
    /// Engine with an explicit clock.
    ///
    /// The stored identity and config are restored from `persistence`; the
    /// engine stays idle until [`connect_now`](Self::connect_now).
    pub fn with_clock(transport: T, persistence: P, clock: C, settings: EngineSettings) -> Self {
        let identity = IdentityStore::restore(&persistence);
        let config = persistence.load_config().unwrap_or_default();
        let endpoint = config.endpoint().ok();
        if endpoint.is_some() {
            debug!(url = %config.url, "restored gateway config");
        }
        let retry = RetryPolicy::from_settings(&settings);

        Self {
            transport,
            persistence,
            clock,
            settings,
            retry,
            config,
            endpoint,
            identity,
            correlator: RequestCorrelator::new(),
            inbox: Inbox::new(),
            state: ConnectionState::Idle,
            should_connect: false,
            ws_connected: false,
            gateway_ready: false,
            last_error: String::new(),
            last_attempt_ms: None,
            last_connect_ok_ms: 0,
            last_telemetry_ms: 0,
            tls_fail_streak: 0,
            attempt: None,
            invoke_handler: None,
            telemetry_builder: None,
        }
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    /// Apply a new URL/credential set.
    ///
    /// A material change tears down any live session. An empty URL also
    /// stops reconnecting. The config is saved best-effort.
    pub fn configure(&mut self, mut config: GatewayConfig) {
        let reset_identity = std::mem::take(&mut config.reset_device_identity);
        let changed = self.config.materially_differs(&config);
        let url_changed = self.config.url.trim() != config.url.trim();

        if reset_identity {
            if let Err(e) = self.identity.clear(&mut self.persistence) {
                self.record_error(e);
            }
        }

        self.config = config;
        self.endpoint = self.config.endpoint().ok();
        if url_changed {
            self.tls_fail_streak = 0;
        }

        if !self.config.has_url() {
            info!("gateway url cleared");
            self.should_connect = false;
            self.teardown("gateway url cleared");
        } else if (changed || reset_identity) && self.state != ConnectionState::Idle {
            info!(url = %self.config.url, "gateway config changed, dropping session");
            self.teardown("configuration changed");
            self.last_attempt_ms = None;
        }

        if self.config.has_url() && self.endpoint.is_none() {
            if let Err(e) = self.config.endpoint() {
                self.record_error(e);
            }
        }

        if changed {
            if let Err(e) = self.persistence.save_config(&self.config) {
                self.record_error(e);
            }
        }
    }

    /// Start connecting. The first attempt happens on the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotConfigured`] if the URL is empty or invalid.
    pub fn connect_now(&mut self) -> Result<()> {
        let endpoint = self.require_endpoint()?;
        if !self.should_connect {
            self.last_attempt_ms = None;
        }
        self.should_connect = true;
        info!(url = %endpoint, "connect requested");
        Ok(())
    }

    /// Tear down any session and stop reconnecting.
    pub fn disconnect_now(&mut self) {
        self.should_connect = false;
        self.teardown("disconnect requested");
    }

    /// Tear down any session and connect again on the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotConfigured`] if the URL is empty or invalid.
    pub fn reconnect_now(&mut self) -> Result<()> {
        let endpoint = self.require_endpoint()?;
        self.teardown("reconnect requested");
        self.should_connect = true;
        self.last_attempt_ms = None;
        info!(url = %endpoint, "reconnect requested");
        Ok(())
    }

    /// Drive the link: pump socket events, finish a pending handshake send,
    /// start a connection attempt when due, and emit telemetry when due.
    pub fn tick(&mut self) {
        self.pump_transport();
        self.drive_handshake();
        self.maybe_connect();
        self.maybe_send_telemetry();
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Handshake accepted and socket open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.gateway_ready && self.ws_connected && self.state == ConnectionState::Ready
    }

    /// Most recent diagnostic, empty when none.
    #[must_use]
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Snapshot of the link.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            should_connect: self.should_connect,
            ws_connected: self.ws_connected,
            gateway_ready: self.gateway_ready && self.ws_connected,
            last_error: self.last_error.clone(),
            last_connect_attempt_ms: self.last_attempt_ms.unwrap_or(0),
            last_connect_ok_ms: self.last_connect_ok_ms,
            state: self.state,
            tls_fail_streak: self.tls_fail_streak,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Active config.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Engine settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Device identity, once created or restored.
    #[must_use]
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.current()
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Spacing the next connection attempt must respect.
    #[must_use]
    pub fn current_retry_delay(&self) -> std::time::Duration {
        self.retry.delay_for_streak(self.tls_fail_streak)
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Publish a node event. Returns the request id.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotReady`] without touching the socket when the link is
    /// not ready; [`GatewayError::Transport`] if the write fails.
    pub fn send_node_event(&mut self, event: &str, payload: Value) -> Result<String> {
        let params = NodeEventParams {
            event: event.to_string(),
            payload,
        };
        self.send_request(METHOD_NODE_EVENT, serde_json::to_value(params)?)
    }

    /// Report a successful invocation. Returns the request id.
    ///
    /// # Errors
    ///
    /// Same as [`send_node_event`](Self::send_node_event).
    pub fn send_invoke_ok(&mut self, invoke_id: &str, node_id: &str, payload: Value) -> Result<String> {
        let params = NodeInvokeResultParams::ok(invoke_id, node_id, payload);
        self.send_request(METHOD_NODE_INVOKE_RESULT, serde_json::to_value(params)?)
    }

    /// Report a failed invocation. Returns the request id.
    ///
    /// # Errors
    ///
    /// Same as [`send_node_event`](Self::send_node_event).
    pub fn send_invoke_error(
        &mut self,
        invoke_id: &str,
        node_id: &str,
        code: &str,
        message: &str,
    ) -> Result<String> {
        let params = NodeInvokeResultParams::error(invoke_id, node_id, code, message);
        self.send_request(METHOD_NODE_INVOKE_RESULT, serde_json::to_value(params)?)
    }

    fn send_request(&mut self, method: &str, params: Value) -> Result<String> {
        if !self.is_ready() {
            return Err(GatewayError::NotReady);
        }
        let id = self.correlator.register(method);
        let json = RequestFrame::new(id.clone(), method, params).to_json()?;
        if let Err(e) = self.transport.send(&json) {
            self.correlator.forget(&id);
            warn!(id = %id, method, error = %e, "request write failed");
            self.last_error = e.to_string();
            return Err(e);
        }
        trace!(id = %id, method, "request sent");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Inbox and hooks
    // ------------------------------------------------------------------

    /// Number of stored inbox messages.
    #[must_use]
    pub fn inbox_count(&self) -> usize {
        self.inbox.count()
    }

    /// Inbox message at `index`, oldest first.
    #[must_use]
    pub fn inbox_message(&self, index: usize) -> Option<&InboxMessage> {
        self.inbox.get(index)
    }

    /// The whole inbox.
    #[must_use]
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Empty the inbox.
    pub fn clear_inbox(&mut self) {
        self.inbox.clear();
    }

    /// Register the invocation handler, replacing any previous one.
    pub fn set_invoke_request_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&InvokeRequest) + Send + 'static,
    {
        self.invoke_handler = Some(Box::new(handler));
    }

    /// Register the telemetry builder, replacing any previous one.
    pub fn set_telemetry_builder<F>(&mut self, builder: F)
    where
        F: FnMut(&mut Map<String, Value>) + Send + 'static,
    {
        self.telemetry_builder = Some(Box::new(builder));
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_endpoint(&mut self) -> Result<Endpoint> {
        match self.config.endpoint() {
            Ok(endpoint) => {
                self.endpoint = Some(endpoint.clone());
                Ok(endpoint)
            }
            Err(e) => {
                self.last_error = e.to_string();
                warn!(error = %e, "cannot connect");
                Err(e)
            }
        }
    }

    fn record_error(&mut self, err: GatewayError) {
        warn!(state = %self.state, error = %err, "gateway link error");
        self.last_error = err.to_string();
    }

    /// Close the socket and drop all per-connection state.
    fn teardown(&mut self, reason: &str) {
        let had_session = self.state != ConnectionState::Idle;
        if had_session {
            self.transport.close();
        }
        let dropped = self.correlator.pending_count();
        self.correlator.clear_all();
        self.attempt = None;
        self.ws_connected = false;
        self.gateway_ready = false;
        self.state = ConnectionState::Idle;
        if had_session {
            info!(reason, dropped_requests = dropped, "gateway session torn down");
        }
    }

    fn pump_transport(&mut self) {
        for event in self.transport.poll() {
            if self.state == ConnectionState::Idle {
                debug!(?event, "discarding event for closed socket");
                break;
            }
            self.handle_transport_event(event);
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(text) => self.handle_frame(&text),
            TransportEvent::Closed { code, reason } => {
                let detail = match code {
                    Some(code) => format!("connection closed ({code}): {reason}"),
                    None => format!("connection closed: {reason}"),
                };
                self.record_error(GatewayError::Transport(detail));
                self.teardown("socket closed");
            }
            TransportEvent::Error {
                detail,
                tls_handshake,
            } => {
                let secure = self.endpoint.as_ref().is_some_and(|e| e.secure);
                if tls_handshake && secure && self.state == ConnectionState::Connecting {
                    self.tls_fail_streak = self.tls_fail_streak.saturating_add(1);
                    warn!(
                        streak = self.tls_fail_streak,
                        next_retry_ms = self.current_retry_delay().as_millis() as u64,
                        "tls handshake failed"
                    );
                }
                self.record_error(GatewayError::Transport(detail));
                self.teardown("socket error");
            }
        }
    }

    fn on_opened(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "ignoring unexpected open");
            return;
        }
        self.ws_connected = true;
        self.state = ConnectionState::TransportOpen;
        if self.endpoint.as_ref().is_some_and(|e| e.secure) {
            self.tls_fail_streak = 0;
        }
        info!("gateway socket open");

        if let Err(e) = self.identity.ensure(&mut self.persistence) {
            self.record_error(e);
            self.teardown("device identity unavailable");
            return;
        }

        let shared = self.config.shared_credential();
        let used_device_token = !(self.config.prefer_shared_credential && shared.is_some());
        let can_fallback = used_device_token && shared.is_some();
        self.attempt = Some(ConnectAttempt::new(
            generate_nonce(),
            self.clock.now_ms(),
            used_device_token,
            can_fallback,
        ));
        debug!(used_device_token, can_fallback, "handshake queued");
        self.drive_handshake();
    }

    /// Send the queued `connect` request once it is due.
    fn drive_handshake(&mut self) {
        if self.state != ConnectionState::TransportOpen {
            return;
        }
        let now = self.clock.now_ms();
        let due = self
            .attempt
            .as_ref()
            .is_some_and(|a| a.ready_to_send(now, self.settings.challenge_wait));
        if due {
            self.send_connect();
        }
    }

    fn send_connect(&mut self) {
        let Some(identity) = self.identity.current().cloned() else {
            self.record_error(GatewayError::PersistenceFailed(
                "device identity missing".to_string(),
            ));
            self.teardown("device identity unavailable");
            return;
        };
        let Some(used_device_token) = self.attempt.as_ref().map(|a| a.used_device_token) else {
            return;
        };

        let shared = if used_device_token {
            None
        } else if let Some(credential) = self.config.shared_credential() {
            Some(credential)
        } else {
            self.record_error(GatewayError::NotConfigured(
                "shared credential missing".to_string(),
            ));
            self.teardown("shared credential missing");
            return;
        };

        let unix_ms = self.clock.unix_ms();
        let now = self.clock.now_ms();
        let Some(attempt) = self.attempt.as_ref() else {
            return;
        };
        let signed_at = attempt.signed_at(unix_ms, now);
        let challenge_seen = attempt.challenge_seen();
        let params = build_connect_params(
            attempt,
            &identity,
            shared.as_ref(),
            &self.settings.client,
            signed_at,
        );

        let id = self
            .correlator
            .register_with_prefix(CONNECT_ID_PREFIX, METHOD_CONNECT);
        let sent = serde_json::to_value(params)
            .map_err(GatewayError::from)
            .and_then(|p| {
                RequestFrame::new(id.clone(), METHOD_CONNECT, p)
                    .to_json()
                    .map_err(GatewayError::from)
            })
            .and_then(|json| self.transport.send(&json));

        match sent {
            Ok(()) => {
                if let Some(attempt) = self.attempt.as_mut() {
                    attempt.mark_sent(id.clone());
                }
                self.state = ConnectionState::Authenticating;
                info!(
                    id = %id,
                    device_id = %identity.device_id,
                    used_device_token,
                    challenge_seen,
                    "connect request sent"
                );
            }
            Err(e) => {
                self.correlator.forget(&id);
                self.record_error(e);
                self.teardown("connect request failed");
            }
        }
    }

    fn maybe_connect(&mut self) {
        if self.state != ConnectionState::Idle || !self.should_connect {
            return;
        }
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let now = self.clock.now_ms();
        if !self
            .retry
            .may_attempt(self.last_attempt_ms, now, self.tls_fail_streak)
        {
            return;
        }

        self.last_attempt_ms = Some(now);
        self.state = ConnectionState::Connecting;
        info!(url = %endpoint, tls_fail_streak = self.tls_fail_streak, "connecting to gateway");
        if let Err(e) = self.transport.open(&endpoint) {
            self.record_error(e);
            self.state = ConnectionState::Idle;
        }
    }

    fn maybe_send_telemetry(&mut self) {
        if !self.is_ready() {
            return;
        }
        let now = self.clock.now_ms();
        let interval = self.settings.telemetry_interval.as_millis() as u64;
        if now.saturating_sub(self.last_telemetry_ms) < interval {
            return;
        }
        let Some(builder) = self.telemetry_builder.as_mut() else {
            return;
        };
        self.last_telemetry_ms = now;

        let mut payload = Map::new();
        builder(&mut payload);
        match self.send_node_event(TELEMETRY_EVENT, Value::Object(payload)) {
            Ok(id) => trace!(id = %id, "telemetry sent"),
            Err(e) => warn!(error = %e, "telemetry send failed"),
        }
    }

    // ------------------------------------------------------------------
    // Inbound frames
    // ------------------------------------------------------------------

    fn handle_frame(&mut self, text: &str) {
        let frame = match Frame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                self.last_error = GatewayError::from(e).to_string();
                return;
            }
        };

        match frame {
            Frame::Response(response) => self.handle_response(response),
            Frame::Event(event) => self.handle_event(event),
            Frame::Request(request) => {
                debug!(id = %request.id, method = %request.method, "ignoring gateway request");
            }
        }
    }

    fn handle_response(&mut self, response: ResponseFrame) {
        if self
            .attempt
            .as_ref()
            .is_some_and(|a| a.is_response_to(&response.id))
        {
            self.correlator.forget(&response.id);
            self.handle_connect_response(response);
            return;
        }

        match self.correlator.resolve(&response.id) {
            Ok(method) if response.is_ok() => {
                trace!(id = %response.id, method = %method, "request acknowledged");
            }
            Ok(method) => {
                let error = response.error.unwrap_or_default();
                warn!(id = %response.id, method = %method, error = %error, "request rejected");
                self.last_error =
                    GatewayError::Protocol(format!("{method} rejected: {error}")).to_string();
            }
            Err(e) => debug!(error = %e, "ignoring response"),
        }
    }

    fn handle_connect_response(&mut self, response: ResponseFrame) {
        if response.is_ok() {
            let hello: HelloOk = response
                .payload
                .and_then(|p| serde_json::from_value(p).ok())
                .unwrap_or_default();
            let now = self.clock.now_ms();
            self.attempt = None;
            self.state = ConnectionState::Ready;
            self.gateway_ready = true;
            self.last_connect_ok_ms = now;
            self.last_telemetry_ms = now;
            self.last_error.clear();
            info!(protocol = ?hello.protocol, "gateway ready");

            if let Some(token) = hello.auth.and_then(|a| a.device_token) {
                if let Err(e) = self.identity.adopt_issued_token(&token, &mut self.persistence) {
                    self.record_error(e);
                }
            }
            return;
        }

        let error = response.error.unwrap_or_default();
        let Some(reason) = AuthRejectReason::from_code(&error.code) else {
            self.record_error(GatewayError::Protocol(format!("connect rejected: {error}")));
            self.teardown("handshake rejected");
            return;
        };

        let fell_back = self
            .attempt
            .as_mut()
            .is_some_and(ConnectAttempt::fall_back_to_shared);
        if fell_back {
            info!(reason = %reason, "device token rejected, retrying with shared credential");
            self.state = ConnectionState::TransportOpen;
            self.send_connect();
            return;
        }

        self.record_error(GatewayError::AuthRejected {
            reason,
            message: error.message,
        });
        self.teardown("authentication rejected");
    }

    fn handle_event(&mut self, event: EventFrame) {
        let payload = event.payload.unwrap_or(Value::Null);
        match event.event.as_str() {
            EVENT_CONNECT_CHALLENGE => self.on_challenge(payload),
            EVENT_NODE_INVOKE_REQUEST => self.on_invoke_request(payload),
            EVENT_TICK => trace!(seq = ?event.seq, "gateway tick"),
            name if InboxMessage::is_message_event(name) => self.capture_message(name, &payload),
            other => debug!(event = %other, "ignoring event"),
        }
    }

    fn on_challenge(&mut self, payload: Value) {
        let challenge: ConnectChallenge = match serde_json::from_value(payload) {
            Ok(challenge) => challenge,
            Err(e) => {
                warn!(error = %e, "malformed connect challenge");
                return;
            }
        };
        let adopted = self
            .attempt
            .as_mut()
            .is_some_and(|a| a.adopt_challenge(&challenge));
        if !adopted {
            debug!("connect challenge ignored");
            return;
        }
        debug!(issued_at = challenge.ts, "adopted gateway challenge");
        self.drive_handshake();
    }

    fn on_invoke_request(&mut self, payload: Value) {
        if !self.is_ready() {
            warn!("dropping invocation received before handshake completed");
            return;
        }
        let request: InvokeRequest = match serde_json::from_value::<NodeInvokeRequest>(payload) {
            Ok(wire) => wire.into(),
            Err(e) => {
                warn!(error = %e, "malformed invocation");
                return;
            }
        };
        debug!(invoke_id = %request.invoke_id, command = %request.command, "invocation received");

        if let Some(handler) = self.invoke_handler.as_mut() {
            handler(&request);
            return;
        }

        warn!(command = %request.command, "no invocation handler registered");
        if let Err(e) = self.send_invoke_error(
            &request.invoke_id,
            &request.node_id,
            INVOKE_UNSUPPORTED,
            "no handler registered",
        ) {
            warn!(error = %e, "failed to reject invocation");
        }
    }

    fn capture_message(&mut self, event: &str, payload: &Value) {
        let Some(message) = InboxMessage::from_event(event, payload, self.clock.unix_ms()) else {
            return;
        };
        debug!(event, id = %message.id, from = %message.from, "inbox message captured");
        if let Some(evicted) = self.inbox.push(message) {
            debug!(id = %evicted.id, "inbox full, evicted oldest message");
        }
    }
}

impl<T: Transport, P: Persistence, C: Clock> std::fmt::Debug for GatewayEngine<T, P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayEngine")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("should_connect", &self.should_connect)
            .field("tls_fail_streak", &self.tls_fail_streak)
            .field("inbox", &self.inbox.count())
            .finish_non_exhaustive()
    }
}
