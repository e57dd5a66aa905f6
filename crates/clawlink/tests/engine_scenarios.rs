//! Engine scenario tests.
//!
//! Drives the connection state machine through full sessions using the
//! scripted transport, in-memory persistence and a manual clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use clawlink::signature::verify;
use clawlink::{
    ConnectionState, EngineSettings, GatewayConfig, GatewayEngine, InvokeRequest,
    JsonFilePersistence, ManualClock, MemoryPersistence, MockTransport, Persistence,
};
use serde_json::{json, Value};

const WALL: u64 = 1_700_000_000_000;

type TestEngine = GatewayEngine<MockTransport, MemoryPersistence, ManualClock>;

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    engine: TestEngine,
    transport: MockTransport,
    persistence: MemoryPersistence,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    fn with_settings(settings: EngineSettings) -> Self {
        Self::with_clock(ManualClock::new(WALL), settings)
    }

    fn with_clock(clock: ManualClock, settings: EngineSettings) -> Self {
        let transport = MockTransport::new();
        let persistence = MemoryPersistence::new();
        let engine = GatewayEngine::with_clock(
            transport.clone(),
            persistence.clone(),
            clock.clone(),
            settings,
        );
        Self {
            engine,
            transport,
            persistence,
            clock,
        }
    }

    /// Configure, connect and get the socket open with the handshake sent.
    fn open_session(&mut self, config: GatewayConfig) {
        self.engine.configure(config);
        self.engine.connect_now().unwrap();
        self.engine.tick();
        assert_eq!(self.engine.state(), ConnectionState::Connecting);
        self.transport.emit_open();
        self.engine.tick();
    }

    /// The most recent `connect` request written.
    fn last_connect(&self) -> Value {
        self.transport
            .sent_json()
            .into_iter()
            .rev()
            .find(|f| f["method"] == "connect")
            .expect("no connect request written")
    }

    fn connect_count(&self) -> usize {
        self.transport
            .sent_json()
            .iter()
            .filter(|f| f["method"] == "connect")
            .count()
    }

    fn accept_connect(&mut self, payload: Value) {
        let id = self.last_connect()["id"].clone();
        self.transport
            .emit_json(&json!({"type": "res", "id": id, "ok": true, "payload": payload}));
        self.engine.tick();
    }

    fn reject_connect(&mut self, code: &str, message: &str) {
        let id = self.last_connect()["id"].clone();
        self.transport.emit_json(&json!({
            "type": "res",
            "id": id,
            "ok": false,
            "error": {"code": code, "message": message}
        }));
        self.engine.tick();
    }

    fn ready(&mut self, config: GatewayConfig) {
        self.open_session(config);
        self.accept_connect(json!({"type": "hello-ok", "protocol": 3}));
        assert!(self.engine.is_ready());
    }

    fn device_token(&self) -> String {
        self.persistence.identity().unwrap().device_token
    }
}

fn plain_config() -> GatewayConfig {
    GatewayConfig::with_token("ws://gw.local:9000/node", "")
}

fn shared_config() -> GatewayConfig {
    GatewayConfig::with_token("ws://gw.local:9000/node", "shared-secret")
}

fn event(name: &str, payload: Value) -> Value {
    json!({"type": "event", "event": name, "payload": payload})
}

// ============================================================================
// Handshake
// ============================================================================

#[test]
fn test_handshake_reaches_ready() {
    let mut h = Harness::new();
    h.open_session(plain_config());
    assert_eq!(h.engine.state(), ConnectionState::Authenticating);

    let connect = h.last_connect();
    let device = &connect["params"]["device"];
    let nonce = device["nonce"].as_str().unwrap();
    let signed_at = device["signedAt"].as_u64().unwrap();
    assert_eq!(signed_at, WALL);
    assert!(verify(
        nonce,
        signed_at,
        &h.device_token(),
        device["signature"].as_str().unwrap()
    ));

    h.accept_connect(json!({"type": "hello-ok", "protocol": 3}));
    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Ready);
    assert!(status.ws_connected);
    assert!(status.gateway_ready);
    assert!(status.last_error.is_empty());
    assert_eq!(h.engine.pending_requests(), 0);
}

#[test]
fn test_device_token_rejected_falls_back_to_shared_once() {
    let mut h = Harness::new();
    h.open_session(shared_config());
    assert!(h.last_connect()["params"].get("auth").is_none());

    h.reject_connect("AUTH_BAD_SIGNATURE", "signature mismatch");
    assert_eq!(h.engine.state(), ConnectionState::Authenticating);
    assert_eq!(h.connect_count(), 2);
    assert_eq!(h.transport.close_count(), 0);

    let retry = h.last_connect();
    assert_eq!(retry["params"]["auth"]["token"], "shared-secret");
    let device = &retry["params"]["device"];
    assert!(verify(
        device["nonce"].as_str().unwrap(),
        device["signedAt"].as_u64().unwrap(),
        "shared-secret",
        device["signature"].as_str().unwrap()
    ));

    h.reject_connect("AUTH_BAD_SIGNATURE", "still wrong");
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.connect_count(), 2);
    assert_eq!(h.transport.close_count(), 1);
    assert!(h.engine.last_error().contains("auth rejected (bad signature)"));
    assert!(h.engine.status().should_connect);

    // Next attempt waits for the retry interval.
    h.clock.advance(3_999);
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 1);
    h.clock.advance(1);
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 2);
}

#[test]
fn test_rejection_without_shared_credential_tears_down() {
    let mut h = Harness::new();
    h.open_session(plain_config());
    h.reject_connect("UNKNOWN_DEVICE", "who are you");

    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.connect_count(), 1);
    assert!(h.engine.last_error().contains("unknown device"));
}

#[test]
fn test_preferred_shared_credential_has_no_fallback() {
    let mut h = Harness::new();
    let mut config = shared_config();
    config.prefer_shared_credential = true;
    h.open_session(config);

    assert_eq!(h.last_connect()["params"]["auth"]["token"], "shared-secret");
    h.reject_connect("AUTH_EXPIRED", "too old");
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.connect_count(), 1);
    assert!(h.engine.last_error().contains("expired timestamp"));
}

#[test]
fn test_password_mode_sends_password() {
    let mut h = Harness::new();
    let mut config = plain_config();
    config.auth_mode = clawlink::AuthMode::Password;
    config.password = "hunter2".to_string();
    config.prefer_shared_credential = true;
    h.open_session(config);

    let auth = &h.last_connect()["params"]["auth"];
    assert_eq!(auth["password"], "hunter2");
    assert!(auth.get("token").is_none());
}

#[test]
fn test_non_auth_rejection_is_protocol_error() {
    let mut h = Harness::new();
    h.open_session(shared_config());
    h.reject_connect("PROTOCOL_MISMATCH", "upgrade required");

    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.connect_count(), 1);
    assert!(h.engine.last_error().contains("protocol error"));
}

#[test]
fn test_challenge_nonce_is_adopted() {
    let settings = EngineSettings {
        challenge_wait: Duration::from_millis(1_000),
        ..EngineSettings::default()
    };
    let mut h = Harness::with_settings(settings);
    h.open_session(plain_config());
    assert_eq!(h.engine.state(), ConnectionState::TransportOpen);
    assert_eq!(h.connect_count(), 0);

    h.transport.emit_json(&event(
        "connect.challenge",
        json!({"nonce": "gw-nonce", "ts": WALL + 5}),
    ));
    h.engine.tick();
    assert_eq!(h.engine.state(), ConnectionState::Authenticating);
    assert_eq!(h.last_connect()["params"]["device"]["nonce"], "gw-nonce");
}

#[test]
fn test_challenge_wait_expires_to_local_nonce() {
    let settings = EngineSettings {
        challenge_wait: Duration::from_millis(1_000),
        ..EngineSettings::default()
    };
    let mut h = Harness::with_settings(settings);
    h.open_session(plain_config());

    h.clock.advance(999);
    h.engine.tick();
    assert_eq!(h.connect_count(), 0);
    h.clock.advance(1);
    h.engine.tick();
    assert_eq!(h.connect_count(), 1);
    assert_ne!(h.last_connect()["params"]["device"]["nonce"], "gw-nonce");
}

#[test]
fn test_unset_clock_signs_with_challenge_time() {
    let settings = EngineSettings {
        challenge_wait: Duration::from_millis(5_000),
        ..EngineSettings::default()
    };
    let mut h = Harness::with_clock(ManualClock::new(0), settings);
    h.open_session(plain_config());

    h.clock.advance(250);
    h.transport.emit_json(&event(
        "connect.challenge",
        json!({"nonce": "n-1", "ts": WALL}),
    ));
    h.engine.tick();
    assert_eq!(h.last_connect()["params"]["device"]["signedAt"], WALL + 250);
}

#[test]
fn test_challenge_after_send_is_ignored() {
    let mut h = Harness::new();
    h.open_session(plain_config());
    let nonce = h.last_connect()["params"]["device"]["nonce"].clone();

    h.transport
        .emit_json(&event("connect.challenge", json!({"nonce": "late", "ts": WALL})));
    h.engine.tick();
    assert_eq!(h.connect_count(), 1);
    assert_eq!(h.last_connect()["params"]["device"]["nonce"], nonce);
}

#[test]
fn test_issued_device_token_is_adopted() {
    let mut h = Harness::new();
    h.open_session(plain_config());
    let device_id = h.persistence.identity().unwrap().device_id;

    h.accept_connect(json!({
        "type": "hello-ok",
        "protocol": 3,
        "auth": {"deviceToken": "issued-by-gateway", "role": "node"}
    }));
    assert!(h.engine.is_ready());
    let stored = h.persistence.identity().unwrap();
    assert_eq!(stored.device_token, "issued-by-gateway");
    assert_eq!(stored.device_id, device_id);

    // The next handshake signs with the issued token.
    h.engine.reconnect_now().unwrap();
    h.engine.tick();
    h.transport.emit_open();
    h.engine.tick();
    let device = h.last_connect()["params"]["device"].clone();
    assert!(verify(
        device["nonce"].as_str().unwrap(),
        device["signedAt"].as_u64().unwrap(),
        "issued-by-gateway",
        device["signature"].as_str().unwrap()
    ));
}

// ============================================================================
// Lifecycle and reconnect
// ============================================================================

#[test]
fn test_ready_then_close_in_same_tick() {
    let mut h = Harness::new();
    h.open_session(plain_config());

    let id = h.last_connect()["id"].clone();
    h.transport
        .emit_json(&json!({"type": "res", "id": id, "ok": true, "payload": {}}));
    h.transport
        .emit_json(&event("msg.text", json!({"id": "m-1", "from": "alice", "text": "hi"})));
    h.transport.emit_close(1006, "abnormal");
    h.engine.tick();

    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert!(!status.ws_connected);
    assert!(!status.gateway_ready);
    assert!(status.should_connect);
    assert!(status.last_error.contains("connection closed (1006)"));
    assert_eq!(h.engine.inbox_count(), 1);
    assert!(!h.engine.is_ready());
}

#[test]
fn test_disconnect_drops_pending_requests() {
    let mut h = Harness::new();
    h.ready(plain_config());

    h.engine.send_node_event("status", json!({"ok": true})).unwrap();
    assert_eq!(h.engine.pending_requests(), 1);

    h.engine.disconnect_now();
    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert!(!status.should_connect);
    assert_eq!(h.engine.pending_requests(), 0);
    assert_eq!(h.transport.close_count(), 1);

    h.clock.advance(60_000);
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 1);
}

#[test]
fn test_stale_response_after_reconnect_is_ignored() {
    let mut h = Harness::new();
    h.ready(plain_config());
    let stale = h.engine.send_node_event("status", json!({})).unwrap();

    h.engine.reconnect_now().unwrap();
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 2);
    h.transport.emit_open();
    h.engine.tick();
    assert_eq!(h.engine.state(), ConnectionState::Authenticating);

    h.transport.emit_json(&json!({
        "type": "res",
        "id": stale,
        "ok": false,
        "error": {"code": "GONE", "message": "old session"}
    }));
    h.engine.tick();
    assert_eq!(h.engine.state(), ConnectionState::Authenticating);
    assert!(h.engine.last_error().is_empty());
}

#[test]
fn test_rejected_request_sets_last_error() {
    let mut h = Harness::new();
    h.ready(plain_config());
    let id = h.engine.send_node_event("status", json!({})).unwrap();

    h.transport.emit_json(&json!({
        "type": "res",
        "id": id,
        "ok": false,
        "error": {"code": "INVALID", "message": "bad payload"}
    }));
    h.engine.tick();
    assert!(h.engine.is_ready());
    assert_eq!(h.engine.pending_requests(), 0);
    assert!(h.engine.last_error().contains("node.event rejected"));
}

#[test]
fn test_send_before_ready_writes_nothing() {
    let mut h = Harness::new();
    h.engine.configure(plain_config());
    assert!(matches!(
        h.engine.send_node_event("status", json!({})),
        Err(clawlink::GatewayError::NotReady)
    ));

    h.open_session(plain_config());
    assert!(h.engine.send_invoke_ok("inv-1", "node", json!({})).is_err());
    assert_eq!(h.transport.sent().len(), 1);
}

#[test]
fn test_send_failure_reports_transport_error() {
    let mut h = Harness::new();
    h.ready(plain_config());
    h.transport.set_fail_send(true);

    assert!(matches!(
        h.engine.send_node_event("status", json!({})),
        Err(clawlink::GatewayError::Transport(_))
    ));
    assert_eq!(h.engine.pending_requests(), 0);
    assert!(h.engine.last_error().contains("transport error"));
}

#[test]
fn test_tls_failures_back_off() {
    let mut h = Harness::new();
    h.engine
        .configure(GatewayConfig::with_token("wss://gw.example.com/node", ""));
    h.engine.connect_now().unwrap();
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 1);

    h.transport.emit_error("tls handshake failed", true);
    h.engine.tick();
    assert_eq!(h.engine.status().tls_fail_streak, 1);
    assert_eq!(h.engine.current_retry_delay(), Duration::from_secs(8));

    h.clock.advance(4_000);
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 1);
    h.clock.advance(4_000);
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 2);

    h.transport.emit_error("tls handshake failed", true);
    h.engine.tick();
    assert_eq!(h.engine.status().tls_fail_streak, 2);
    assert_eq!(h.engine.current_retry_delay(), Duration::from_secs(16));

    h.clock.advance(16_000);
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 3);
    h.transport.emit_open();
    h.engine.tick();
    assert_eq!(h.engine.status().tls_fail_streak, 0);
}

#[test]
fn test_plain_socket_errors_do_not_grow_tls_streak() {
    let mut h = Harness::new();
    h.engine.configure(plain_config());
    h.engine.connect_now().unwrap();
    h.engine.tick();

    h.transport.emit_error("handshake failed", true);
    h.engine.tick();
    assert_eq!(h.engine.status().tls_fail_streak, 0);
    assert_eq!(h.engine.current_retry_delay(), Duration::from_secs(4));
}

#[test]
fn test_url_change_resets_tls_streak() {
    let mut h = Harness::new();
    h.engine
        .configure(GatewayConfig::with_token("wss://gw.example.com/", ""));
    h.engine.connect_now().unwrap();
    h.engine.tick();
    h.transport.emit_error("tls", true);
    h.engine.tick();
    assert_eq!(h.engine.status().tls_fail_streak, 1);

    h.engine
        .configure(GatewayConfig::with_token("wss://other.example.com/", ""));
    assert_eq!(h.engine.status().tls_fail_streak, 0);
}

#[test]
fn test_open_failure_is_retried_later() {
    let mut h = Harness::new();
    h.engine.configure(plain_config());
    h.engine.connect_now().unwrap();
    h.transport.fail_next_open("refused");
    h.engine.tick();

    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert!(h.engine.last_error().contains("refused"));
    assert_eq!(h.engine.status().last_connect_attempt_ms, 0);

    h.clock.advance(4_000);
    h.engine.tick();
    assert_eq!(h.engine.state(), ConnectionState::Connecting);
    assert_eq!(h.engine.status().last_connect_attempt_ms, 4_000);
}

#[test]
fn test_material_config_change_reconnects_to_new_url() {
    let mut h = Harness::new();
    h.ready(plain_config());
    h.engine.send_node_event("status", json!({})).unwrap();

    h.engine
        .configure(GatewayConfig::with_token("ws://other.local:7000/node", ""));
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.engine.pending_requests(), 0);
    assert_eq!(h.transport.close_count(), 1);
    assert!(h.engine.status().should_connect);
    assert_eq!(h.persistence.config().unwrap().url, "ws://other.local:7000/node");

    h.engine.tick();
    let opened = h.transport.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[1].host, "other.local");
    assert_eq!(opened[1].port, 7000);
}

#[test]
fn test_clearing_url_stops_connecting() {
    let mut h = Harness::new();
    h.ready(plain_config());

    h.engine.configure(GatewayConfig::default());
    let status = h.engine.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert!(!status.should_connect);

    h.clock.advance(60_000);
    h.engine.tick();
    assert_eq!(h.transport.open_count(), 1);
}

#[test]
fn test_identity_reset_creates_new_device() {
    let mut h = Harness::new();
    h.ready(plain_config());
    let before = h.persistence.identity().unwrap().device_id;

    let mut config = plain_config();
    config.reset_device_identity = true;
    h.engine.configure(config);
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert!(h.persistence.identity().is_none());
    assert!(!h.engine.config().reset_device_identity);

    h.engine.tick();
    h.transport.emit_open();
    h.engine.tick();
    let after = h.persistence.identity().unwrap().device_id;
    assert_ne!(before, after);
    assert_eq!(h.last_connect()["params"]["device"]["id"], after);
}

#[test]
fn test_events_after_teardown_in_same_batch_are_dropped() {
    let mut h = Harness::new();
    h.ready(plain_config());

    h.transport.emit_close(1000, "bye");
    h.transport
        .emit_json(&event("msg.text", json!({"id": "late", "text": "dropped"})));
    h.engine.tick();
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.engine.inbox_count(), 0);
}

// ============================================================================
// Invocations, telemetry, inbox
// ============================================================================

#[test]
fn test_invocation_reaches_handler() {
    let mut h = Harness::new();
    let seen: Arc<Mutex<Vec<InvokeRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    h.engine
        .set_invoke_request_handler(move |req| sink.lock().unwrap().push(req.clone()));
    h.ready(plain_config());

    h.transport.emit_json(&event(
        "node.invoke.request",
        json!({
            "id": "inv-7",
            "nodeId": "node-a",
            "command": "system.ping",
            "paramsJSON": "{\"echo\":\"x\"}",
            "timeoutMs": 3000
        }),
    ));
    h.engine.tick();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].invoke_id, "inv-7");
    assert_eq!(seen[0].params, json!({"echo": "x"}));
    assert_eq!(seen[0].timeout_ms, Some(3000));

    h.engine
        .send_invoke_ok("inv-7", "node-a", json!({"pong": true}))
        .unwrap();
    let frame = h.transport.last_sent_json().unwrap();
    assert_eq!(frame["method"], "node.invoke.result");
    assert_eq!(frame["params"]["id"], "inv-7");
    assert_eq!(frame["params"]["nodeId"], "node-a");
    assert_eq!(frame["params"]["ok"], true);
    assert_eq!(frame["params"]["payload"]["pong"], true);
}

#[test]
fn test_invocation_without_handler_is_rejected() {
    let mut h = Harness::new();
    h.ready(plain_config());

    h.transport.emit_json(&event(
        "node.invoke.request",
        json!({"id": "inv-1", "nodeId": "node-a", "command": "camera.snap"}),
    ));
    h.engine.tick();

    let frame = h.transport.last_sent_json().unwrap();
    assert_eq!(frame["method"], "node.invoke.result");
    assert_eq!(frame["params"]["ok"], false);
    assert_eq!(frame["params"]["error"]["code"], "UNSUPPORTED_COMMAND");
}

#[test]
fn test_invocation_before_ready_is_dropped() {
    let mut h = Harness::new();
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    h.engine
        .set_invoke_request_handler(move |_| *counter.lock().unwrap() += 1);
    h.open_session(plain_config());

    h.transport.emit_json(&event(
        "node.invoke.request",
        json!({"id": "inv-1", "command": "system.ping"}),
    ));
    h.engine.tick();
    assert_eq!(*calls.lock().unwrap(), 0);
    assert_eq!(h.transport.sent().len(), 1);
}

#[test]
fn test_telemetry_follows_interval() {
    let mut h = Harness::new();
    h.engine.set_telemetry_builder(|payload| {
        payload.insert("battery".to_string(), json!(87));
    });
    h.ready(plain_config());
    let written = h.transport.sent().len();

    h.clock.advance(29_999);
    h.engine.tick();
    assert_eq!(h.transport.sent().len(), written);

    h.clock.advance(1);
    h.engine.tick();
    let frame = h.transport.last_sent_json().unwrap();
    assert_eq!(frame["method"], "node.event");
    assert_eq!(frame["params"]["event"], "telemetry");
    assert_eq!(frame["params"]["payload"]["battery"], 87);

    h.engine.tick();
    assert_eq!(h.transport.sent().len(), written + 1);
}

#[test]
fn test_no_telemetry_without_builder() {
    let mut h = Harness::new();
    h.ready(plain_config());
    let written = h.transport.sent().len();
    h.clock.advance(120_000);
    h.engine.tick();
    assert_eq!(h.transport.sent().len(), written);
}

#[test]
fn test_inbox_keeps_newest_messages() {
    let mut h = Harness::new();
    h.ready(plain_config());

    for i in 0..30 {
        h.transport.emit_json(&event(
            "msg.text",
            json!({"messageId": format!("m{i}"), "sender": "bob", "body": format!("hello {i}")}),
        ));
    }
    h.transport.emit_json(&event(
        "msg.voice.meta",
        json!({"id": "v1", "from": "bob", "mimeType": "audio/ogg", "bytes": 4096}),
    ));
    h.engine.tick();

    assert_eq!(h.engine.inbox_count(), 24);
    assert_eq!(h.engine.inbox_message(0).unwrap().id, "m7");
    let voice = h.engine.inbox_message(23).unwrap();
    assert_eq!(voice.kind, "voice");
    assert_eq!(voice.content_type, "audio/ogg");
    assert_eq!(voice.voice_bytes, 4096);
    assert_eq!(voice.ts_ms, WALL);

    h.engine.clear_inbox();
    assert_eq!(h.engine.inbox_count(), 0);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_state_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let clock = ManualClock::new(WALL);

    let device_id = {
        let mut engine = GatewayEngine::with_clock(
            transport.clone(),
            JsonFilePersistence::new(dir.path()),
            clock.clone(),
            EngineSettings::default(),
        );
        engine.configure(shared_config());
        engine.connect_now().unwrap();
        engine.tick();
        transport.emit_open();
        engine.tick();
        engine.identity().unwrap().device_id.clone()
    };

    let persistence = JsonFilePersistence::new(dir.path());
    assert_eq!(persistence.load_identity().unwrap().device_id, device_id);

    let mut engine = GatewayEngine::with_clock(
        MockTransport::new(),
        persistence,
        clock,
        EngineSettings::default(),
    );
    assert_eq!(engine.config().url, "ws://gw.local:9000/node");
    assert_eq!(engine.config().token, "shared-secret");
    assert_eq!(engine.identity().unwrap().device_id, device_id);
    assert!(engine.connect_now().is_ok());
}
