//! Scripted in-memory transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{Transport, TransportEvent};
use crate::endpoint::Endpoint;
use crate::error::{GatewayError, Result};

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    opened: Vec<Endpoint>,
    sent: Vec<String>,
    events: VecDeque<TransportEvent>,
    closes: u32,
    fail_open: Option<String>,
    fail_send: bool,
}

/// Transport whose events are injected by hand.
///
/// Clones share state: keep one handle to script the peer and hand another
/// to the engine. Nothing is emitted automatically, so an `open` stays
/// pending until [`emit_open`](Self::emit_open) is called.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Fresh transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an arbitrary event.
    pub fn push_event(&self, event: TransportEvent) {
        self.state().events.push_back(event);
    }

    /// Queue [`TransportEvent::Opened`].
    pub fn emit_open(&self) {
        self.push_event(TransportEvent::Opened);
    }

    /// Queue an inbound JSON frame.
    pub fn emit_json(&self, frame: &Value) {
        self.push_event(TransportEvent::Message(frame.to_string()));
    }

    /// Queue a close from the peer.
    pub fn emit_close(&self, code: u16, reason: &str) {
        self.push_event(TransportEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Queue a socket error.
    pub fn emit_error(&self, detail: &str, tls_handshake: bool) {
        self.push_event(TransportEvent::Error {
            detail: detail.to_string(),
            tls_handshake,
        });
    }

    /// Make the next `open` call fail synchronously.
    pub fn fail_next_open(&self, detail: &str) {
        self.state().fail_open = Some(detail.to_string());
    }

    /// Make `send` fail until reset.
    pub fn set_fail_send(&self, fail: bool) {
        self.state().fail_send = fail;
    }

    /// Endpoints passed to `open`, oldest first.
    #[must_use]
    pub fn opened(&self) -> Vec<Endpoint> {
        self.state().opened.clone()
    }

    /// Number of `open` calls.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state().opened.len()
    }

    /// Number of `close` calls.
    #[must_use]
    pub fn close_count(&self) -> u32 {
        self.state().closes
    }

    /// Every frame written so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    /// Written frames parsed as JSON (unparseable frames are skipped).
    #[must_use]
    pub fn sent_json(&self) -> Vec<Value> {
        self.state()
            .sent
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect()
    }

    /// Take and clear the written frames.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.state().sent)
    }

    /// Most recent written frame as JSON.
    #[must_use]
    pub fn last_sent_json(&self) -> Option<Value> {
        self.state()
            .sent
            .last()
            .and_then(|s| serde_json::from_str(s).ok())
    }
}

impl Transport for MockTransport {
    fn open(&mut self, endpoint: &Endpoint) -> Result<()> {
        let mut state = self.state();
        if let Some(detail) = state.fail_open.take() {
            return Err(GatewayError::Transport(detail));
        }
        state.events.clear();
        state.open = true;
        state.opened.push(endpoint.clone());
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(GatewayError::Transport("socket not open".to_string()));
        }
        if state.fail_send {
            return Err(GatewayError::Transport("send failed".to_string()));
        }
        state.sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.open = false;
        state.closes += 1;
        state.events.clear();
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        self.state().events.drain(..).collect()
    }
}
