//! Bounded inbox of user messages pushed by the gateway.

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;

/// Maximum number of messages kept.
pub const INBOX_CAPACITY: usize = 24;

/// Text message event.
pub const EVENT_MSG_TEXT: &str = "msg.text";
/// Voice message metadata event.
pub const EVENT_MSG_VOICE_META: &str = "msg.voice.meta";
/// Voice message data chunk event.
pub const EVENT_MSG_VOICE_CHUNK: &str = "msg.voice.chunk";

/// Accepted payload keys per field, in priority order.
mod keys {
    pub const ID: &[&str] = &["id", "messageId", "msgId"];
    pub const KIND: &[&str] = &["type", "kind"];
    pub const FROM: &[&str] = &["from", "sender", "source"];
    pub const TO: &[&str] = &["to", "recipient", "target"];
    pub const TEXT: &[&str] = &["text", "body", "caption"];
    pub const FILE_NAME: &[&str] = &["fileName", "filename", "name"];
    pub const CONTENT_TYPE: &[&str] = &["contentType", "mimeType", "mime"];
    pub const VOICE_BYTES: &[&str] = &["size", "bytes", "voiceBytes"];
    pub const TS: &[&str] = &["ts", "tsMs", "timestamp"];
}

/// One captured message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessage {
    /// Message id.
    pub id: String,
    /// Event name the message arrived on.
    pub event: String,
    /// Message kind (`text`, `voice`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Sender.
    pub from: String,
    /// Recipient.
    pub to: String,
    /// Text body or caption.
    pub text: String,
    /// Attachment file name.
    pub file_name: String,
    /// Attachment MIME type.
    pub content_type: String,
    /// Size of the voice attachment.
    pub voice_bytes: u32,
    /// Message timestamp in Unix milliseconds.
    pub ts_ms: u64,
}

impl InboxMessage {
    /// Whether `event` is captured into the inbox.
    #[must_use]
    pub fn is_message_event(event: &str) -> bool {
        matches!(
            event,
            EVENT_MSG_TEXT | EVENT_MSG_VOICE_META | EVENT_MSG_VOICE_CHUNK
        )
    }

    /// Build a message from an event payload.
    ///
    /// Returns `None` for events that are not message events. Missing fields
    /// stay empty; a missing timestamp falls back to `received_at_ms`.
    #[must_use]
    pub fn from_event(event: &str, payload: &Value, received_at_ms: u64) -> Option<Self> {
        if !Self::is_message_event(event) {
            return None;
        }

        let default_kind = if event == EVENT_MSG_TEXT { "text" } else { "voice" };
        let kind = read_str(payload, keys::KIND);
        let voice_bytes = read_u64(payload, keys::VOICE_BYTES)
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX));

        Some(Self {
            id: read_str(payload, keys::ID),
            event: event.to_string(),
            kind: if kind.is_empty() { default_kind.to_string() } else { kind },
            from: read_str(payload, keys::FROM),
            to: read_str(payload, keys::TO),
            text: read_str(payload, keys::TEXT),
            file_name: read_str(payload, keys::FILE_NAME),
            content_type: read_str(payload, keys::CONTENT_TYPE),
            voice_bytes,
            ts_ms: read_u64(payload, keys::TS).unwrap_or(received_at_ms),
        })
    }
}

/// First non-empty string under any of `keys`. Numbers are stringified.
fn read_str(payload: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| match payload.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

/// First non-negative integer under any of `keys`. Numeric strings are accepted.
fn read_u64(payload: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match payload.get(*key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// FIFO ring of messages; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct Inbox {
    messages: VecDeque<InboxMessage>,
    capacity: usize,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Inbox {
    /// Inbox with the standard capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(INBOX_CAPACITY)
    }

    /// Inbox holding at most `capacity` messages (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, returning the evicted one if the inbox was full.
    pub fn push(&mut self, message: InboxMessage) -> Option<InboxMessage> {
        let evicted = if self.messages.len() == self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Message at `index`, oldest first.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&InboxMessage> {
        self.messages.get(index)
    }

    /// Number of stored messages.
    #[must_use]
    pub fn count(&self) -> usize {
        self.messages.len()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the inbox is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &InboxMessage> {
        self.messages.iter()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
