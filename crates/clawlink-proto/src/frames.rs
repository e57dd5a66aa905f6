//! Request, response and event frames.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProtoError;

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Request expecting a correlated response.
    #[serde(rename = "req")]
    Request(RequestFrame),
    /// Response to an earlier request.
    #[serde(rename = "res")]
    Response(ResponseFrame),
    /// Server push.
    #[serde(rename = "event")]
    Event(EventFrame),
}

impl Frame {
    /// Decode a frame from a text message.
    ///
    /// Frames without a `type` discriminator are classified by shape: an
    /// `event` field makes an event, a `method` field a request, and an `id`
    /// alone a response. Older gateways omit the discriminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON or not a recognizable frame.
    pub fn from_json(text: &str) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decode a frame from an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognizable frame.
    pub fn from_value(value: Value) -> Result<Self, ProtoError> {
        let Value::Object(obj) = &value else {
            return Err(ProtoError::InvalidFrame(
                "frame is not a JSON object".to_string(),
            ));
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("req" | "res" | "event") => Ok(serde_json::from_value(value)?),
            Some(other) => Err(ProtoError::InvalidFrame(format!(
                "unknown frame type '{other}'"
            ))),
            None if obj.contains_key("event") => Ok(Self::Event(serde_json::from_value(value)?)),
            None if obj.contains_key("method") => {
                Ok(Self::Request(serde_json::from_value(value)?))
            }
            None if obj.contains_key("id") => Ok(Self::Response(serde_json::from_value(value)?)),
            None => Err(ProtoError::InvalidFrame(
                "frame has no type, event, method or id".to_string(),
            )),
        }
    }

    /// Encode the frame as a JSON text message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }
}

/// Request frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id, echoed by the response.
    pub id: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestFrame {
    /// Create a request frame.
    #[must_use]
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Wrap into a [`Frame`] and encode it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        Frame::Request(self.clone()).to_json()
    }
}

/// Response frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Id of the request this answers.
    pub id: String,
    /// Explicit success flag. When absent, success means "no error".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// Success payload (`result` is accepted on input).
    #[serde(default, alias = "result", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    /// Build a success response.
    #[must_use]
    pub fn success(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            ok: Some(true),
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a failure response.
    #[must_use]
    pub fn failure(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: Some(false),
            payload: None,
            error: Some(ErrorShape {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Whether the response reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.ok.unwrap_or(self.error.is_none())
    }
}

/// Error description carried by a failed response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    /// Machine-readable code. Numeric codes are converted to strings.
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for ErrorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

fn code_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// Event frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name, e.g. `node.invoke.request`.
    pub event: String,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Optional gateway sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    /// Create an event frame.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload: Some(payload),
            seq: None,
        }
    }

    /// Wrap into a [`Frame`] and encode it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        Frame::Event(self.clone()).to_json()
    }
}
