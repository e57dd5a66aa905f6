//! Remote invocation and node event payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a `node.invoke.request` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInvokeRequest {
    /// Invocation id, echoed in the result.
    pub id: String,
    /// Target node id.
    #[serde(default)]
    pub node_id: String,
    /// Command name.
    pub command: String,
    /// Params encoded as a JSON string.
    #[serde(default, rename = "paramsJSON", alias = "paramsJson", skip_serializing_if = "Option::is_none")]
    pub params_json: Option<String>,
    /// Params as an inline object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Gateway-side timeout for the invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl NodeInvokeRequest {
    /// Resolve the invocation params.
    ///
    /// `paramsJSON` wins over `params`. Unparseable or missing params yield `null`.
    #[must_use]
    pub fn params_value(&self) -> Value {
        if let Some(raw) = self.params_json.as_deref() {
            return serde_json::from_str(raw).unwrap_or(Value::Null);
        }
        self.params.clone().unwrap_or(Value::Null)
    }
}

/// Params of the `node.invoke.result` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInvokeResultParams {
    /// Invocation id.
    pub id: String,
    /// Node that executed the invocation.
    pub node_id: String,
    /// Whether the command succeeded.
    pub ok: bool,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InvokeError>,
}

impl NodeInvokeResultParams {
    /// Successful result.
    #[must_use]
    pub fn ok(id: impl Into<String>, node_id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed result.
    #[must_use]
    pub fn error(
        id: impl Into<String>,
        node_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            ok: false,
            payload: None,
            error: Some(InvokeError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// Error carried by a failed invocation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Params of the `node.event` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEventParams {
    /// Event name, e.g. `msg.text` or `telemetry`.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}
