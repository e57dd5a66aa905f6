//! Inbound invocations and the application hooks.

use clawlink_proto::NodeInvokeRequest;
use serde_json::{Map, Value};

/// A remote command the gateway asked this device to run.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    /// Invocation id, echoed by the result.
    pub invoke_id: String,
    /// Target node id.
    pub node_id: String,
    /// Command name, e.g. `system.ping`.
    pub command: String,
    /// Command arguments (`null` when absent or unparseable).
    pub params: Value,
    /// Deadline hint from the gateway.
    pub timeout_ms: Option<u64>,
}

impl From<NodeInvokeRequest> for InvokeRequest {
    fn from(req: NodeInvokeRequest) -> Self {
        let params = req.params_value();
        Self {
            invoke_id: req.id,
            node_id: req.node_id,
            command: req.command,
            params,
            timeout_ms: req.timeout_ms,
        }
    }
}

/// Called for each invocation while the link is ready.
pub type InvokeHandler = Box<dyn FnMut(&InvokeRequest) + Send>;

/// Fills the telemetry payload before it is sent.
pub type TelemetryBuilder = Box<dyn FnMut(&mut Map<String, Value>) + Send>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_wire_request_with_params_json() {
        let wire: NodeInvokeRequest = serde_json::from_value(json!({
            "id": "inv-1",
            "nodeId": "node-a",
            "command": "system.ping",
            "paramsJSON": "{\"echo\":1}",
            "timeoutMs": 5000
        }))
        .unwrap();
        let req = InvokeRequest::from(wire);
        assert_eq!(req.invoke_id, "inv-1");
        assert_eq!(req.node_id, "node-a");
        assert_eq!(req.command, "system.ping");
        assert_eq!(req.params, json!({"echo": 1}));
        assert_eq!(req.timeout_ms, Some(5000));
    }

    #[test]
    fn test_from_wire_request_without_params() {
        let wire: NodeInvokeRequest =
            serde_json::from_value(json!({"id": "inv-2", "command": "system.info"})).unwrap();
        let req = InvokeRequest::from(wire);
        assert_eq!(req.params, Value::Null);
        assert!(req.node_id.is_empty());
    }
}
