//! Wire protocol types for talking to tool servers.
//!
//! Every call is one JSON object `{version, id, method, params}`; every
//! reply is `{version, id, result|error}`. The first request on a new
//! connection is `initialize`, whose result becomes the cached server
//! info.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Wire protocol version carried on every frame.
pub const WIRE_VERSION: &str = "2.0";

/// Handshake protocol version sent in `initialize`.
pub const HANDSHAKE_VERSION: &str = "2024-11-05";

/// Deadline for any single request; unresolved ids are abandoned after it.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request frame.
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    /// Always [`WIRE_VERSION`].
    pub version: &'static str,
    /// Locally-generated, strictly increasing per connection.
    pub id: u64,
    /// Method name (e.g. `tools/call`).
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request frame.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            version: WIRE_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// Notification frame (no id, no reply expected).
#[derive(Debug, Serialize)]
pub struct RpcNotification {
    /// Always [`WIRE_VERSION`].
    pub version: &'static str,
    /// Method name.
    pub method: String,
    pub params: Value,
}

impl RpcNotification {
    /// Build a notification frame.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            version: WIRE_VERSION,
            method: method.into(),
            params: params.unwrap_or_else(|| json!({})),
        }
    }
}

/// Reply frame.
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[allow(dead_code)] // Present on the wire, verified in tests
    pub version: String,
    /// Correlates with the request id; absent for server notifications.
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<RpcErrorBody>,
}

/// Error payload of a reply frame.
#[derive(Debug, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Result of the `initialize` handshake, retained as the server's
/// advertised info for the lifetime of the connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHandshake {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: PeerInfo,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Inline tool list some transports return at handshake time.
    #[serde(default)]
    pub tools: Option<Value>,
    /// Inline resource list some transports return at handshake time.
    #[serde(default)]
    pub resources: Option<Value>,
}

/// Identity advertised by one side of a connection.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Capabilities advertised by a server at handshake time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub prompts: Option<Value>,
}

/// Parameters for the `initialize` handshake request.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": HANDSHAKE_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toolmesh",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let request = RpcRequest::new(1, "tools/list", None);

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"version\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params")); // Should be omitted when None
    }

    #[test]
    fn response_parsing() {
        let json = r#"{"version":"2.0","id":1,"result":{"tools":[]}}"#;
        let response: RpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id, Some(1));
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn error_parsing() {
        let json = r#"{"version":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let response: RpcResponse = serde_json::from_str(json).unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, -32600);
        assert_eq!(error.message, "Invalid Request");
        assert!(error.data.is_none());
    }

    #[test]
    fn handshake_parsing_with_inline_tools() {
        let json = serde_json::json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "mailbox", "version": "1.2.0"},
            "capabilities": {"tools": {}},
            "tools": [{"name": "list_messages"}]
        });

        let handshake: ServerHandshake = serde_json::from_value(json).unwrap();
        assert_eq!(handshake.server_info.name, "mailbox");
        assert!(handshake.capabilities.tools.is_some());
        assert!(handshake.tools.is_some());
        assert!(handshake.resources.is_none());
    }

    #[test]
    fn initialize_params_carry_client_identity() {
        let params = initialize_params();
        assert_eq!(params["protocolVersion"], HANDSHAKE_VERSION);
        assert_eq!(params["clientInfo"]["name"], "toolmesh");
    }

    #[test]
    fn notification_has_no_id() {
        let notification = RpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&notification).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["params"], serde_json::json!({}));
    }
}
