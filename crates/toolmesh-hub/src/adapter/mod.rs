//! Adapter abstraction over tool server transports.
//!
//! An adapter is the uniform capability wrapper the manager uses
//! regardless of how a server is reached. The variant set is closed:
//! [`RpcAdapter`] (stdio or socket transport), [`InProcessAdapter`]
//! (direct function calls), and [`MultiAccountAdapter`] (fan-out/merge
//! over several adapters of the same tool surface).

mod in_process;
mod multi_account;
mod rpc;

pub use in_process::{InProcessAdapter, ToolModule};
pub use multi_account::{ACCOUNT_PARAM, LEGACY_ACCOUNT_PARAM, MultiAccountAdapter};
pub use rpc::{AdapterSetup, RpcAdapter, SetupContext};

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

use toolmesh_core::{ResourceDef, ToolCallResult, ToolDef};

use crate::transport::TransportError;

/// Errors surfaced by adapter operations other than tool calls.
///
/// Tool calls never error: every failure is normalized into
/// [`ToolCallResult::Error`].
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Adapter not connected")]
    NotConnected,

    #[error("Setup hook failed: {0}")]
    Setup(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

/// Uniform capability set over one logical tool server.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Adapter instance id (the owning server's effective id).
    fn id(&self) -> &str;

    /// Identity of the owning tenant/user.
    fn owner_id(&self) -> &str;

    /// Registry key this adapter was created for.
    fn server_key(&self) -> &str;

    /// Open the connection (runs any setup hook first).
    async fn connect(&self) -> Result<(), AdapterError>;

    /// Whether the adapter can currently serve calls.
    async fn is_connected(&self) -> bool;

    /// List the server's tools, normalized so every definition carries an
    /// input schema.
    async fn list_tools(&self) -> Result<Vec<ToolDef>, AdapterError>;

    /// Invoke one tool. Never fails: transport and remote errors become
    /// the error variant of the result.
    async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult;

    /// List the server's readable resources.
    async fn list_resources(&self) -> Result<Vec<ResourceDef>, AdapterError>;

    /// Read one resource by URI.
    async fn read_resource(&self, uri: &str) -> Result<Value, AdapterError>;

    /// Best-effort close of the old connection followed by a fresh connect.
    async fn reconnect(&self) -> Result<(), AdapterError>;

    /// Best-effort close. Idempotent.
    async fn close(&self);
}

/// The schema every tool definition falls back to when the server
/// declared none.
pub(crate) fn empty_input_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Parse a raw `tools/list` reply into normalized definitions.
pub(crate) fn parse_tool_defs(raw: &Value) -> Vec<ToolDef> {
    let items = raw
        .get("tools")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<ToolDef>(item).ok())
        .map(|mut tool| {
            if tool.input_schema.is_none() {
                tool.input_schema = Some(empty_input_schema());
            }
            tool
        })
        .collect()
}

/// Parse a raw `resources/list` reply.
pub(crate) fn parse_resource_defs(raw: &Value) -> Vec<ResourceDef> {
    raw.get("resources")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| serde_json::from_value::<ResourceDef>(item).ok())
        .collect()
}

/// Normalize the raw reply of a `tools/call` round trip.
///
/// Understands the content-array shape (`{content: [...], isError}`) and
/// falls back to [`normalize_value`] for servers that reply with a bare
/// payload.
pub(crate) fn normalize_call_reply(raw: &Value) -> ToolCallResult {
    let Some(content) = raw.get("content").and_then(Value::as_array) else {
        return normalize_value(raw);
    };

    let is_error = raw
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_error {
        let message = content
            .iter()
            .find_map(|item| item.get("text").and_then(Value::as_str))
            .unwrap_or("Unknown error")
            .to_string();
        return ToolCallResult::error(message);
    }

    normalize_content_items(content)
}

fn normalize_content_items(content: &[Value]) -> ToolCallResult {
    let Some(first) = content.first() else {
        return ToolCallResult::text("");
    };

    match first.get("type").and_then(Value::as_str) {
        Some("image") => {
            let mime = first
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("application/octet-stream");
            let url = first
                .get("url")
                .or_else(|| first.get("data"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            ToolCallResult::image(mime, url)
        }
        Some("resource") => {
            let reference = first
                .get("resource")
                .and_then(|r| r.get("uri"))
                .or_else(|| first.get("uri"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            ToolCallResult::resource(reference)
        }
        _ => {
            // Text items; multiple are joined into one payload
            let joined: Vec<&str> = content
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect();
            if joined.is_empty() {
                ToolCallResult::text(
                    serde_json::to_string(content).unwrap_or_default(),
                )
            } else {
                ToolCallResult::text(joined.join("\n"))
            }
        }
    }
}

/// Normalize a bare return value the way module returns are normalized:
/// string → text, object keyed `error`/`text`/`content` → the matching
/// tag, anything else → JSON-stringified text.
pub(crate) fn normalize_value(value: &Value) -> ToolCallResult {
    if let Some(text) = value.as_str() {
        return ToolCallResult::text(text);
    }

    if let Some(object) = value.as_object() {
        if let Some(error) = object.get("error") {
            let message = error
                .as_str()
                .map_or_else(|| error.to_string(), ToString::to_string);
            return ToolCallResult::error(message);
        }
        if let Some(text) = object.get("text").and_then(Value::as_str) {
            return ToolCallResult::text(text);
        }
        if let Some(content) = object.get("content").and_then(Value::as_array) {
            return normalize_content_items(content);
        }
    }

    ToolCallResult::text(serde_json::to_string(value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_schema_gets_empty_object() {
        let raw = json!({ "tools": [{ "name": "ping" }] });
        let tools = parse_tool_defs(&raw);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].input_schema, Some(empty_input_schema()));
    }

    #[test]
    fn declared_input_schema_is_preserved() {
        let schema = json!({ "type": "object", "properties": { "q": { "type": "string" } } });
        let raw = json!({ "tools": [{ "name": "search", "inputSchema": schema }] });
        let tools = parse_tool_defs(&raw);
        assert_eq!(tools[0].input_schema.as_ref().unwrap(), &schema);
    }

    #[test]
    fn error_reply_becomes_error_result() {
        let raw = json!({
            "content": [{ "type": "text", "text": "boom" }],
            "isError": true
        });
        assert_eq!(normalize_call_reply(&raw), ToolCallResult::error("boom"));
    }

    #[test]
    fn text_content_items_are_joined() {
        let raw = json!({
            "content": [
                { "type": "text", "text": "line one" },
                { "type": "text", "text": "line two" }
            ]
        });
        assert_eq!(
            normalize_call_reply(&raw),
            ToolCallResult::text("line one\nline two")
        );
    }

    #[test]
    fn image_content_maps_to_image_result() {
        let raw = json!({
            "content": [{ "type": "image", "mimeType": "image/png", "url": "https://x/y.png" }]
        });
        assert_eq!(
            normalize_call_reply(&raw),
            ToolCallResult::image("image/png", "https://x/y.png")
        );
    }

    #[test]
    fn resource_content_maps_to_resource_result() {
        let raw = json!({
            "content": [{ "type": "resource", "resource": { "uri": "file:///notes.txt" } }]
        });
        assert_eq!(
            normalize_call_reply(&raw),
            ToolCallResult::resource("file:///notes.txt")
        );
    }

    #[test]
    fn bare_string_reply_becomes_text() {
        assert_eq!(
            normalize_call_reply(&json!("done")),
            ToolCallResult::text("done")
        );
    }

    #[test]
    fn object_with_error_key_becomes_error() {
        assert_eq!(
            normalize_value(&json!({ "error": "nope" })),
            ToolCallResult::error("nope")
        );
    }

    #[test]
    fn arbitrary_value_is_json_stringified() {
        let result = normalize_value(&json!({ "count": 3 }));
        assert_eq!(result, ToolCallResult::text(r#"{"count":3}"#));
    }

    #[test]
    fn empty_content_is_empty_text() {
        let raw = json!({ "content": [] });
        assert_eq!(normalize_call_reply(&raw), ToolCallResult::text(""));
    }
}
