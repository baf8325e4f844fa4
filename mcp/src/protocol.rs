//! JSON-RPC 2.0 wire types for the tool protocol.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::McpError;

pub const JSONRPC_VERSION: &str = "2.0";
/// Protocol revision announced during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// A request without an id; the server sends no response.
#[derive(Debug, Serialize)]
pub(crate) struct RpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> RpcNotification<'a> {
    pub fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

// Distinguishes `"result": null` (present) from a missing field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Check correlation and collapse into exactly one of result or error.
    pub fn into_result(self, expected_id: u64) -> Result<Value, McpError> {
        match &self.id {
            Some(id) if id.as_u64() == Some(expected_id) => {}
            // Servers may answer unparseable requests with a null id.
            None | Some(Value::Null) if self.error.is_some() => {}
            other => {
                return Err(McpError::IdMismatch {
                    expected: expected_id,
                    got: other
                        .as_ref()
                        .map_or_else(|| "none".to_string(), ToString::to_string),
                });
            }
        }

        match (self.result, self.error) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(McpError::Rpc(error)),
            (Some(_), Some(_)) => Err(McpError::MalformedResponse(
                "response carries both result and error".to_string(),
            )),
            (None, None) => Err(McpError::MalformedResponse(
                "response carries neither result nor error".to_string(),
            )),
        }
    }
}

/// Identity reported by the server in its `initialize` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: ServerInfo,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn schema_or_object<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .filter(|schema| !schema.is_null())
        .unwrap_or_else(default_input_schema))
}

/// A tool descriptor as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default = "default_input_schema", deserialize_with = "schema_or_object")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<RemoteTool>,
}

/// One item of a tool call's `content` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ContentPart {
    /// Text parts render as their text; anything else as `[<type> content]`.
    #[must_use]
    pub fn render(&self) -> String {
        match (self.kind.as_str(), &self.text) {
            ("text", Some(text)) => text.clone(),
            (kind, _) => format!("[{kind} content]"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// All parts rendered and joined with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(ContentPart::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CallToolResult, ListToolsResult, RemoteTool, RpcRequest, RpcResponse};
    use crate::McpError;

    fn response(value: serde_json::Value) -> RpcResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn request_omits_missing_params() {
        let value = serde_json::to_value(RpcRequest::new(4, "tools/list", None)).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list"}));
    }

    #[test]
    fn null_result_counts_as_present() {
        let ok = response(json!({"jsonrpc": "2.0", "id": 1, "result": null}));
        assert_eq!(ok.into_result(1).unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn both_or_neither_is_malformed() {
        let both = response(json!({
            "jsonrpc": "2.0", "id": 1, "result": {}, "error": {"code": 1, "message": "x"}
        }));
        assert!(matches!(both.into_result(1), Err(McpError::MalformedResponse(_))));

        let neither = response(json!({"jsonrpc": "2.0", "id": 1}));
        assert!(matches!(neither.into_result(1), Err(McpError::MalformedResponse(_))));
    }

    #[test]
    fn error_response_maps_to_rpc_error() {
        let err = response(json!({
            "jsonrpc": "2.0", "id": 3, "error": {"code": -32601, "message": "Method not found"}
        }))
        .into_result(3)
        .unwrap_err();
        match err {
            McpError::Rpc(rpc) => {
                assert_eq!(rpc.code, -32601);
                assert_eq!(rpc.to_string(), "Method not found (code -32601)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn id_mismatch_detected() {
        let err = response(json!({"jsonrpc": "2.0", "id": 9, "result": {}}))
            .into_result(2)
            .unwrap_err();
        assert!(matches!(err, McpError::IdMismatch { expected: 2, .. }));
    }

    #[test]
    fn remote_tool_defaults() {
        let tool: RemoteTool = serde_json::from_value(json!({"name": "echo"})).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema, json!({"type": "object"}));
    }

    #[test]
    fn remote_tool_tolerates_null_fields() {
        let result: ListToolsResult = serde_json::from_value(json!({
            "tools": [
                {"name": "search", "description": null, "inputSchema": null},
                {"name": "fetch", "description": "Fetch a URL"}
            ]
        }))
        .unwrap();
        assert_eq!(result.tools.len(), 2);
        assert_eq!(result.tools[0].description, "");
        assert_eq!(result.tools[0].input_schema, json!({"type": "object"}));
        assert_eq!(result.tools[1].description, "Fetch a URL");
    }

    #[test]
    fn call_result_renders_mixed_content() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "text", "text": "second"}
            ]
        }))
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "first\n[image content]\nsecond");
    }
}
