//! JSON-RPC and MCP protocol types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request
#[derive(Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC response
#[derive(Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// MCP protocol types

/// MCP initialize request parameters.
///
/// Required by the protocol but unused beyond validation - any protocol
/// version and client identity is accepted.
#[derive(Deserialize)]
pub(crate) struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    #[allow(dead_code)]
    pub protocol_version: String,
    #[allow(dead_code)]
    pub capabilities: Value,
    #[serde(rename = "clientInfo")]
    #[allow(dead_code)]
    pub client_info: ClientInfo,
}

#[derive(Deserialize)]
pub(crate) struct ClientInfo {
    #[allow(dead_code)]
    pub name: String,
    #[allow(dead_code)]
    pub version: String,
}

#[derive(Serialize)]
pub(crate) struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Serialize)]
pub(crate) struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Serialize)]
pub(crate) struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Serialize)]
pub(crate) struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Serialize)]
pub(crate) struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Serialize)]
pub(crate) struct ToolsListResult {
    pub tools: Vec<Tool>,
}

// Tool arguments

#[derive(Deserialize)]
pub(crate) struct SaveArgs {
    pub kind: String,
    pub body: String,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub meta: Option<serde_json::Map<String, Value>>,
    pub source: Option<String>,
    pub folder: Option<String>,
    pub identity_key: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`
    pub expires_at: Option<String>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct GetContextArgs {
    pub query: String,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub include_superseded: Option<bool>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub(crate) struct ListContextArgs {
    pub kind: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct DeleteContextArgs {
    pub id: String,
}

#[derive(Deserialize)]
pub(crate) struct IngestUrlArgs {
    pub url: String,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub folder: Option<String>,
    pub source: Option<String>,
}
