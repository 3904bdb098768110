//! MCP tool handlers
//!
//! One file per tool; `dispatch` routes a `tools/call` to the matching
//! handler on the interceptor's worker thread.

mod delete;
mod get;
mod ingest;
mod list;
mod save;
mod status;

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;

use super::server::VaultServer;
use super::types::{Tool, ToolsListResult};

/// Handle tools/list - return available tools.
pub(crate) fn handle_tools_list() -> Result<Value> {
    let tools = vec![
        Tool {
            name: "save_context".into(),
            description: "Save a memory entry (insight, decision, contact, session note, ...) as a markdown file and index it for retrieval. Entity kinds with an identity_key upsert in place.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "kind": {
                        "type": "string",
                        "description": "Entry kind, lowercase (insight, decision, pattern, note, contact, project, session, task, ...)"
                    },
                    "body": {
                        "type": "string",
                        "description": "Entry content, markdown allowed (max 100 KiB)"
                    },
                    "title": {
                        "type": "string",
                        "description": "Short title (max 500 chars)"
                    },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Up to 20 tags for filtering and display"
                    },
                    "meta": {
                        "type": "object",
                        "description": "Kind-specific extra fields, stored in frontmatter (max 10 KiB serialized)"
                    },
                    "source": {
                        "type": "string",
                        "description": "Capture origin label (default: claude-code)"
                    },
                    "folder": {
                        "type": "string",
                        "description": "Relative subfolder beneath the kind directory"
                    },
                    "identity_key": {
                        "type": "string",
                        "description": "Uniqueness token per (user, kind); saves with a matching key update the existing entry in place"
                    },
                    "expires_at": {
                        "type": "string",
                        "description": "RFC 3339 timestamp or YYYY-MM-DD; expired entries disappear from retrieval and are pruned"
                    }
                },
                "required": ["kind", "body"]
            }),
        },
        Tool {
            name: "get_context".into(),
            description: "Hybrid search over stored entries: full-text + vector retrieval with recency decay for events, diversified and deduplicated. Returns ranked entries with scores.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look for, natural language or keywords"
                    },
                    "kind": {
                        "type": "string",
                        "description": "Restrict to one kind"
                    },
                    "category": {
                        "type": "string",
                        "enum": ["knowledge", "entity", "event"],
                        "description": "Restrict to one category"
                    },
                    "since": {
                        "type": "string",
                        "description": "Only entries created at/after this time (RFC 3339 or YYYY-MM-DD)"
                    },
                    "until": {
                        "type": "string",
                        "description": "Only entries created at/before this time"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum results (default: 20, max: 100)",
                        "default": 20
                    },
                    "offset": {
                        "type": "integer",
                        "description": "Skip this many ranked results",
                        "default": 0
                    },
                    "include_superseded": {
                        "type": "boolean",
                        "description": "Also return entries replaced by a newer version",
                        "default": false
                    }
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "list_context".into(),
            description: "List entries newest-first with optional kind/category/tags/time filters. No relevance ranking; use get_context for search.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "kind": { "type": "string" },
                    "category": { "type": "string", "enum": ["knowledge", "entity", "event"] },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Entries must carry every listed tag"
                    },
                    "since": { "type": "string" },
                    "until": { "type": "string" },
                    "limit": { "type": "integer", "default": 20 },
                    "offset": { "type": "integer", "default": 0 }
                }
            }),
        },
        Tool {
            name: "delete_context".into(),
            description: "Delete an entry by id: removes the index row, its vector, and the markdown file.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Entry id as returned by save_context or get_context"
                    }
                },
                "required": ["id"]
            }),
        },
        Tool {
            name: "ingest_url".into(),
            description: "Fetch a web page, convert it to markdown, and save it as a document entry.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "http(s) URL to fetch"
                    },
                    "kind": {
                        "type": "string",
                        "description": "Entry kind (default: document)"
                    },
                    "title": {
                        "type": "string",
                        "description": "Override the page title"
                    },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "folder": { "type": "string" }
                },
                "required": ["url"]
            }),
        },
        Tool {
            name: "context_status".into(),
            description: "Vault health: paths, entry counts per kind and category, database size, stale paths, expired entries, embedding coverage, and growth warnings with suggested actions.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        },
    ];

    Ok(serde_json::to_value(ToolsListResult { tools })?)
}

/// Handle tools/call: route through the interceptor.
pub(crate) fn handle_tools_call(server: Arc<VaultServer>, params: Option<Value>) -> Result<Value> {
    let params = params.ok_or_else(|| anyhow::anyhow!("tools/call requires params"))?;
    let name = params
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| anyhow::anyhow!("tools/call requires a tool name"))?
        .to_string();
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    Ok(server.run_guarded(&name, arguments))
}

/// Execute one tool by name. Runs on the interceptor's worker thread.
pub(crate) fn dispatch(server: &VaultServer, name: &str, arguments: Value) -> Result<Value> {
    match name {
        "save_context" => save::tool_save(server, arguments),
        "get_context" => get::tool_get(server, arguments),
        "list_context" => list::tool_list(server, arguments),
        "delete_context" => delete::tool_delete(server, arguments),
        "ingest_url" => ingest::tool_ingest(server, arguments),
        "context_status" => status::tool_status(server),
        _ => bail!("Unknown tool: {name}"),
    }
}

/// Wrap a JSON payload in the MCP content envelope.
pub(crate) fn text_content(payload: &Value) -> Result<Value> {
    Ok(serde_json::json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string_pretty(payload)?
        }]
    }))
}
