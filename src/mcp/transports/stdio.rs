//! Stdio transport: line-delimited JSON-RPC on stdin/stdout
//!
//! Logging goes to stderr; stdout carries only protocol frames.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;

use super::super::server::VaultServer;
use super::super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Serve requests from stdin until EOF.
pub fn serve_stdio(server: Arc<VaultServer>) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let error_response = JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id: None,
                    result: None,
                    error: Some(JsonRpcError {
                        code: -32700,
                        message: format!("Parse error: {}", e),
                        data: None,
                    }),
                };
                writeln!(stdout, "{}", serde_json::to_string(&error_response)?)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = Arc::clone(&server).handle_request(request);

        // Notifications (no id) get no response frame
        if response.id.is_none()
            && response
                .result
                .as_ref()
                .map(|v| v.is_null())
                .unwrap_or(false)
        {
            continue;
        }

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}
