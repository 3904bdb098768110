//! MCP (Model Context Protocol) server: the coordinator layer
//!
//! Owns the store and the embedding provider for the life of the process and
//! surfaces the tool operations over JSON-RPC. Every tool call runs under a
//! common interceptor: 60s timeout, active-op accounting, auto-capture of
//! unexpected failures, and (local mode) a once-per-process full reindex
//! before the first call.

mod server;
mod tools;
mod transports;
mod types;
mod validation;

pub use server::{VaultServer, TOOL_TIMEOUT};
pub use transports::serve_stdio;
// Types kept public for integration tests; not a stable API
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

#[cfg(test)]
mod tests {
    mod fuzz {
        use super::super::types::JsonRpcRequest;
        use proptest::prelude::*;

        proptest! {
            /// Request parsing never panics on arbitrary input
            #[test]
            fn fuzz_jsonrpc_parse_no_panic(input in "\\PC{0,1000}") {
                let _ = serde_json::from_str::<JsonRpcRequest>(&input);
            }

            /// Structured-ish requests parse or fail cleanly
            #[test]
            fn fuzz_jsonrpc_structured(
                jsonrpc in "(1\\.0|2\\.0|[0-9]\\.[0-9])",
                id in prop::option::of(0i64..1000),
                method in "[a-z/_]{1,30}",
            ) {
                let json = match id {
                    Some(id) => format!(
                        r#"{{"jsonrpc":"{}","id":{},"method":"{}"}}"#,
                        jsonrpc, id, method
                    ),
                    None => format!(r#"{{"jsonrpc":"{}","method":"{}"}}"#, jsonrpc, method),
                };
                let _ = serde_json::from_str::<JsonRpcRequest>(&json);
            }
        }
    }
}
