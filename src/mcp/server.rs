//! MCP server core: owns the store and embedding provider, and wraps every
//! tool call in the common interceptor (timeout, op counters, auto-capture,
//! first-call reindex).

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::{Config, Mode, Thresholds};
use crate::embedder::{self, EmbeddingProvider};
use crate::reindex::ReindexReport;
use crate::store::Store;
use crate::{vault, VaultError};

use super::tools;
use super::types::{
    ClientInfo, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ServerCapabilities, ServerInfo, ToolsCapability,
};

/// MCP protocol version
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Per-call wall-clock budget. Past it the caller gets `TIMEOUT`; the
/// stranded worker may still finish and commit (accepted trade-off), its
/// late result or error is dropped with the disconnected channel.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(60);

const STARTUP_REINDEX_ATTEMPTS: u32 = 3;

/// State of the once-per-process startup reindex.
pub(crate) enum StartupReindex {
    Pending,
    Done(ReindexReport),
    Failed(String),
    Skipped,
}

impl StartupReindex {
    pub fn describe(&self) -> String {
        match self {
            StartupReindex::Pending => "pending".into(),
            StartupReindex::Done(r) => format!(
                "done (added {}, updated {}, removed {}, unchanged {})",
                r.added, r.updated, r.removed, r.unchanged
            ),
            StartupReindex::Failed(msg) => format!("failed: {msg}"),
            StartupReindex::Skipped => "skipped (hosted mode)".into(),
        }
    }
}

/// MCP server for one vault.
///
/// All handlers take `&self`; interior counters are atomic and the startup
/// state sits behind a mutex, so concurrent requests are safe.
pub struct VaultServer {
    pub(crate) store: Store,
    pub(crate) provider: Option<Arc<dyn EmbeddingProvider>>,
    /// Remediation hint when the embedding backend failed to load.
    pub(crate) provider_error: Option<String>,
    pub(crate) vault_root: PathBuf,
    pub(crate) thresholds: Thresholds,
    pub(crate) active_ops: AtomicU64,
    pub(crate) success_count: AtomicU64,
    pub(crate) error_count: AtomicU64,
    pub(crate) startup: Mutex<StartupReindex>,
}

impl VaultServer {
    /// Create a server from resolved configuration, loading the default
    /// embedding backend. A backend failure degrades to FTS-only with a
    /// remediation hint in status, it does not prevent startup.
    pub fn new(config: &Config) -> Result<Self> {
        let (provider, provider_error) = match embedder::shared_provider() {
            Ok(p) => (Some(p), None),
            Err(e) => {
                let err = VaultError::NativeModuleFailed(e.to_string());
                tracing::warn!(error = %err, "Continuing without embeddings");
                (None, Some(err.to_string()))
            }
        };
        Self::with_provider(config, provider, provider_error)
    }

    /// Create a server with an explicit provider (tests, hosted deployments).
    pub fn with_provider(
        config: &Config,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        provider_error: Option<String>,
    ) -> Result<Self> {
        let vault_root = vault::require_vault(&config.vault_dir_or_default())?;
        let db_path = config.db_path_or_default();
        let store = Store::open(&db_path)
            .with_context(|| format!("Failed to open index at {}", db_path.display()))?;

        let startup = match config.mode_or_default() {
            Mode::Local => StartupReindex::Pending,
            Mode::Hosted => StartupReindex::Skipped,
        };

        Ok(Self {
            store,
            provider,
            provider_error,
            vault_root,
            thresholds: config.thresholds_or_default(),
            active_ops: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            startup: Mutex::new(startup),
        })
    }

    pub(crate) fn provider_ref(&self) -> Option<&dyn EmbeddingProvider> {
        self.provider.as_deref()
    }

    /// Root directory of the vault this server fronts.
    pub fn vault_root(&self) -> &std::path::Path {
        &self.vault_root
    }

    /// Handle one JSON-RPC request.
    ///
    /// Takes the server by `Arc` so tool workers can outlive a timed-out
    /// call; cloning the handle per request is two atomic bumps.
    pub fn handle_request(self: Arc<Self>, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "initialized" => Ok(Value::Null),
            "tools/list" => tools::handle_tools_list(),
            "tools/call" => tools::handle_tools_call(Arc::clone(&self), request.params),
            _ => Err(anyhow::anyhow!("Unknown method: {}", request.method)),
        };

        match result {
            Ok(value) => JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(e) => {
                let full_error = format!("{e:#}");
                tracing::debug!(error = %full_error, "Request error");
                JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id: request.id,
                    result: None,
                    error: Some(JsonRpcError {
                        code: -32000,
                        message: self.sanitize_error_message(&full_error),
                        data: None,
                    }),
                }
            }
        }
    }

    /// Run one tool call under the interceptor: active-op counter, 60s
    /// timeout, success/error accounting, auto-capture of unknown failures.
    ///
    /// Always returns a protocol-level value: failures become
    /// `{isError, code, message, _meta}` results rather than JSON-RPC errors.
    pub(crate) fn run_guarded(self: Arc<Self>, name: &str, arguments: Value) -> Value {
        self.ensure_startup_reindex();
        self.active_ops.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        let server = Arc::clone(&self);
        let tool = name.to_string();
        std::thread::spawn(move || {
            let outcome = tools::dispatch(&server, &tool, arguments);
            // Receiver gone after a timeout: drop the late result silently
            let _ = tx.send(outcome);
        });

        let outcome = match rx.recv_timeout(TOOL_TIMEOUT) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(VaultError::Timeout(TOOL_TIMEOUT.as_secs()).into())
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(anyhow::anyhow!("tool worker terminated unexpectedly"))
            }
        };

        self.active_ops.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(value) => {
                self.success_count.fetch_add(1, Ordering::SeqCst);
                value
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::SeqCst);
                let code = error_code(&e);
                let message = self.sanitize_error_message(&format!("{e:#}"));
                tracing::warn!(tool = name, code, error = %message, "Tool call failed");
                if code == "UNKNOWN" {
                    self.auto_capture_failure(name, &message);
                }
                serde_json::json!({
                    "isError": true,
                    "code": code,
                    "message": message,
                    "_meta": { "tool": name },
                })
            }
        }
    }

    /// Local mode runs one `reindex(full_sync = true)` before the first tool
    /// call of the process. The mutex makes it exactly-once: concurrent
    /// first callers block here and share the recorded outcome.
    fn ensure_startup_reindex(&self) {
        let mut guard = self.startup.lock().unwrap_or_else(|p| p.into_inner());
        if !matches!(*guard, StartupReindex::Pending) {
            return;
        }

        let mut last_error = String::new();
        for attempt in 1..=STARTUP_REINDEX_ATTEMPTS {
            match self
                .store
                .reindex(&self.vault_root, self.provider_ref(), true)
            {
                Ok(report) => {
                    tracing::info!(attempt, ?report, "Startup reindex complete");
                    *guard = StartupReindex::Done(report);
                    return;
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(attempt, error = %last_error, "Startup reindex attempt failed");
                }
            }
        }
        // Permanently failed for this process; surfaced via context_status
        *guard = StartupReindex::Failed(last_error);
    }

    pub(crate) fn startup_reindex_status(&self) -> String {
        self.startup
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .describe()
    }

    /// Best-effort capture of an unexpected failure as a feedback entry.
    fn auto_capture_failure(&self, tool: &str, message: &str) {
        let request = crate::SaveRequest {
            kind: "feedback".into(),
            title: Some(format!("Auto-captured failure in {tool}")),
            body: format!("Tool `{tool}` failed unexpectedly:\n\n{message}"),
            tags: vec!["bug".into(), "auto-captured".into()],
            source: Some("auto-capture".into()),
            ..Default::default()
        };
        if let Err(e) = crate::capture::capture_and_index(
            &self.store,
            self.provider_ref(),
            &self.vault_root,
            &request,
        ) {
            tracing::debug!(error = %e, "Auto-capture failed (ignored)");
        }
    }

    /// Replace absolute filesystem paths in errors before they reach clients.
    fn sanitize_error_message(&self, error: &str) -> String {
        let root = self.vault_root.to_string_lossy();
        let mut result = error.replace(root.as_ref(), "<vault>");

        let re_unix = regex::Regex::new(r"/(?:home|Users|tmp|var|usr|opt|etc)/[^\s:]+").ok();
        let re_windows =
            regex::Regex::new(r"[A-Za-z]:\\(?:Users|Windows|Program Files)[^\s:]*").ok();
        if let Some(re) = re_unix {
            result = re.replace_all(&result, "<path>").to_string();
        }
        if let Some(re) = re_windows {
            result = re.replace_all(&result, "<path>").to_string();
        }
        result
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let _params: InitializeParams =
            params
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or(InitializeParams {
                    protocol_version: "2024-11-05".into(),
                    capabilities: Value::Object(Default::default()),
                    client_info: ClientInfo {
                        name: "unknown".into(),
                        version: "0.0.0".into(),
                    },
                });

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "context-vault".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };
        Ok(serde_json::to_value(result)?)
    }
}

/// Map an error chain to its stable tool-protocol code.
fn error_code(e: &anyhow::Error) -> &'static str {
    match e.downcast_ref::<VaultError>() {
        Some(err) => err.code(),
        None => "UNKNOWN",
    }
}
