//! context_status - vault health report

use std::sync::atomic::Ordering;

use anyhow::Result;
use serde_json::Value;

use super::super::server::VaultServer;
use super::text_content;

pub(crate) fn tool_status(server: &VaultServer) -> Result<Value> {
    let model = server.provider.as_ref().map(|p| p.name());
    let report = crate::status::collect(
        &server.store,
        &server.vault_root,
        &server.thresholds,
        model,
    )?;

    let mut payload = serde_json::to_value(&report)?;
    payload["runtime"] = serde_json::json!({
        "active_ops": server.active_ops.load(Ordering::SeqCst),
        "succeeded": server.success_count.load(Ordering::SeqCst),
        "failed": server.error_count.load(Ordering::SeqCst),
        "startup_reindex": server.startup_reindex_status(),
    });
    if let Some(err) = &server.provider_error {
        payload["embedding_error"] = Value::String(err.clone());
    }

    text_content(&payload)
}
