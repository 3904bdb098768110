//! save_context - capture an entry with write-through indexing

use anyhow::Result;
use serde_json::Value;

use crate::entry::SaveRequest;

use super::super::server::VaultServer;
use super::super::types::SaveArgs;
use super::super::validation::parse_timestamp;
use super::text_content;

pub(crate) fn tool_save(server: &VaultServer, arguments: Value) -> Result<Value> {
    let args: SaveArgs = serde_json::from_value(arguments)?;

    let expires_at = args
        .expires_at
        .as_deref()
        .map(parse_timestamp)
        .transpose()?;

    let request = SaveRequest {
        kind: args.kind,
        title: args.title,
        body: args.body,
        tags: args.tags.unwrap_or_default(),
        meta: args.meta.unwrap_or_default(),
        source: args.source,
        folder: args.folder,
        identity_key: args.identity_key,
        expires_at,
        user_id: args.user_id,
        team_id: args.team_id,
    };

    let entry = crate::capture::capture_and_index(
        &server.store,
        server.provider_ref(),
        &server.vault_root,
        &request,
    )?;

    text_content(&serde_json::json!({
        "id": entry.id,
        "file_path": entry.file_path.to_string_lossy(),
    }))
}
