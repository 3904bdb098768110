//! ingest_url - fetch a page and capture it as a document entry

use anyhow::Result;
use serde_json::Value;

use crate::entry::SaveRequest;

use super::super::server::VaultServer;
use super::super::types::IngestUrlArgs;
use super::text_content;

pub(crate) fn tool_ingest(server: &VaultServer, arguments: Value) -> Result<Value> {
    let args: IngestUrlArgs = serde_json::from_value(arguments)?;

    let page = crate::ingest::fetch_url(&args.url)?;

    let mut meta = serde_json::Map::new();
    meta.insert("url".into(), Value::String(args.url.clone()));
    meta.insert("content_type".into(), Value::String(page.content_type));

    let request = SaveRequest {
        kind: args.kind.unwrap_or_else(|| "document".into()),
        title: args.title.or(page.title),
        body: page.markdown,
        tags: args.tags.unwrap_or_default(),
        meta,
        source: Some(args.source.unwrap_or_else(|| "ingest-url".into())),
        folder: args.folder,
        ..Default::default()
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
