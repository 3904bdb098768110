//! get_context - hybrid retrieval

use anyhow::Result;
use serde_json::Value;

use crate::entry::format_ts;
use crate::search::SearchOptions;

use super::super::server::VaultServer;
use super::super::types::GetContextArgs;
use super::super::validation::{clamp_limit, parse_category, parse_timestamp, validate_query_length};
use super::text_content;

pub(crate) fn tool_get(server: &VaultServer, arguments: Value) -> Result<Value> {
    let args: GetContextArgs = serde_json::from_value(arguments)?;
    validate_query_length(&args.query)?;

    let opts = SearchOptions {
        kind: args.kind,
        category: args.category.as_deref().map(parse_category).transpose()?,
        since: args.since.as_deref().map(parse_timestamp).transpose()?,
        until: args.until.as_deref().map(parse_timestamp).transpose()?,
        user_id: args.user_id,
        team_id: args.team_id,
        limit: clamp_limit(args.limit, 20),
        offset: args.offset.unwrap_or(0),
        include_superseded: args.include_superseded.unwrap_or(false),
        ..Default::default()
    };

    let start = std::time::Instant::now();
    let hits = server
        .store
        .hybrid_search(server.provider_ref(), &args.query, &opts)?;
    tracing::info!(
        results = hits.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "Search completed"
    );

    let results: Vec<Value> = hits
        .iter()
        .map(|hit| {
            serde_json::json!({
                "id": hit.entry.id,
                "kind": hit.entry.kind,
                "category": hit.entry.category.as_str(),
                "title": hit.entry.title,
                "body": hit.entry.body,
                "tags": hit.entry.tags,
                "source": hit.entry.source,
                "file_path": hit.entry.file_path.to_string_lossy(),
                "created_at": format_ts(&hit.entry.created_at),
                "score": hit.score,
            })
        })
        .collect();

    text_content(&serde_json::json!({
        "results": results,
        "query": args.query,
        "total": results.len(),
    }))
}
