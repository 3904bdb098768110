//! list_context - paginated newest-first listing

use anyhow::Result;
use serde_json::Value;

use crate::entry::format_ts;
use crate::store::ListQuery;

use super::super::server::VaultServer;
use super::super::types::ListContextArgs;
use super::super::validation::{clamp_limit, parse_category, parse_timestamp};
use super::text_content;

pub(crate) fn tool_list(server: &VaultServer, arguments: Value) -> Result<Value> {
    let args: ListContextArgs = serde_json::from_value(arguments)?;

    let query = ListQuery {
        kind: args.kind,
        category: args.category.as_deref().map(parse_category).transpose()?,
        tags: args.tags.unwrap_or_default(),
        since: args.since.as_deref().map(parse_timestamp).transpose()?,
        until: args.until.as_deref().map(parse_timestamp).transpose()?,
        user_id: args.user_id,
        team_id: args.team_id,
        limit: clamp_limit(args.limit, 20),
        offset: args.offset.unwrap_or(0),
    };

    let entries = server.store.list_entries(&query)?;

    let results: Vec<Value> = entries
        .iter()
        .map(|entry| {
            serde_json::json!({
                "id": entry.id,
                "kind": entry.kind,
                "category": entry.category.as_str(),
                "title": entry.title,
                "body": entry.body,
                "tags": entry.tags,
                "source": entry.source,
                "file_path": entry.file_path.to_string_lossy(),
                "created_at": format_ts(&entry.created_at),
            })
        })
        .collect();

    text_content(&serde_json::json!({
        "results": results,
        "total": results.len(),
    }))
}
