//! Store helper types, row decoding, and FTS query composition

use std::path::PathBuf;

use thiserror::Error;

use crate::embedder::Embedding;
use crate::entry::{parse_ts, Entry};
use crate::kind::{category_for, Category};
use crate::EMBEDDING_DIM;

/// Schema version for database migrations.
///
/// History:
/// - v3: partial unique identity index, supersession column
/// - v4: current (team scoping, access-tracking timestamp)
pub const CURRENT_SCHEMA_VERSION: i32 = 4;

/// Oldest schema this build can migrate in place. Anything older (but > 0) is
/// backed up to `<db>.v<old>.backup` and recreated fresh; a reindex rebuilds
/// the content from disk.
pub const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 3;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Index created by a newer context-vault (schema v{0}). Please upgrade.")]
    SchemaNewerThanApp(i32),
    #[error("No migration path from schema v{0} to v{1}")]
    MigrationNotSupported(i32, i32),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// An entry paired with its internal numeric row identifier.
///
/// The rowid keys the vector table; retrieval carries it alongside the entry
/// to avoid re-querying.
#[derive(Debug, Clone)]
pub(crate) struct EntryWithRowid {
    pub rowid: i64,
    pub entry: Entry,
}

/// Columns selected whenever a full entry is hydrated.
pub(crate) const ENTRY_COLUMNS: &str = "rowid, id, kind, category, title, body, tags, meta, \
     source, file_path, identity_key, expires_at, superseded_by, created_at, updated_at, \
     hit_count, last_accessed_at, user_id, team_id";

/// Decode a full `vault` row (selected via [`ENTRY_COLUMNS`]).
pub(crate) fn decode_entry_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<EntryWithRowid, StoreError> {
    use sqlx::Row;

    let id: String = row.get("id");
    let kind: String = row.get("kind");
    let category = row
        .get::<String, _>("category")
        .parse::<Category>()
        .unwrap_or_else(|_| {
            tracing::warn!(entry_id = %id, "Unparseable category in row, recomputing from kind");
            category_for(&kind)
        });
    let tags: Vec<String> = row
        .get::<Option<String>, _>("tags")
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();
    let meta: serde_json::Map<String, serde_json::Value> = row
        .get::<Option<String>, _>("meta")
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();

    let created_at = parse_ts(&row.get::<String, _>("created_at"))
        .ok_or_else(|| StoreError::Corrupt(format!("bad created_at on {id}")))?;
    let updated_at = parse_ts(&row.get::<String, _>("updated_at")).unwrap_or(created_at);

    Ok(EntryWithRowid {
        rowid: row.get("rowid"),
        entry: Entry {
            id,
            kind,
            category,
            title: row.get("title"),
            body: row.get("body"),
            tags,
            meta,
            source: row.get("source"),
            file_path: PathBuf::from(row.get::<String, _>("file_path")),
            identity_key: row.get("identity_key"),
            expires_at: row
                .get::<Option<String>, _>("expires_at")
                .as_deref()
                .and_then(parse_ts),
            superseded_by: row.get("superseded_by"),
            created_at,
            updated_at,
            hit_count: row.get("hit_count"),
            last_accessed_at: row
                .get::<Option<String>, _>("last_accessed_at")
                .as_deref()
                .and_then(parse_ts),
            user_id: row.get("user_id"),
            team_id: row.get("team_id"),
        },
    })
}

// ===== Embedding column codec =====

/// Serialize an embedding as little-endian f32 bytes.
pub fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    embedding
        .as_slice()
        .iter()
        .flat_map(|f| f.to_le_bytes())
        .collect()
}

/// Decode an embedding column; `None` when the length is not exactly
/// `EMBEDDING_DIM * 4` bytes.
pub fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() != EMBEDDING_DIM * 4 {
        tracing::warn!(
            expected = EMBEDDING_DIM * 4,
            got = bytes.len(),
            "Embedding byte length mismatch, skipping vector"
        );
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("chunks_exact yields 4 bytes")))
            .collect(),
    )
}

// ===== FTS query composition =====

/// Characters stripped from query tokens before FTS5 MATCH.
const FTS_METACHARS: &str = "*\"():^~{}";

/// Tokenize a query for FTS: split on whitespace and hyphen, strip FTS5
/// metacharacters, drop empties.
pub fn fts_tokens(query: &str) -> Vec<String> {
    query
        .split(|c: char| c.is_whitespace() || c == '-')
        .map(|token| {
            token
                .chars()
                .filter(|c| !FTS_METACHARS.contains(*c))
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Compose the tiered MATCH expression: exact phrase, then NEAR within 10
/// tokens, then plain conjunction. A single token becomes a quoted term.
pub fn build_match_query(tokens: &[String]) -> Option<String> {
    match tokens {
        [] => None,
        [only] => Some(format!("\"{}\"", only)),
        many => {
            let phrase = format!("\"{}\"", many.join(" "));
            let quoted: Vec<String> = many.iter().map(|t| format!("\"{}\"", t)).collect();
            let near = format!("NEAR({}, 10)", quoted.join(" "));
            let conj = quoted.join(" AND ");
            Some(format!("{phrase} OR {near} OR ({conj})"))
        }
    }
}

/// True when a MATCH failure should degrade to an empty FTS stage instead of
/// surfacing an error.
pub(crate) fn is_fts_syntax_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            let msg = db.message();
            msg.contains("fts5") || msg.contains("syntax error") || msg.contains("malformed MATCH")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fts_tokens_splits_hyphen_and_whitespace() {
        assert_eq!(fts_tokens("hybrid-search local"), vec!["hybrid", "search", "local"]);
        assert_eq!(fts_tokens("  a\tb\nc "), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_fts_tokens_strips_metachars() {
        assert_eq!(fts_tokens("foo*bar\"("), vec!["foobar"]);
        assert_eq!(fts_tokens("a:b^c~d{e}f"), vec!["abcdef"]);
        assert!(fts_tokens("*\"()").is_empty());
        assert!(fts_tokens("").is_empty());
    }

    #[test]
    fn test_build_match_query_single() {
        let tokens = fts_tokens("sqlite");
        assert_eq!(build_match_query(&tokens).unwrap(), "\"sqlite\"");
    }

    #[test]
    fn test_build_match_query_tiered() {
        let tokens = fts_tokens("sqlite performance local");
        let q = build_match_query(&tokens).unwrap();
        assert_eq!(
            q,
            "\"sqlite performance local\" OR NEAR(\"sqlite\" \"performance\" \"local\", 10) \
             OR (\"sqlite\" AND \"performance\" AND \"local\")"
        );
    }

    #[test]
    fn test_build_match_query_empty() {
        assert!(build_match_query(&[]).is_none());
    }

    #[test]
    fn test_embedding_codec_roundtrip() {
        let emb = Embedding::new((0..EMBEDDING_DIM).map(|i| i as f32 * 0.01).collect());
        let bytes = encode_embedding(&emb);
        assert_eq!(bytes.len(), EMBEDDING_DIM * 4);
        let decoded = decode_embedding(&bytes).unwrap();
        assert_eq!(decoded, emb.as_slice());
    }

    #[test]
    fn test_decode_embedding_wrong_length() {
        assert!(decode_embedding(&[0u8; 12]).is_none());
        assert!(decode_embedding(&[]).is_none());
    }

    proptest! {
        #[test]
        fn prop_fts_tokens_no_metachars(input in "\\PC{0,200}") {
            for token in fts_tokens(&input) {
                prop_assert!(!token.chars().any(|c| FTS_METACHARS.contains(c)));
                prop_assert!(!token.is_empty());
            }
        }

        #[test]
        fn prop_match_query_balanced_quotes(input in "\\PC{0,100}") {
            if let Some(q) = build_match_query(&fts_tokens(&input)) {
                let quotes = q.chars().filter(|&c| c == '"').count();
                prop_assert_eq!(quotes % 2, 0, "unbalanced quotes in: {}", q);
            }
        }
    }
}
