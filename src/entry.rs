//! Entry model and input validation
//!
//! An [`Entry`] is the unit of stored knowledge: the canonical value returned
//! by capture and retrieval, mirrored 1:1 by a row in the index. A
//! [`SaveRequest`] is the validated tool input that produces one.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use serde_yaml::Mapping;

use crate::kind::{category_for, is_valid_kind, Category};
use crate::{frontmatter, VaultError};

pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_BODY_BYTES: usize = 100 * 1024;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 100;
pub const MAX_META_BYTES: usize = 10 * 1024;
pub const MAX_SOURCE_CHARS: usize = 200;
pub const MAX_IDENTITY_KEY_CHARS: usize = 200;

/// Capture origin recorded when the caller does not supply one.
pub const DEFAULT_SOURCE: &str = "claude-code";

/// Frontmatter keys with fixed meaning; everything else round-trips through
/// `meta`.
const RESERVED_KEYS: &[&str] = &[
    "id",
    "title",
    "tags",
    "source",
    "created",
    "identity",
    "expires",
    "superseded",
];

/// A stored entry, as returned by capture and lookups.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub kind: String,
    pub category: Category,
    pub title: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
    pub meta: Map<String, Value>,
    pub source: String,
    pub file_path: PathBuf,
    pub identity_key: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub superseded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub hit_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
}

/// Validated input for saving an entry.
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    pub kind: String,
    pub title: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
    pub meta: Map<String, Value>,
    pub source: Option<String>,
    pub folder: Option<String>,
    pub identity_key: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
}

impl SaveRequest {
    /// Check every input limit; called before any I/O.
    pub fn validate(&self) -> Result<(), VaultError> {
        if !is_valid_kind(&self.kind) {
            return Err(VaultError::InvalidKind(self.kind.clone()));
        }
        if self.body.trim().is_empty() {
            return Err(VaultError::BodyRequired);
        }
        if self.body.len() > MAX_BODY_BYTES {
            return Err(VaultError::BodyTooLarge(self.body.len()));
        }
        if let Some(title) = &self.title {
            let chars = title.chars().count();
            if chars > MAX_TITLE_CHARS {
                return Err(VaultError::TitleTooLong(chars));
            }
        }
        if self.tags.len() > MAX_TAGS {
            return Err(VaultError::TagsTooMany(self.tags.len()));
        }
        for tag in &self.tags {
            if tag.chars().count() > MAX_TAG_CHARS {
                return Err(VaultError::TagTooLong(tag.clone()));
            }
        }
        let meta_len = serde_json::to_string(&self.meta)
            .map(|s| s.len())
            .unwrap_or(0);
        if meta_len > MAX_META_BYTES {
            return Err(VaultError::MetaTooLarge(meta_len));
        }
        if let Some(source) = &self.source {
            if source.chars().count() > MAX_SOURCE_CHARS {
                return Err(VaultError::SourceTooLong);
            }
        }
        if let Some(key) = &self.identity_key {
            if key.chars().count() > MAX_IDENTITY_KEY_CHARS {
                return Err(VaultError::IdentityKeyTooLong);
            }
        }
        Ok(())
    }
}

/// Deduplicate tags preserving first-seen order.
pub fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

/// Timestamp format used everywhere: fixed-width RFC 3339 UTC, so that
/// lexicographic comparison on stored strings equals chronological order.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Entry {
    /// Text handed to the embedding oracle: title and body, absent parts
    /// elided.
    pub fn embedding_text(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => format!("{} {}", title, self.body),
            _ => self.body.clone(),
        }
    }

    /// Visible to retrieval: not expired, not superseded.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.superseded_by.is_none() && self.expires_at.map(|e| e > now).unwrap_or(true)
    }

    /// Render the markdown body section. Knowledge and entity kinds lead with
    /// the title as an H1; events are plain text.
    pub fn render_body(&self) -> String {
        render_body(self.category, self.title.as_deref(), &self.body)
    }

    /// Full file content: frontmatter plus rendered body.
    pub fn render_file(&self) -> String {
        frontmatter::encode(&self.frontmatter_fields(), &self.render_body())
    }

    fn frontmatter_fields(&self) -> Mapping {
        fn put(fields: &mut Mapping, key: &str, value: serde_yaml::Value) {
            fields.insert(serde_yaml::Value::String(key.to_string()), value);
        }

        let mut fields = Mapping::new();
        put(&mut fields, "id", serde_yaml::Value::String(self.id.clone()));
        if let Some(title) = &self.title {
            put(&mut fields, "title", serde_yaml::Value::String(title.clone()));
        }
        // Kind-specific extras are flattened alongside the fixed keys;
        // reserved names are namespaced under meta_* to stay unambiguous.
        for (key, value) in &self.meta {
            let name = if RESERVED_KEYS.contains(&key.as_str()) {
                format!("meta_{key}")
            } else {
                key.clone()
            };
            put(&mut fields, &name, frontmatter::json_to_yaml(value));
        }
        put(
            &mut fields,
            "tags",
            serde_yaml::Value::Sequence(
                self.tags
                    .iter()
                    .map(|t| serde_yaml::Value::String(t.clone()))
                    .collect(),
            ),
        );
        put(&mut fields, "source", serde_yaml::Value::String(self.source.clone()));
        if let Some(key) = &self.identity_key {
            put(&mut fields, "identity", serde_yaml::Value::String(key.clone()));
        }
        if let Some(expires) = &self.expires_at {
            put(&mut fields, "expires", serde_yaml::Value::String(format_ts(expires)));
        }
        // Supersession is a visibility field like expiry: it must survive a
        // database rebuild from disk
        if let Some(successor) = &self.superseded_by {
            put(&mut fields, "superseded", serde_yaml::Value::String(successor.clone()));
        }
        put(&mut fields, "created", serde_yaml::Value::String(format_ts(&self.created_at)));
        fields
    }
}

/// Render a body section for the given category.
pub fn render_body(category: Category, title: Option<&str>, body: &str) -> String {
    match (category, title) {
        (Category::Event, _) | (_, None) => body.to_string(),
        (_, Some(title)) if title.is_empty() => body.to_string(),
        (_, Some(title)) => format!("# {}\n\n{}", title, body),
    }
}

/// Invert [`render_body`]: strip the rendered H1 when the frontmatter title
/// matches, recovering the original body text.
pub fn parse_body(category: Category, title: Option<&str>, rendered: &str) -> String {
    if let Some(title) = title {
        if category != Category::Event && !title.is_empty() {
            let h1 = format!("# {}\n\n", title);
            if let Some(stripped) = rendered.strip_prefix(&h1) {
                return stripped.to_string();
            }
            // Title-only file: H1 with nothing after
            let bare = format!("# {}", title);
            if rendered.trim_end() == bare {
                return String::new();
            }
        }
    }
    rendered.to_string()
}

/// Reconstruct an [`Entry`] from an on-disk file.
///
/// `kind` comes from the directory; `file_path` is the absolute entry path.
/// Unknown frontmatter keys land in `meta`. Returns `None` when the `id`
/// field is missing or malformed, since no row can be keyed without it.
pub fn entry_from_file(
    kind: &str,
    file_path: PathBuf,
    fields: &Mapping,
    rendered_body: &str,
) -> Option<Entry> {
    fn field<'a>(fields: &'a Mapping, name: &str) -> Option<&'a serde_yaml::Value> {
        fields
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .map(|(_, v)| v)
    }
    let get_str = |name: &str| -> Option<String> {
        field(fields, name)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    let id = get_str("id")?;
    if id.len() != 26 {
        return None;
    }

    let category = category_for(kind);
    let title = get_str("title").filter(|t| !t.is_empty());
    let body = parse_body(category, title.as_deref(), rendered_body)
        .trim_end_matches('\n')
        .to_string();

    let tags: Vec<String> = field(fields, "tags")
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let mut meta = Map::new();
    for (key, value) in fields {
        let Some(name) = key.as_str() else { continue };
        if RESERVED_KEYS.contains(&name) {
            continue;
        }
        let meta_key = name.strip_prefix("meta_").unwrap_or(name).to_string();
        meta.insert(meta_key, frontmatter::yaml_to_json(value));
    }

    let created_at = get_str("created").and_then(|s| parse_ts(&s))?;

    Some(Entry {
        id,
        kind: kind.to_string(),
        category,
        title,
        body,
        tags,
        meta,
        source: get_str("source").unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        file_path,
        identity_key: get_str("identity"),
        expires_at: get_str("expires").and_then(|s| parse_ts(&s)),
        superseded_by: get_str("superseded"),
        created_at,
        updated_at: created_at,
        hit_count: 0,
        last_accessed_at: None,
        user_id: None,
        team_id: None,
    })
}
