//! Capture: validated entry creation with write-through indexing
//!
//! The markdown file is the system of record. `capture_and_index` writes the
//! file first, then indexes it synchronously; if indexing fails the file is
//! rolled back so disk and database never disagree in the wrong direction. A
//! crash between the two leaves a file without a row, which the next reindex
//! repairs.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::embedder::EmbeddingProvider;
use crate::entry::{dedup_tags, Entry, SaveRequest, DEFAULT_SOURCE};
use crate::id::{id_suffix, new_id, slug};
use crate::kind::category_for;
use crate::store::Store;
use crate::vault::safe_join;
use crate::VaultError;

/// Validate the request and write the entry file. No database interaction.
pub fn write_entry(vault_root: &Path, request: &SaveRequest) -> Result<Entry, VaultError> {
    request.validate()?;

    let now = Utc::now();
    let id = new_id();
    let entry = build_entry(vault_root, request, id, now, now)?;
    persist_file(&entry)?;
    Ok(entry)
}

/// Capture an entry: file write, then synchronous index update.
///
/// A save carrying an `identity_key` that matches an existing
/// `(user_id, kind, identity_key)` row updates that entry in place: same id
/// and `created_at`, fresh `updated_at`, new file, old file removed,
/// re-embedded. Entity kinds mutate only through this path.
pub fn capture_and_index(
    store: &Store,
    provider: Option<&dyn EmbeddingProvider>,
    vault_root: &Path,
    request: &SaveRequest,
) -> Result<Entry, VaultError> {
    request.validate()?;

    let previous = match &request.identity_key {
        Some(key) => store.get_by_identity_key(request.user_id.as_deref(), &request.kind, key)?,
        None => None,
    };

    let now = Utc::now();
    let (id, created_at) = match &previous {
        Some(prev) => (prev.id.clone(), prev.created_at),
        None => (new_id(), now),
    };

    let entry = build_entry(vault_root, request, id, created_at, now)?;
    persist_file(&entry)?;

    if let Err(e) = store.index_entry(&entry, provider) {
        rollback_file(&entry.file_path);
        return Err(VaultError::IndexFailed(Box::new(e)));
    }

    // Upsert-in-place: drop the superseded file once the new one is indexed
    if let Some(prev) = previous {
        if prev.file_path != entry.file_path {
            if let Err(e) = std::fs::remove_file(&prev.file_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %prev.file_path.display(),
                        error = %e,
                        "Failed to remove replaced entry file"
                    );
                }
            }
        }
    }

    tracing::info!(id = %entry.id, kind = %entry.kind, path = %entry.file_path.display(), "Entry captured");
    Ok(entry)
}

/// Create `new` and atomically mark `old_id` superseded by it.
///
/// The pointer is written back into the old entry's frontmatter as well, so
/// a database rebuilt from disk keeps the entry hidden.
pub fn supersede_with(
    store: &Store,
    provider: Option<&dyn EmbeddingProvider>,
    vault_root: &Path,
    old_id: &str,
    request: &SaveRequest,
) -> Result<Entry, VaultError> {
    if store.get_by_id(old_id)?.is_none() {
        return Err(VaultError::NotFound(format!("entry {old_id}")));
    }
    let entry = capture_and_index(store, provider, vault_root, request)?;
    store.supersede(old_id, &entry.id)?;

    if let Some(old) = store.get_by_id(old_id)? {
        if old.file_path.exists() {
            if let Err(e) = std::fs::write(&old.file_path, old.render_file()) {
                tracing::warn!(
                    id = old_id,
                    path = %old.file_path.display(),
                    error = %e,
                    "Could not stamp supersession into entry file"
                );
            }
        }
    }
    Ok(entry)
}

/// Delete an entry everywhere: row, FTS shadow, vector, and file.
pub fn delete_entry(store: &Store, id: &str) -> Result<(), VaultError> {
    let Some(file_path) = store.delete_by_id(id)? else {
        return Err(VaultError::NotFound(format!("entry {id}")));
    };
    match std::fs::remove_file(&file_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tracing::info!(id, path = %file_path.display(), "Entry deleted");
    Ok(())
}

/// Remove every expired entry (row, vector, file). Returns the count.
pub fn prune(store: &Store) -> Result<u64, VaultError> {
    let pruned = store.prune_expired(Utc::now())?;
    let count = pruned.len() as u64;
    for (id, path) in pruned {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(id = %id, path = %path.display(), error = %e, "Could not remove pruned file");
            }
        }
    }
    if count > 0 {
        tracing::info!(count, "Pruned expired entries");
    }
    Ok(count)
}

fn build_entry(
    vault_root: &Path,
    request: &SaveRequest,
    id: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
) -> Result<Entry, VaultError> {
    let category = category_for(&request.kind);

    let kind_dir = safe_join(
        vault_root,
        &format!("{}/{}", category.dir(), request.kind),
    )?;
    let target_dir = match &request.folder {
        Some(folder) => safe_join(&kind_dir, folder)?,
        None => kind_dir,
    };

    let mut meta = request.meta.clone();
    if let Some(folder) = &request.folder {
        meta.insert("folder".into(), serde_json::Value::String(folder.clone()));
    }

    let slug_source = request
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.to_string())
        .unwrap_or_else(|| request.body.chars().take(80).collect());
    let mut stem = slug(&slug_source);
    if stem.is_empty() {
        stem = "entry".into();
    }
    let file_path = target_dir.join(format!("{}-{}.md", stem, id_suffix(&id)));

    Ok(Entry {
        id,
        kind: request.kind.clone(),
        category,
        title: request
            .title
            .clone()
            .filter(|t| !t.trim().is_empty()),
        body: request.body.trim_end_matches('\n').to_string(),
        tags: dedup_tags(&request.tags),
        meta,
        source: request
            .source
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        file_path,
        identity_key: request.identity_key.clone(),
        expires_at: request.expires_at,
        superseded_by: None,
        created_at,
        updated_at,
        hit_count: 0,
        last_accessed_at: None,
        user_id: request.user_id.clone(),
        team_id: request.team_id.clone(),
    })
}

fn persist_file(entry: &Entry) -> Result<(), VaultError> {
    if let Some(parent) = entry.file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&entry.file_path, entry.render_file())?;
    Ok(())
}

fn rollback_file(path: &PathBuf) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::error!(path = %path.display(), error = %e, "Rollback of captured file failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        crate::vault::init_vault(dir.path()).unwrap();
        dir
    }

    fn request(kind: &str, title: Option<&str>, body: &str) -> SaveRequest {
        SaveRequest {
            kind: kind.into(),
            title: title.map(|t| t.to_string()),
            body: body.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_write_entry_creates_file_in_kind_dir() {
        let dir = vault();
        let entry = write_entry(
            dir.path(),
            &request("insight", Some("SQLite is fast"), "Measured it."),
        )
        .unwrap();

        assert!(entry.file_path.exists());
        assert!(entry
            .file_path
            .starts_with(dir.path().join("knowledge/insight")));
        let name = entry.file_path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("sqlite-is-fast-"));
        assert!(name.ends_with(".md"));
        // File name carries the lowercased id tail
        assert!(name.contains(&id_suffix(&entry.id)));
    }

    #[test]
    fn test_write_entry_event_category_dir() {
        let dir = vault();
        let entry = write_entry(dir.path(), &request("session", None, "Did a thing.")).unwrap();
        assert!(entry.file_path.starts_with(dir.path().join("events/session")));
    }

    #[test]
    fn test_write_entry_folder() {
        let dir = vault();
        let mut req = request("note", Some("n"), "b");
        req.folder = Some("work/acme".into());
        let entry = write_entry(dir.path(), &req).unwrap();
        assert!(entry
            .file_path
            .starts_with(dir.path().join("knowledge/note/work/acme")));
        assert_eq!(entry.meta.get("folder").unwrap(), "work/acme");
    }

    #[test]
    fn test_write_entry_rejects_traversal_folder() {
        let dir = vault();
        let mut req = request("note", None, "b");
        req.folder = Some("../../etc".into());
        assert!(matches!(
            write_entry(dir.path(), &req),
            Err(VaultError::PathEscape(_))
        ));
        // Nothing written anywhere
        assert!(std::fs::read_dir(dir.path().join("knowledge/note"))
            .map(|mut d| d.next().is_none())
            .unwrap_or(true));
    }

    #[test]
    fn test_write_entry_validates_first() {
        let dir = vault();
        assert!(matches!(
            write_entry(dir.path(), &request("Bad Kind", None, "b")),
            Err(VaultError::InvalidKind(_))
        ));
        assert!(matches!(
            write_entry(dir.path(), &request("note", None, "  ")),
            Err(VaultError::BodyRequired)
        ));
    }

    #[test]
    fn test_body_slug_fallback_when_untitled() {
        let dir = vault();
        let entry = write_entry(dir.path(), &request("log", None, "Deployed v2 to prod")).unwrap();
        let name = entry.file_path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("deployed-v2-to-prod-"));
    }

    #[test]
    fn test_supersede_with_stamps_old_file() {
        let dir = vault();
        let store = crate::Store::open(&dir.path().join("index.db")).unwrap();

        let old = capture_and_index(&store, None, dir.path(), &request("decision", Some("Old"), "Do X."))
            .unwrap();
        let new = supersede_with(
            &store,
            None,
            dir.path(),
            &old.id,
            &request("decision", Some("New"), "Do Y."),
        )
        .unwrap();

        let content = std::fs::read_to_string(&old.file_path).unwrap();
        assert!(content.contains(&format!("superseded: {}", new.id)));
        // Body untouched by the stamp
        assert!(content.contains("Do X."));
    }

    #[test]
    fn test_tags_deduped_on_write() {
        let dir = vault();
        let mut req = request("note", None, "b");
        req.tags = vec!["a".into(), "b".into(), "a".into()];
        let entry = write_entry(dir.path(), &req).unwrap();
        assert_eq!(entry.tags, vec!["a", "b"]);
    }
}
