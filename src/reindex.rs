//! Bulk reindex: reconcile the vault directory with the database
//!
//! Disk is the system of record. The walk discovers every entry file, the
//! diff against existing rows classifies each as added / updated / unchanged,
//! and (in full-sync mode) rows whose file vanished are removed. Queued
//! embeddings run in batches after the per-kind walks. The whole
//! reconciliation executes inside one transaction.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::Row;
use walkdir::WalkDir;

use crate::embedder::EmbeddingProvider;
use crate::entry::{entry_from_file, Entry};
use crate::frontmatter;
use crate::kind::{is_valid_kind, Category};
use crate::store::helpers::{encode_embedding, StoreError};
use crate::store::Store;
use crate::vault;

/// Embedding batch size during reindex.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Outcome counts of one reindex run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub unchanged: u64,
}

/// Existing row state loaded per kind, keyed by file path.
struct DbRow {
    rowid: i64,
    title: Option<String>,
    body: String,
    tags_json: Option<String>,
    meta_json: Option<String>,
}

impl Store {
    /// Reconcile disk and database.
    ///
    /// `full_sync = false` is add-only: files already indexed are skipped
    /// without comparison, and nothing is removed.
    pub fn reindex(
        &self,
        vault_root: &Path,
        provider: Option<&dyn EmbeddingProvider>,
        full_sync: bool,
    ) -> Result<ReindexReport, StoreError> {
        let _span = tracing::info_span!("reindex", full_sync).entered();

        // Phase 1: walk the vault (no transaction held during file I/O)
        let disk = collect_disk_entries(vault_root);
        let kinds: Vec<String> = disk.keys().cloned().collect();
        tracing::info!(
            kinds = kinds.len(),
            files = disk.values().map(|v| v.len()).sum::<usize>(),
            "Vault walk complete"
        );

        // Phase 2: diff and apply, one transaction for the whole run
        let mut report = ReindexReport::default();
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            // (rowid, embedding input) queued across all kinds
            let mut embed_queue: Vec<(i64, String)> = Vec::new();

            // Rows that already carry a vector; unchanged rows outside this
            // set get their embedding backfilled (e.g. rows indexed while no
            // backend was available)
            let embedded: HashSet<i64> = if full_sync && provider.is_some() {
                sqlx::query_as::<_, (i64,)>("SELECT rowid FROM vault_vec")
                    .fetch_all(&mut *tx)
                    .await?
                    .into_iter()
                    .map(|(r,)| r)
                    .collect()
            } else {
                HashSet::new()
            };

            for (kind, files) in &disk {
                let existing = load_kind_rows(&mut tx, kind).await?;
                let mut seen_paths: HashSet<PathBuf> = HashSet::new();

                for entry in files {
                    seen_paths.insert(entry.file_path.clone());
                    let path_key = entry.file_path.to_string_lossy().to_string();

                    match existing.get(&path_key) {
                        None => {
                            let rowid = crate::store::upsert_entry_row(&mut tx, entry).await?;
                            embed_queue.push((rowid, entry.embedding_text()));
                            report.added += 1;
                        }
                        Some(_) if !full_sync => {
                            // Add-only mode: known path, leave untouched
                            report.unchanged += 1;
                        }
                        Some(row) => {
                            if row_differs(row, entry) {
                                let content_changed = row.title != entry.title
                                    || row.body != entry.body;
                                let mut refreshed = entry.clone();
                                refreshed.updated_at = chrono::Utc::now();
                                let rowid =
                                    crate::store::upsert_entry_row(&mut tx, &refreshed).await?;
                                if content_changed {
                                    crate::store::delete_vector_conn(&mut tx, rowid).await?;
                                    embed_queue.push((rowid, entry.embedding_text()));
                                }
                                report.updated += 1;
                            } else {
                                if full_sync
                                    && provider.is_some()
                                    && !embedded.contains(&row.rowid)
                                {
                                    embed_queue.push((row.rowid, entry.embedding_text()));
                                }
                                report.unchanged += 1;
                            }
                        }
                    }
                }

                if full_sync {
                    for (path, row) in &existing {
                        if !seen_paths.contains(Path::new(path)) {
                            crate::store::delete_vector_conn(&mut tx, row.rowid).await?;
                            sqlx::query("DELETE FROM vault WHERE rowid = ?1")
                                .bind(row.rowid)
                                .execute(&mut *tx)
                                .await?;
                            report.removed += 1;
                        }
                    }
                }
            }

            // Phase 3: batched embeddings for everything queued
            if let Some(provider) = provider {
                for batch in embed_queue.chunks(EMBED_BATCH_SIZE) {
                    let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
                    match provider.embed_batch(&texts) {
                        Ok(embeddings) => {
                            for ((rowid, _), embedding) in batch.iter().zip(embeddings) {
                                crate::store::delete_vector_conn(&mut tx, *rowid).await?;
                                crate::store::insert_vector_conn(
                                    &mut tx,
                                    *rowid,
                                    &encode_embedding(&embedding),
                                )
                                .await?;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, batch = batch.len(), "Embedding batch failed, rows stay FTS-only");
                        }
                    }
                }
            } else if !embed_queue.is_empty() {
                tracing::info!(
                    queued = embed_queue.len(),
                    "No embedding provider; vectors will backfill on a later reindex"
                );
            }

            tx.commit().await?;
            Ok::<_, StoreError>(())
        })?;

        tracing::info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            unchanged = report.unchanged,
            "Reindex complete"
        );
        Ok(report)
    }
}

/// Walk the vault and parse every entry file, grouped by kind.
fn collect_disk_entries(vault_root: &Path) -> HashMap<String, Vec<Entry>> {
    let mut by_kind: HashMap<String, Vec<Entry>> = HashMap::new();

    for category in Category::all() {
        let category_dir = vault_root.join(category.dir());
        let Ok(kind_dirs) = std::fs::read_dir(&category_dir) else {
            continue;
        };

        for kind_dir in kind_dirs.filter_map(|e| e.ok()) {
            let kind_path = kind_dir.path();
            if !kind_path.is_dir() {
                continue;
            }
            let Some(kind) = kind_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if vault::is_excluded_dir(kind) || !is_valid_kind(kind) {
                continue;
            }

            let entries = by_kind.entry(kind.to_string()).or_default();
            let walker = WalkDir::new(&kind_path).into_iter().filter_entry(|e| {
                // Skip excluded subtrees without descending into them
                !(e.file_type().is_dir()
                    && e.depth() > 0
                    && e.file_name()
                        .to_str()
                        .map(vault::is_excluded_dir)
                        .unwrap_or(false))
            });

            for file in walker.filter_map(|e| e.ok()) {
                if !file.file_type().is_file() {
                    continue;
                }
                let name = file.file_name().to_string_lossy();
                if !name.ends_with(".md") || vault::is_excluded_file(&name) {
                    continue;
                }
                if let Some(entry) = parse_entry_file(kind, &kind_path, file.path()) {
                    entries.push(entry);
                }
            }
        }
    }

    by_kind
}

/// Parse a single entry file; logs and returns `None` on any defect.
fn parse_entry_file(kind: &str, kind_root: &Path, path: &Path) -> Option<Entry> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable entry file, skipping");
            return None;
        }
    };

    let Some((fields, rendered_body)) = frontmatter::decode(&content) else {
        tracing::warn!(path = %path.display(), "No frontmatter, skipping");
        return None;
    };

    let Some(mut entry) = entry_from_file(kind, path.to_path_buf(), &fields, &rendered_body) else {
        tracing::warn!(path = %path.display(), "Missing or malformed id in frontmatter, skipping");
        return None;
    };

    // Disk layout is the source of truth for the folder
    let folder = path
        .parent()
        .and_then(|dir| dir.strip_prefix(kind_root).ok())
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .filter(|rel| !rel.is_empty());
    match folder {
        Some(folder) => {
            entry
                .meta
                .insert("folder".into(), serde_json::Value::String(folder));
        }
        None => {
            entry.meta.remove("folder");
        }
    }

    Some(entry)
}

fn row_differs(row: &DbRow, entry: &Entry) -> bool {
    let tags_json = if entry.tags.is_empty() {
        None
    } else {
        serde_json::to_string(&entry.tags).ok()
    };
    let meta_json = if entry.meta.is_empty() {
        None
    } else {
        serde_json::to_string(&entry.meta).ok()
    };

    row.title != entry.title
        || row.body != entry.body
        || !json_eq(row.tags_json.as_deref(), tags_json.as_deref())
        || !json_eq(row.meta_json.as_deref(), meta_json.as_deref())
}

/// Compare two JSON columns by value, so key-order differences don't force
/// spurious updates.
fn json_eq(a: Option<&str>, b: Option<&str>) -> bool {
    let parse = |s: Option<&str>| -> serde_json::Value {
        s.and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(serde_json::Value::Null)
    };
    parse(a) == parse(b)
}

async fn load_kind_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    kind: &str,
) -> Result<HashMap<String, DbRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT rowid, file_path, title, body, tags, meta FROM vault WHERE kind = ?1",
    )
    .bind(kind)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get::<String, _>("file_path"),
                DbRow {
                    rowid: row.get("rowid"),
                    title: row.get("title"),
                    body: row.get("body"),
                    tags_json: row.get("tags"),
                    meta_json: row.get("meta"),
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_eq_ignores_key_order() {
        assert!(json_eq(
            Some(r#"{"a":1,"b":2}"#),
            Some(r#"{"b":2,"a":1}"#)
        ));
        assert!(json_eq(None, None));
        assert!(!json_eq(Some(r#"{"a":1}"#), Some(r#"{"a":2}"#)));
        assert!(!json_eq(Some(r#"["x"]"#), None));
    }

    #[test]
    fn test_report_default_is_zero() {
        let report = ReindexReport::default();
        assert_eq!(report.added + report.updated + report.removed + report.unchanged, 0);
    }
}
