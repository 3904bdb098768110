//! Entry row operations: indexing, lookups, lifecycle, listing, counts

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::embedder::EmbeddingProvider;
use crate::entry::{format_ts, Entry};
use crate::kind::Category;

use super::helpers::{
    decode_entry_row, encode_embedding, EntryWithRowid, StoreError, ENTRY_COLUMNS,
};
use super::Store;

/// Filters for [`Store::list_entries`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub kind: Option<String>,
    pub category: Option<Category>,
    pub tags: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl ListQuery {
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            20
        } else {
            self.limit
        }
    }
}

impl Store {
    /// Index one entry: upsert the row (FTS follows via triggers), then
    /// replace its vector.
    ///
    /// Row and vector writes share one transaction. An embedding failure is
    /// logged and swallowed — the row stays searchable via FTS and the next
    /// reindex backfills the vector.
    pub fn index_entry(
        &self,
        entry: &Entry,
        provider: Option<&dyn EmbeddingProvider>,
    ) -> Result<(), StoreError> {
        let embedding = provider.and_then(|p| match p.embed(&entry.embedding_text()) {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(entry_id = %entry.id, error = %err, "Embedding failed, indexing without vector");
                None
            }
        });

        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let rowid = upsert_entry_row(&mut tx, entry).await?;
            if let Some(embedding) = embedding {
                super::vectors::delete_vector_conn(&mut tx, rowid).await?;
                super::vectors::insert_vector_conn(&mut tx, rowid, &encode_embedding(&embedding))
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    /// Direct lookup by entry id.
    pub fn get_by_id(&self, id: &str) -> Result<Option<Entry>, StoreError> {
        self.rt.block_on(async {
            let sql = format!("SELECT {ENTRY_COLUMNS} FROM vault WHERE id = ?1");
            let row = sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            row.map(|r| decode_entry_row(&r).map(|e| e.entry)).transpose()
        })
    }

    /// Lookup by the caller-provided uniqueness token, scoped to
    /// `(user_id, kind)`.
    pub fn get_by_identity_key(
        &self,
        user_id: Option<&str>,
        kind: &str,
        identity_key: &str,
    ) -> Result<Option<Entry>, StoreError> {
        self.rt.block_on(async {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM vault
                 WHERE kind = ?1 AND identity_key = ?2 AND user_id IS ?3"
            );
            let row = sqlx::query(&sql)
                .bind(kind)
                .bind(identity_key)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            row.map(|r| decode_entry_row(&r).map(|e| e.entry)).transpose()
        })
    }

    /// Delete an entry's row and vector. Returns the file path that backed it
    /// so the caller can remove the file, or `None` when the id is unknown.
    pub fn delete_by_id(&self, id: &str) -> Result<Option<PathBuf>, StoreError> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let found: Option<(i64, String)> =
                sqlx::query_as("SELECT rowid, file_path FROM vault WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some((rowid, file_path)) = found else {
                return Ok(None);
            };
            super::vectors::delete_vector_conn(&mut tx, rowid).await?;
            sqlx::query("DELETE FROM vault WHERE rowid = ?1")
                .bind(rowid)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(Some(PathBuf::from(file_path)))
        })
    }

    /// Mark `old_id` as superseded by `new_id`. Returns false when `old_id`
    /// does not exist.
    pub fn supersede(&self, old_id: &str, new_id: &str) -> Result<bool, StoreError> {
        let now = format_ts(&Utc::now());
        self.rt.block_on(async {
            let result =
                sqlx::query("UPDATE vault SET superseded_by = ?1, updated_at = ?2 WHERE id = ?3")
                    .bind(new_id)
                    .bind(&now)
                    .bind(old_id)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    /// Delete every row with `expires_at <= now`, cascading to FTS (trigger)
    /// and vectors. Returns the removed `(id, file_path)` pairs so the caller
    /// can delete the markdown files.
    pub fn prune_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, PathBuf)>, StoreError> {
        let cutoff = format_ts(&now);
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            let doomed: Vec<(i64, String, String)> = sqlx::query_as(
                "SELECT rowid, id, file_path FROM vault
                 WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            )
            .bind(&cutoff)
            .fetch_all(&mut *tx)
            .await?;

            for (rowid, _, _) in &doomed {
                super::vectors::delete_vector_conn(&mut tx, *rowid).await?;
            }
            sqlx::query("DELETE FROM vault WHERE expires_at IS NOT NULL AND expires_at <= ?1")
                .bind(&cutoff)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(doomed
                .into_iter()
                .map(|(_, id, path)| (id, PathBuf::from(path)))
                .collect())
        })
    }

    /// Best-effort access tracking for a returned result page: one UPDATE
    /// bumping `hit_count` and `last_accessed_at`. Failures are swallowed.
    pub fn record_access(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let now = format_ts(&Utc::now());
        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        let sql = format!(
            "UPDATE vault SET hit_count = hit_count + 1, last_accessed_at = ? WHERE id IN ({})",
            placeholders.join(",")
        );
        let result = self.rt.block_on(async {
            let mut query = sqlx::query(&sql).bind(&now);
            for id in ids {
                query = query.bind(id);
            }
            query.execute(&self.pool).await
        });
        if let Err(e) = result {
            tracing::debug!(error = %e, "Access tracking failed (ignored)");
        }
    }

    /// Paginated scan ordered `created_at DESC`.
    ///
    /// Tag filtering does a `LIKE` pre-filter on the JSON tags column with a
    /// 10x over-fetch, then exact membership in memory. Fine at personal-vault
    /// scale; revisit past ~10k entries.
    pub fn list_entries(&self, query: &ListQuery) -> Result<Vec<Entry>, StoreError> {
        let limit = query.effective_limit();
        let now = format_ts(&Utc::now());

        let mut conditions: Vec<String> =
            vec!["(expires_at IS NULL OR expires_at > ?)".into(), "superseded_by IS NULL".into()];
        let mut binds: Vec<String> = vec![now];

        if let Some(kind) = &query.kind {
            conditions.push("kind = ?".into());
            binds.push(kind.clone());
        }
        if let Some(category) = &query.category {
            conditions.push("category = ?".into());
            binds.push(category.as_str().to_string());
        }
        if let Some(since) = &query.since {
            conditions.push("created_at >= ?".into());
            binds.push(format_ts(since));
        }
        if let Some(until) = &query.until {
            conditions.push("created_at <= ?".into());
            binds.push(format_ts(until));
        }
        if let Some(user_id) = &query.user_id {
            conditions.push("user_id = ?".into());
            binds.push(user_id.clone());
        }
        if let Some(team_id) = &query.team_id {
            conditions.push("team_id = ?".into());
            binds.push(team_id.clone());
        }
        for tag in &query.tags {
            conditions.push("tags LIKE ?".into());
            binds.push(format!("%{}%", serde_json::to_string(tag).unwrap_or_default()));
        }

        let filter_by_tags = !query.tags.is_empty();
        let (fetch_limit, fetch_offset) = if filter_by_tags {
            ((limit + query.offset) * 10, 0)
        } else {
            (limit, query.offset)
        };

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM vault WHERE {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            conditions.join(" AND ")
        );

        let rows = self.rt.block_on(async {
            let mut q = sqlx::query(&sql);
            for bind in &binds {
                q = q.bind(bind);
            }
            q = q.bind(fetch_limit as i64).bind(fetch_offset as i64);
            q.fetch_all(&self.pool).await
        })?;

        let mut entries: Vec<Entry> = rows
            .iter()
            .filter_map(|row| match decode_entry_row(row) {
                Ok(e) => Some(e.entry),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping undecodable row");
                    None
                }
            })
            .collect();

        if filter_by_tags {
            entries.retain(|e| query.tags.iter().all(|t| e.tags.iter().any(|et| et == t)));
            entries = entries
                .into_iter()
                .skip(query.offset)
                .take(limit)
                .collect();
        }

        Ok(entries)
    }

    // ===== Counts and health queries =====

    pub fn entry_count(&self) -> Result<u64, StoreError> {
        self.count_where("1 = 1")
    }

    pub fn expired_count(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = format_ts(&now);
        self.rt.block_on(async {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM vault WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            )
            .bind(&cutoff)
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        })
    }

    /// Event-category entries with no TTL; these accumulate forever unless
    /// callers set `expires_at`.
    pub fn events_without_ttl_count(&self) -> Result<u64, StoreError> {
        self.count_where("category = 'event' AND expires_at IS NULL")
    }

    pub fn counts_by_kind(&self) -> Result<HashMap<String, u64>, StoreError> {
        self.group_counts("kind")
    }

    pub fn counts_by_category(&self) -> Result<HashMap<String, u64>, StoreError> {
        self.group_counts("category")
    }

    /// All indexed file paths, for stale-path detection.
    pub fn file_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        self.rt.block_on(async {
            let rows: Vec<(String,)> = sqlx::query_as("SELECT file_path FROM vault")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(|(p,)| PathBuf::from(p)).collect())
        })
    }

    fn count_where(&self, condition: &str) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM vault WHERE {condition}");
        self.rt.block_on(async {
            let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
            Ok(count as u64)
        })
    }

    fn group_counts(&self, column: &str) -> Result<HashMap<String, u64>, StoreError> {
        let sql = format!("SELECT {column}, COUNT(*) FROM vault GROUP BY {column}");
        self.rt.block_on(async {
            let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(|(k, c)| (k, c as u64)).collect())
        })
    }

    // ===== Internal hydration helpers (search, reindex) =====

    /// Fetch full entries (with rowids) for a set of ids in one IN query.
    pub(crate) async fn fetch_by_ids_async(
        &self,
        ids: &[&str],
    ) -> Result<HashMap<String, EntryWithRowid>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM vault WHERE id IN ({})",
            placeholders.join(",")
        );
        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(*id);
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .filter_map(|row| decode_entry_row(row).ok())
            .map(|e| (e.entry.id.clone(), e))
            .collect())
    }
}

/// Upsert one entry row inside an open transaction, returning its rowid.
///
/// An existing id is updated in place (identity upserts, reindex edits); a
/// new id colliding on `file_path` falls back to updating that row.
pub(crate) async fn upsert_entry_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &Entry,
) -> Result<i64, StoreError> {
    let tags_json = if entry.tags.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&entry.tags).unwrap_or_default())
    };
    let meta_json = if entry.meta.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&entry.meta).unwrap_or_default())
    };
    let file_path = entry.file_path.to_string_lossy().to_string();

    let existing: Option<(i64,)> = sqlx::query_as("SELECT rowid FROM vault WHERE id = ?1")
        .bind(&entry.id)
        .fetch_optional(&mut **tx)
        .await?;

    if let Some((rowid,)) = existing {
        // created_at, hit_count, last_accessed_at, and superseded_by are
        // database-owned state: a content update (identity upsert, reindexed
        // disk edit) must never reset them. Supersession changes only through
        // supersede().
        sqlx::query(
            "UPDATE vault SET kind = ?1, category = ?2, title = ?3, body = ?4, tags = ?5,
                meta = ?6, source = ?7, file_path = ?8, identity_key = ?9, expires_at = ?10,
                updated_at = ?11, user_id = ?12, team_id = ?13
             WHERE rowid = ?14",
        )
        .bind(&entry.kind)
        .bind(entry.category.as_str())
        .bind(&entry.title)
        .bind(&entry.body)
        .bind(&tags_json)
        .bind(&meta_json)
        .bind(&entry.source)
        .bind(&file_path)
        .bind(&entry.identity_key)
        .bind(entry.expires_at.as_ref().map(format_ts))
        .bind(format_ts(&entry.updated_at))
        .bind(&entry.user_id)
        .bind(&entry.team_id)
        .execute(&mut **tx)
        .await?;
        return Ok(rowid);
    }

    sqlx::query(
        "INSERT INTO vault (id, kind, category, title, body, tags, meta, source, file_path,
            identity_key, expires_at, superseded_by, created_at, updated_at, hit_count,
            last_accessed_at, user_id, team_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, NULL, ?15, ?16)
         ON CONFLICT(file_path) DO UPDATE SET
            id = excluded.id, kind = excluded.kind, category = excluded.category,
            title = excluded.title, body = excluded.body, tags = excluded.tags,
            meta = excluded.meta, source = excluded.source,
            identity_key = excluded.identity_key, expires_at = excluded.expires_at,
            superseded_by = excluded.superseded_by, updated_at = excluded.updated_at,
            user_id = excluded.user_id, team_id = excluded.team_id",
    )
    .bind(&entry.id)
    .bind(&entry.kind)
    .bind(entry.category.as_str())
    .bind(&entry.title)
    .bind(&entry.body)
    .bind(&tags_json)
    .bind(&meta_json)
    .bind(&entry.source)
    .bind(&file_path)
    .bind(&entry.identity_key)
    .bind(entry.expires_at.as_ref().map(format_ts))
    .bind(&entry.superseded_by)
    .bind(format_ts(&entry.created_at))
    .bind(format_ts(&entry.updated_at))
    .bind(&entry.user_id)
    .bind(&entry.team_id)
    .execute(&mut **tx)
    .await?;

    let (rowid,): (i64,) = sqlx::query_as("SELECT rowid FROM vault WHERE file_path = ?1")
        .bind(&file_path)
        .fetch_one(&mut **tx)
        .await?;
    Ok(rowid)
}
