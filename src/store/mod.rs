//! SQLite index over the vault (sqlx async with sync wrappers)
//!
//! The database is derived state: every row mirrors a markdown file on disk
//! and the whole index is rebuildable via reindex. Methods are synchronous
//! and execute sqlx operations on an owned tokio runtime, so callers never
//! need an async context.
//!
//! ## Module structure
//!
//! - `helpers` - row decoding, embedding codec, FTS query composition
//! - `migrations` - schema DDL and versioned migrations
//! - `entries` - row CRUD, identity lookups, lifecycle (supersede/prune)
//! - `vectors` - vector table ops and nearest-neighbour scan

mod entries;
mod migrations;
mod vectors;

pub(crate) mod helpers;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

pub use entries::ListQuery;
pub use helpers::{StoreError, CURRENT_SCHEMA_VERSION, MIN_SUPPORTED_SCHEMA_VERSION};

pub(crate) use entries::upsert_entry_row;
pub(crate) use vectors::{delete_vector_conn, insert_vector_conn};

/// Thread-safe SQLite store for entries, their FTS shadow, and vectors.
///
/// Uses connection pooling and WAL mode: one writer at a time, readers
/// against a snapshot. All methods take `&self` and are safe to call from
/// multiple threads.
///
/// # Example
///
/// ```no_run
/// use context_vault::Store;
/// use std::path::Path;
///
/// let store = Store::open(Path::new("/home/me/.local/share/context-vault/index.db"))?;
/// println!("{} entries indexed", store.entry_count()?);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) rt: Runtime,
    path: PathBuf,
    /// Whether close() already ran (skip WAL checkpoint in Drop)
    closed: AtomicBool,
}

impl Store {
    /// Open (creating or migrating as needed) the index database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let rt = Runtime::new().map_err(|e| StoreError::Runtime(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut pool = rt.block_on(connect(path))?;

        let version = rt.block_on(read_schema_version(&pool))?;
        if version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaNewerThanApp(version));
        }

        if version == 0 {
            rt.block_on(migrations::create_schema(&pool))?;
        } else if version < MIN_SUPPORTED_SCHEMA_VERSION {
            // Too old to migrate in place: keep a backup, start fresh.
            // The caller rebuilds content from disk via reindex.
            tracing::warn!(
                old_version = version,
                path = %path.display(),
                "Schema too old to migrate; backing up and recreating"
            );
            rt.block_on(pool.close());
            backup_and_reset(path, version)?;
            pool = rt.block_on(connect(path))?;
            rt.block_on(migrations::create_schema(&pool))?;
        } else if version < CURRENT_SCHEMA_VERSION {
            rt.block_on(migrations::migrate(&pool, version, CURRENT_SCHEMA_VERSION))?;
        }

        // The index holds user notes; keep it private to the owner.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let restrictive = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, restrictive.clone());
            for suffix in ["-wal", "-shm"] {
                let side = PathBuf::from(format!("{}{}", path.display(), suffix));
                let _ = std::fs::set_permissions(&side, restrictive.clone());
            }
        }

        tracing::info!(path = %path.display(), "Database connected");

        Ok(Self {
            pool,
            rt,
            path: path.to_path_buf(),
            closed: AtomicBool::new(false),
        })
    }

    /// Path of the backing database file.
    pub fn db_path(&self) -> &Path {
        &self.path
    }

    /// Size of the database file in bytes (0 when unreadable).
    pub fn db_size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Read a metadata value.
    pub fn metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.rt.block_on(async {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM metadata WHERE key = ?1")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(v,)| v))
        })
    }

    /// Gracefully close the store, checkpointing the WAL.
    pub fn close(self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        self.rt.block_on(async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(&self.pool)
                .await?;
            tracing::debug!("WAL checkpoint completed");
            self.pool.close().await;
            Ok(())
        })
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        // Best-effort WAL checkpoint; Drop can't fail. catch_unwind guards
        // against block_on panicking when dropped inside an async context.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            if let Err(e) = self.rt.block_on(async {
                sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                    .execute(&self.pool)
                    .await
            }) {
                tracing::debug!(error = %e, "WAL checkpoint on drop failed (non-fatal)");
            }
        }));
    }
}

async fn connect(path: &Path) -> Result<SqlitePool, StoreError> {
    // Forward slashes for URL compatibility (Windows backslashes don't work)
    let path_str = path.to_string_lossy().replace('\\', "/");
    let db_url = format!("sqlite://{}?mode=rwc", path_str);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .idle_timeout(std::time::Duration::from_secs(300))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // WAL mode: concurrent reads, single writer
                sqlx::query("PRAGMA journal_mode = WAL")
                    .execute(&mut *conn)
                    .await?;
                // 5000ms busy timeout before SQLITE_BUSY
                sqlx::query("PRAGMA busy_timeout = 5000")
                    .execute(&mut *conn)
                    .await?;
                // NORMAL sync: fsync on WAL checkpoint only (safe with WAL)
                sqlx::query("PRAGMA synchronous = NORMAL")
                    .execute(&mut *conn)
                    .await?;
                // 16MB page cache per connection
                sqlx::query("PRAGMA cache_size = -16384")
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("PRAGMA temp_store = MEMORY")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    Ok(pool)
}

async fn read_schema_version(pool: &SqlitePool) -> Result<i32, StoreError> {
    let row: Option<(String,)> =
        match sqlx::query_as("SELECT value FROM metadata WHERE key = 'schema_version'")
            .fetch_optional(pool)
            .await
        {
            Ok(r) => r,
            Err(sqlx::Error::Database(e)) if e.message().contains("no such table") => {
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

    Ok(row
        .and_then(|(s,)| {
            s.parse()
                .map_err(|e| {
                    tracing::warn!(stored_value = %s, error = %e, "Unparseable schema_version, treating as 0");
                })
                .ok()
        })
        .unwrap_or(0))
}

/// Copy the database aside as `<path>.v<old>.backup` and delete it (plus WAL
/// side files) so a fresh schema can be created.
fn backup_and_reset(path: &Path, old_version: i32) -> Result<(), StoreError> {
    let backup = PathBuf::from(format!("{}.v{}.backup", path.display(), old_version));
    std::fs::copy(path, &backup)?;
    std::fs::remove_file(path)?;
    for suffix in ["-wal", "-shm"] {
        let side = PathBuf::from(format!("{}{}", path.display(), suffix));
        if side.exists() {
            let _ = std::fs::remove_file(&side);
        }
    }
    tracing::info!(backup = %backup.display(), "Old database backed up");
    Ok(())
}
