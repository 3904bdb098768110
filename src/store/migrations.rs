//! Schema DDL and migrations
//!
//! The schema lives here as individual statements (FTS5 trigger bodies
//! contain semicolons, so a single `schema.sql` split on `;` would corrupt
//! them). Migrations are additive column changes, each guarded against
//! "duplicate column" so a partially-applied migration can re-run.

use sqlx::SqlitePool;

use super::helpers::StoreError;

#[allow(unused_imports)]
use super::helpers::CURRENT_SCHEMA_VERSION;

/// Full schema at the current version, one statement per element.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS vault (
        id TEXT PRIMARY KEY NOT NULL,
        kind TEXT NOT NULL,
        category TEXT NOT NULL,
        title TEXT,
        body TEXT NOT NULL,
        tags TEXT,
        meta TEXT,
        source TEXT NOT NULL DEFAULT 'claude-code',
        file_path TEXT NOT NULL UNIQUE,
        identity_key TEXT,
        expires_at TEXT,
        superseded_by TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0,
        last_accessed_at TEXT,
        user_id TEXT,
        team_id TEXT
    )",
    // External-content FTS index over the searchable columns, trigger-synced
    "CREATE VIRTUAL TABLE IF NOT EXISTS vault_fts USING fts5(
        title, body, tags, kind,
        content='vault', content_rowid='rowid'
    )",
    "CREATE TRIGGER IF NOT EXISTS vault_fts_ai AFTER INSERT ON vault BEGIN
        INSERT INTO vault_fts(rowid, title, body, tags, kind)
        VALUES (new.rowid, new.title, new.body, new.tags, new.kind);
    END",
    "CREATE TRIGGER IF NOT EXISTS vault_fts_ad AFTER DELETE ON vault BEGIN
        INSERT INTO vault_fts(vault_fts, rowid, title, body, tags, kind)
        VALUES ('delete', old.rowid, old.title, old.body, old.tags, old.kind);
    END",
    "CREATE TRIGGER IF NOT EXISTS vault_fts_au AFTER UPDATE ON vault BEGIN
        INSERT INTO vault_fts(vault_fts, rowid, title, body, tags, kind)
        VALUES ('delete', old.rowid, old.title, old.body, old.tags, old.kind);
        INSERT INTO vault_fts(rowid, title, body, tags, kind)
        VALUES (new.rowid, new.title, new.body, new.tags, new.kind);
    END",
    // One embedding per vault rowid, little-endian f32 blob
    "CREATE TABLE IF NOT EXISTS vault_vec (
        rowid INTEGER PRIMARY KEY,
        embedding BLOB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_vault_kind ON vault(kind)",
    "CREATE INDEX IF NOT EXISTS idx_vault_category ON vault(category)",
    "CREATE INDEX IF NOT EXISTS idx_vault_category_created ON vault(category, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_vault_updated ON vault(updated_at DESC)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_vault_identity
        ON vault(user_id, kind, identity_key) WHERE identity_key IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_vault_superseded
        ON vault(superseded_by) WHERE superseded_by IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_vault_user ON vault(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_vault_team ON vault(team_id)",
    "CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

/// Create all tables, triggers, and indexes, then stamp metadata.
pub(crate) async fn create_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    let now = chrono::Utc::now().to_rfc3339();
    for (key, value) in [
        ("schema_version", CURRENT_SCHEMA_VERSION.to_string()),
        ("created_at", now),
        ("app_version", env!("CARGO_PKG_VERSION").to_string()),
        ("embedding_dim", crate::EMBEDDING_DIM.to_string()),
    ] {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }

    tracing::info!(schema_version = CURRENT_SCHEMA_VERSION, "Schema initialized");
    Ok(())
}

/// Run all migration steps from `from` to `to` inside one transaction.
pub(crate) async fn migrate(pool: &SqlitePool, from: i32, to: i32) -> Result<(), StoreError> {
    if from == to {
        return Ok(());
    }
    if from > to {
        return Err(StoreError::SchemaNewerThanApp(from));
    }

    tracing::info!(from_version = from, to_version = to, "Starting schema migration");

    let mut tx = pool.begin().await?;
    for version in from..to {
        run_migration(&mut tx, version, version + 1).await?;
    }
    sqlx::query("UPDATE metadata SET value = ?1 WHERE key = 'schema_version'")
        .bind(to.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(new_version = to, "Schema migration complete");
    Ok(())
}

async fn run_migration(
    conn: &mut sqlx::SqliteConnection,
    from: i32,
    to: i32,
) -> Result<(), StoreError> {
    match (from, to) {
        (3, 4) => migrate_v3_to_v4(conn).await,
        _ => Err(StoreError::MigrationNotSupported(from, to)),
    }
}

/// v3 → v4: team scoping and access-tracking timestamp.
async fn migrate_v3_to_v4(conn: &mut sqlx::SqliteConnection) -> Result<(), StoreError> {
    add_column(conn, "ALTER TABLE vault ADD COLUMN team_id TEXT").await?;
    add_column(conn, "ALTER TABLE vault ADD COLUMN last_accessed_at TEXT").await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vault_team ON vault(team_id)")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Execute an ADD COLUMN, treating "duplicate column" as already-applied.
async fn add_column(conn: &mut sqlx::SqliteConnection, sql: &str) -> Result<(), StoreError> {
    match sqlx::query(sql).execute(&mut *conn).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.message().contains("duplicate column") => {
            tracing::debug!(sql, "Column already present, skipping");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
