//! Vault health snapshot
//!
//! Composes store counts, filesystem state, and embedding coverage into one
//! report. Only the total count is fatal; every other sub-query degrades
//! gracefully and surfaces as a warning instead of failing the report.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::config::{Limit, Thresholds};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Warn,
    Critical,
}

/// A threshold breach or degraded sub-query, with a suggested action.
#[derive(Debug, Clone, Serialize)]
pub struct StatusWarning {
    pub level: WarningLevel,
    pub message: String,
    pub suggestion: String,
}

/// Full health report returned by the status tool.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub vault_dir: String,
    pub db_path: String,
    pub total_entries: u64,
    pub by_kind: HashMap<String, u64>,
    pub by_category: HashMap<String, u64>,
    pub db_size_bytes: u64,
    pub vault_size_bytes: u64,
    /// Rows whose backing file is missing on disk (repaired by reindex).
    pub stale_paths: u64,
    pub expired_entries: u64,
    pub embedding_available: bool,
    pub embedding_model: Option<String>,
    /// Vector coverage: entries with an embedding vs total.
    pub embedded_entries: u64,
    pub warnings: Vec<StatusWarning>,
}

/// Build the health report.
pub fn collect(
    store: &Store,
    vault_root: &Path,
    thresholds: &Thresholds,
    embedding_model: Option<&'static str>,
) -> Result<StatusReport, crate::VaultError> {
    let _span = tracing::info_span!("status").entered();

    // Fatal: nothing useful to report without the base count
    let total_entries = store.entry_count()?;

    let mut warnings = Vec::new();

    let by_kind = store.counts_by_kind().unwrap_or_else(|e| {
        degraded(&mut warnings, "per-kind counts", &e);
        HashMap::new()
    });
    let by_category = store.counts_by_category().unwrap_or_else(|e| {
        degraded(&mut warnings, "per-category counts", &e);
        HashMap::new()
    });
    let expired_entries = store.expired_count(chrono::Utc::now()).unwrap_or_else(|e| {
        degraded(&mut warnings, "expired count", &e);
        0
    });
    let embedded_entries = store.vector_count().unwrap_or_else(|e| {
        degraded(&mut warnings, "vector count", &e);
        0
    });
    let events_without_ttl = store.events_without_ttl_count().unwrap_or_else(|e| {
        degraded(&mut warnings, "event TTL count", &e);
        0
    });

    let stale_paths = match store.file_paths() {
        Ok(paths) => paths.iter().filter(|p| !p.exists()).count() as u64,
        Err(e) => {
            degraded(&mut warnings, "stale path check", &e);
            0
        }
    };

    let vault_size_bytes = dir_size(vault_root);
    let event_entries = by_category.get("event").copied().unwrap_or(0);

    check_limit(
        &mut warnings,
        total_entries,
        &thresholds.total_entries,
        "total entries",
        "Archive or delete old entries, or move project material under projects/ (excluded from indexing).",
    );
    check_limit(
        &mut warnings,
        event_entries,
        &thresholds.event_entries,
        "event entries",
        "Set expires_at on session/log/task entries so prune can reclaim them.",
    );
    check_limit(
        &mut warnings,
        vault_size_bytes,
        &thresholds.vault_size_bytes,
        "vault size (bytes)",
        "Trim large bodies or split bulky documents out of the vault.",
    );
    check_limit(
        &mut warnings,
        events_without_ttl,
        &thresholds.events_without_ttl,
        "events without TTL",
        "Give event entries an expires_at; they accumulate forever otherwise.",
    );

    if expired_entries > 0 {
        warnings.push(StatusWarning {
            level: WarningLevel::Warn,
            message: format!("{expired_entries} expired entries still on disk"),
            suggestion: "Run prune to remove expired entries and their files.".into(),
        });
    }
    if stale_paths > 0 {
        warnings.push(StatusWarning {
            level: WarningLevel::Warn,
            message: format!("{stale_paths} indexed rows point at missing files"),
            suggestion: "Run a full reindex to reconcile the index with disk.".into(),
        });
    }

    Ok(StatusReport {
        vault_dir: vault_root.display().to_string(),
        db_path: store.db_path().display().to_string(),
        total_entries,
        by_kind,
        by_category,
        db_size_bytes: store.db_size_bytes(),
        vault_size_bytes,
        stale_paths,
        expired_entries,
        embedding_available: embedding_model.is_some(),
        embedding_model: embedding_model.map(|m| m.to_string()),
        embedded_entries,
        warnings,
    })
}

fn degraded(warnings: &mut Vec<StatusWarning>, what: &str, e: &dyn std::fmt::Display) {
    tracing::warn!(error = %e, "Status sub-query failed: {what}");
    warnings.push(StatusWarning {
        level: WarningLevel::Warn,
        message: format!("{what} unavailable: {e}"),
        suggestion: "Check the index database; a reindex may repair it.".into(),
    });
}

fn check_limit(
    warnings: &mut Vec<StatusWarning>,
    value: u64,
    limit: &Limit,
    what: &str,
    suggestion: &str,
) {
    let level = if value >= limit.critical {
        Some(WarningLevel::Critical)
    } else if value >= limit.warn {
        Some(WarningLevel::Warn)
    } else {
        None
    };
    if let Some(level) = level {
        warnings.push(StatusWarning {
            level,
            message: format!("{what} at {value} (warn {}, critical {})", limit.warn, limit.critical),
            suggestion: suggestion.into(),
        });
    }
}

fn dir_size(root: &Path) -> u64 {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
