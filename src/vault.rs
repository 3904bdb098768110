//! Vault directory layout and path safety
//!
//! A vault is a plain directory holding markdown entries under
//! `<category-dir>/<kind>/...` plus a `.context-vault` marker file. All paths
//! handed to the filesystem go through [`safe_join`] first; nothing outside
//! the vault root is ever read or written.

use std::path::{Component, Path, PathBuf};

use crate::VaultError;

/// Marker file identifying a directory as a vault.
pub const MARKER_FILE: &str = ".context-vault";

/// Directory names excluded from reindex walks (alongside `_`-prefixed ones).
pub const EXCLUDED_DIRS: &[&str] = &["projects", "_archive"];

/// File names that are never treated as entries.
pub const EXCLUDED_FILES: &[&str] = &["README.md", "context.md", "memory.md"];

/// Join `relative` beneath `base`, rejecting any escape.
///
/// `..`, absolute re-roots, and drive prefixes all fail with `PATH_ESCAPE`
/// before any I/O happens. `base` is expected to be canonical (see
/// [`canonical_root`]).
pub fn safe_join(base: &Path, relative: &str) -> Result<PathBuf, VaultError> {
    let mut out = base.to_path_buf();
    for comp in Path::new(relative).components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(VaultError::PathEscape(relative.to_string()));
            }
        }
    }
    if out == base || out.starts_with(base) {
        Ok(out)
    } else {
        Err(VaultError::PathEscape(relative.to_string()))
    }
}

/// Canonicalize a vault root for use as a `safe_join` base.
pub fn canonical_root(root: &Path) -> Result<PathBuf, VaultError> {
    Ok(dunce::canonicalize(root)?)
}

/// True when `root` carries the vault marker.
pub fn is_vault(root: &Path) -> bool {
    root.join(MARKER_FILE).is_file()
}

/// Require an existing vault, for operations that must not auto-create one.
pub fn require_vault(root: &Path) -> Result<PathBuf, VaultError> {
    if !is_vault(root) {
        return Err(VaultError::VaultNotFound(root.to_path_buf()));
    }
    canonical_root(root)
}

/// Initialize a vault: marker file plus the three category directories.
///
/// Idempotent; an existing vault is left untouched.
pub fn init_vault(root: &Path) -> Result<(), VaultError> {
    std::fs::create_dir_all(root)?;
    for cat in crate::kind::Category::all() {
        std::fs::create_dir_all(root.join(cat.dir()))?;
    }
    let marker = root.join(MARKER_FILE);
    if !marker.exists() {
        let payload = serde_json::json!({
            "version": 1,
            "created": chrono::Utc::now().to_rfc3339(),
        });
        std::fs::write(&marker, serde_json::to_string_pretty(&payload)?)?;
        tracing::info!(root = %root.display(), "Vault initialized");
    }
    Ok(())
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Unknown(e.to_string())
    }
}

/// True when a directory name is skipped by reindex walks.
pub fn is_excluded_dir(name: &str) -> bool {
    name.starts_with('_') || EXCLUDED_DIRS.contains(&name)
}

/// True when a file name is skipped by reindex walks.
pub fn is_excluded_file(name: &str) -> bool {
    EXCLUDED_FILES.contains(&name)
}
