//! # context-vault - Persistent Memory for AI Agents
//!
//! Stores structured notes ("entries") as portable markdown files on disk and
//! maintains a derived SQLite index for hybrid full-text + vector retrieval.
//!
//! ## Features
//!
//! - **Portable storage**: every entry is a markdown file with YAML
//!   frontmatter under a vault directory; the database is always rebuildable
//!   from disk
//! - **Hybrid retrieval**: FTS5 keyword search fused with embedding similarity
//!   (RRF), category-aware recency decay, MMR diversification, and
//!   near-duplicate suppression
//! - **Identity upserts**: entity entries (contacts, projects, tools) update
//!   in place via caller-provided identity keys
//! - **MCP tools**: save / search / list / delete / ingest / status over
//!   JSON-RPC on stdio
//!
//! ## Quick Start
//!
//! ```no_run
//! use context_vault::{Store, SaveRequest};
//! use context_vault::search::SearchOptions;
//!
//! # fn main() -> anyhow::Result<()> {
//! let vault_root = std::path::Path::new("/home/me/context-vault");
//! context_vault::vault::init_vault(vault_root)?;
//! let store = Store::open(std::path::Path::new("/home/me/.local/share/context-vault/index.db"))?;
//!
//! let entry = context_vault::capture::capture_and_index(
//!     &store,
//!     None, // no embedding provider: FTS-only until reindex
//!     vault_root,
//!     &SaveRequest {
//!         kind: "insight".into(),
//!         title: Some("SQLite is fast enough".into()),
//!         body: "Hybrid search over 1k entries returns in under 50ms.".into(),
//!         ..Default::default()
//!     },
//! )?;
//!
//! let hits = store.hybrid_search(None, "sqlite speed", &SearchOptions::default())?;
//! println!("{} results, first id {}", hits.len(), entry.id);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod embedder;
pub mod entry;
pub mod frontmatter;
pub mod id;
pub mod ingest;
pub mod kind;
pub mod mcp;
pub mod reindex;
pub mod search;
pub mod status;
pub mod store;
pub mod vault;

pub(crate) mod math;

pub use embedder::{Embedding, EmbeddingProvider, EMBEDDING_DIM};
pub use entry::{Entry, SaveRequest};
pub use id::{new_id, slug};
pub use kind::Category;
pub use reindex::ReindexReport;
pub use store::{Store, StoreError};
pub use vault::safe_join;

use std::path::PathBuf;

/// Unified error type for vault operations.
///
/// Every variant maps to a stable caller-visible code via [`VaultError::code`];
/// the MCP layer serializes these as `{isError, code, message}` results.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("invalid kind '{0}': must be lowercase, start with a letter, and contain only [a-z0-9_-]")]
    InvalidKind(String),
    #[error("body is required and must be non-empty")]
    BodyRequired,
    #[error("body is {0} bytes (max {max})", max = entry::MAX_BODY_BYTES)]
    BodyTooLarge(usize),
    #[error("too many tags: {0} (max {max})", max = entry::MAX_TAGS)]
    TagsTooMany(usize),
    #[error("tag exceeds {max} characters: '{0}'", max = entry::MAX_TAG_CHARS)]
    TagTooLong(String),
    #[error("title is {0} characters (max {max})", max = entry::MAX_TITLE_CHARS)]
    TitleTooLong(usize),
    #[error("meta serializes to {0} bytes (max {max})", max = entry::MAX_META_BYTES)]
    MetaTooLarge(usize),
    #[error("source exceeds {max} characters", max = entry::MAX_SOURCE_CHARS)]
    SourceTooLong,
    #[error("identity_key exceeds {max} characters", max = entry::MAX_IDENTITY_KEY_CHARS)]
    IdentityKeyTooLong,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("path escapes the vault root: {0}")]
    PathEscape(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no vault at {}: missing .context-vault marker. Run 'context-vault init' first.", .0.display())]
    VaultNotFound(PathBuf),
    #[error("indexing failed after capture; file rolled back: {0}")]
    IndexFailed(#[source] Box<StoreError>),
    #[error("operation timed out after {0}s")]
    Timeout(u64),
    #[error("embedding backend failed to load: {0}. Rebuild with the 'embeddings' feature enabled, or keep running FTS-only and reindex once a backend is available.")]
    NativeModuleFailed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Unknown(String),
}

impl VaultError {
    /// Stable machine-readable code for the tool protocol.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::InvalidKind(_) => "INVALID_KIND",
            VaultError::BodyRequired => "BODY_REQUIRED",
            VaultError::TagsTooMany(_) => "TAGS_TOO_MANY",
            VaultError::MetaTooLarge(_) => "META_TOO_LARGE",
            VaultError::TitleTooLong(_) => "TITLE_TOO_LONG",
            VaultError::BodyTooLarge(_)
            | VaultError::TagTooLong(_)
            | VaultError::SourceTooLong
            | VaultError::IdentityKeyTooLong
            | VaultError::InvalidInput(_) => "INVALID_INPUT",
            VaultError::PathEscape(_) => "PATH_ESCAPE",
            VaultError::NotFound(_) => "NOT_FOUND",
            VaultError::VaultNotFound(_) => "VAULT_NOT_FOUND",
            VaultError::IndexFailed(_) => "INDEX_FAILED",
            VaultError::Timeout(_) => "TIMEOUT",
            VaultError::NativeModuleFailed(_) => "NATIVE_MODULE_FAILED",
            VaultError::Io(_) => "IO_ERROR",
            VaultError::Store(_) | VaultError::Unknown(_) => "UNKNOWN",
        }
    }
}
