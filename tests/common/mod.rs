//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::{StubEmbedder, TestVault};
//! ```
#![allow(dead_code)]

use std::hash::{Hash, Hasher};
use std::path::Path;

use chrono::{DateTime, Utc};
use context_vault::embedder::{EmbedderError, Embedding, EmbeddingProvider};
use context_vault::entry::SaveRequest;
use context_vault::{Entry, Store, EMBEDDING_DIM};
use tempfile::TempDir;

/// Vault directory plus an open store, cleaned up on drop.
pub struct TestVault {
    pub store: Store,
    dir: TempDir,
}

impl TestVault {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        context_vault::vault::init_vault(dir.path()).expect("Failed to init vault");
        let store = Store::open(&dir.path().join("index.db")).expect("Failed to open store");
        Self { store, dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Capture an entry through the normal write-through path.
    pub fn save(&self, request: &SaveRequest) -> Entry {
        context_vault::capture::capture_and_index(
            &self.store,
            Some(&StubEmbedder),
            self.root(),
            request,
        )
        .expect("capture failed")
    }

    /// Capture without any embedding provider (FTS-only rows).
    pub fn save_fts_only(&self, request: &SaveRequest) -> Entry {
        context_vault::capture::capture_and_index(&self.store, None, self.root(), request)
            .expect("capture failed")
    }
}

/// Build a save request with the common fields.
pub fn save_request(kind: &str, title: Option<&str>, body: &str) -> SaveRequest {
    SaveRequest {
        kind: kind.into(),
        title: title.map(|t| t.to_string()),
        body: body.into(),
        ..Default::default()
    }
}

/// Deterministic offline embedding backend.
///
/// Hashes each lowercased alphanumeric word onto an axis of the embedding
/// space and L2-normalizes, so texts sharing words get high cosine
/// similarity and texts differing only in punctuation embed identically.
pub struct StubEmbedder;

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbedderError> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        let mut any = false;
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            word.hash(&mut hasher);
            let idx = (hasher.finish() % EMBEDDING_DIM as u64) as usize;
            v[idx] += 1.0;
            any = true;
        }
        if !any {
            v[0] = 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        Ok(Embedding::new(v))
    }

    fn name(&self) -> &'static str {
        "stub-hash-embedder"
    }
}

/// An entry value for direct `index_entry` insertion (bypassing capture),
/// letting tests control timestamps.
pub fn entry_at(
    vault_root: &Path,
    kind: &str,
    title: Option<&str>,
    body: &str,
    created_at: DateTime<Utc>,
) -> Entry {
    let id = context_vault::new_id();
    let category = context_vault::kind::category_for(kind);
    let file_path = vault_root
        .join(category.dir())
        .join(kind)
        .join(format!("{}-{}.md", context_vault::slug(body), &id[18..].to_lowercase()));
    Entry {
        id,
        kind: kind.into(),
        category,
        title: title.map(|t| t.to_string()),
        body: body.into(),
        tags: vec![],
        meta: Default::default(),
        source: "test".into(),
        file_path,
        identity_key: None,
        expires_at: None,
        superseded_by: None,
        created_at,
        updated_at: created_at,
        hit_count: 0,
        last_accessed_at: None,
        user_id: None,
        team_id: None,
    }
}
