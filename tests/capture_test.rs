//! Capture and lifecycle integration tests

mod common;

use common::{save_request, StubEmbedder, TestVault};
use context_vault::entry::{MAX_BODY_BYTES, MAX_TAGS};
use context_vault::VaultError;

#[test]
fn test_save_then_get_by_id_returns_all_fields() {
    let vault = TestVault::new();
    let mut req = save_request("insight", Some("Hybrid search wins"), "FTS alone misses paraphrases.");
    req.tags = vec!["search".into(), "retrieval".into()];
    req.meta
        .insert("confidence".into(), serde_json::json!(0.8));
    req.source = Some("unit-test".into());

    let saved = vault.save(&req);
    let loaded = vault.store.get_by_id(&saved.id).unwrap().expect("entry must exist");

    assert_eq!(loaded.id, saved.id);
    assert_eq!(loaded.kind, "insight");
    assert_eq!(loaded.category.as_str(), "knowledge");
    assert_eq!(loaded.title.as_deref(), Some("Hybrid search wins"));
    assert_eq!(loaded.body, "FTS alone misses paraphrases.");
    assert_eq!(loaded.tags, vec!["search", "retrieval"]);
    assert_eq!(loaded.meta.get("confidence").unwrap(), &serde_json::json!(0.8));
    assert_eq!(loaded.source, "unit-test");
    assert_eq!(loaded.file_path, saved.file_path);
    assert_eq!(loaded.created_at, saved.created_at);
    assert_eq!(loaded.hit_count, 0);
}

#[test]
fn test_file_exists_with_frontmatter() {
    let vault = TestVault::new();
    let entry = vault.save(&save_request("decision", Some("Use SQLite"), "One file, no server."));

    let content = std::fs::read_to_string(&entry.file_path).unwrap();
    assert!(content.starts_with("---\n"));
    assert!(content.contains(&format!("id: {}", entry.id)));
    assert!(content.contains("# Use SQLite"));

    let (fields, _) = context_vault::frontmatter::decode(&content).unwrap();
    assert!(fields.len() >= 4);
}

#[test]
fn test_identity_key_upsert_in_place() {
    let vault = TestVault::new();

    let mut first = save_request("contact", Some("Alice v1"), "Works on infra.");
    first.identity_key = Some("alice@example.com".into());
    let v1 = vault.save(&first);

    let mut second = save_request("contact", Some("Alice v2"), "Now works on ML.");
    second.identity_key = Some("alice@example.com".into());
    let v2 = vault.save(&second);

    // Same row: id and created_at survive, updated_at moves forward
    assert_eq!(v2.id, v1.id);
    assert_eq!(v2.created_at, v1.created_at);
    assert!(v2.updated_at > v2.created_at);

    // Exactly one row for the contact
    assert_eq!(vault.store.entry_count().unwrap(), 1);

    // Old file removed, new file present
    assert!(!v1.file_path.exists(), "replaced file must be deleted");
    assert!(v2.file_path.exists());

    let loaded = vault.store.get_by_id(&v1.id).unwrap().unwrap();
    assert_eq!(loaded.title.as_deref(), Some("Alice v2"));
}

#[test]
fn test_identity_key_scoped_by_kind() {
    let vault = TestVault::new();

    let mut a = save_request("contact", Some("A"), "a");
    a.identity_key = Some("shared-key".into());
    let mut b = save_request("tool", Some("B"), "b");
    b.identity_key = Some("shared-key".into());

    let ea = vault.save(&a);
    let eb = vault.save(&b);
    assert_ne!(ea.id, eb.id);
    assert_eq!(vault.store.entry_count().unwrap(), 2);
}

#[test]
fn test_delete_removes_row_and_file() {
    let vault = TestVault::new();
    let entry = vault.save(&save_request("note", None, "temp"));
    assert!(entry.file_path.exists());

    context_vault::capture::delete_entry(&vault.store, &entry.id).unwrap();

    assert!(vault.store.get_by_id(&entry.id).unwrap().is_none());
    assert!(!entry.file_path.exists());
    assert_eq!(vault.store.vector_count().unwrap(), 0);
}

#[test]
fn test_delete_unknown_id_is_not_found() {
    let vault = TestVault::new();
    let err = context_vault::capture::delete_entry(&vault.store, "01ARZ3NDEKTSV4RRFFQ69G5FAV")
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn test_prune_removes_expired_rows_and_files() {
    let vault = TestVault::new();

    let mut expired = save_request("session", None, "old session");
    expired.expires_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
    let dead = vault.save(&expired);

    let mut alive = save_request("session", None, "current session");
    alive.expires_at = Some(chrono::Utc::now() + chrono::Duration::days(7));
    let live = vault.save(&alive);

    let count = context_vault::capture::prune(&vault.store).unwrap();
    assert_eq!(count, 1);
    assert!(!dead.file_path.exists());
    assert!(live.file_path.exists());
    assert!(vault.store.get_by_id(&dead.id).unwrap().is_none());
    assert!(vault.store.get_by_id(&live.id).unwrap().is_some());
}

#[test]
fn test_supersede_with_creates_and_links() {
    let vault = TestVault::new();
    let old = vault.save(&save_request("decision", Some("Old plan"), "Do X."));
    let new = context_vault::capture::supersede_with(
        &vault.store,
        Some(&StubEmbedder),
        vault.root(),
        &old.id,
        &save_request("decision", Some("New plan"), "Do Y instead."),
    )
    .unwrap();

    let old_row = vault.store.get_by_id(&old.id).unwrap().unwrap();
    assert_eq!(old_row.superseded_by.as_deref(), Some(new.id.as_str()));

    // The old file carries the pointer too
    let content = std::fs::read_to_string(&old.file_path).unwrap();
    assert!(content.contains(&format!("superseded: {}", new.id)));
}

#[test]
fn test_boundary_limits_enforced() {
    let vault = TestVault::new();

    // body at limit ok, one over rejected
    let at = save_request("note", None, &"x".repeat(MAX_BODY_BYTES));
    assert!(context_vault::capture::write_entry(vault.root(), &at).is_ok());
    let over = save_request("note", None, &"x".repeat(MAX_BODY_BYTES + 1));
    assert_eq!(
        context_vault::capture::write_entry(vault.root(), &over)
            .unwrap_err()
            .code(),
        "INVALID_INPUT"
    );

    // 20 tags ok, 21 rejected
    let mut tags_ok = save_request("note", None, "b");
    tags_ok.tags = (0..MAX_TAGS).map(|i| format!("t{i}")).collect();
    assert!(context_vault::capture::write_entry(vault.root(), &tags_ok).is_ok());
    let mut tags_over = tags_ok.clone();
    tags_over.tags.push("extra".into());
    assert_eq!(
        context_vault::capture::write_entry(vault.root(), &tags_over)
            .unwrap_err()
            .code(),
        "TAGS_TOO_MANY"
    );

    // kind grammar
    for bad in ["", "1abc", "Has-Upper"] {
        let req = save_request(bad, None, "b");
        assert!(matches!(
            context_vault::capture::write_entry(vault.root(), &req),
            Err(VaultError::InvalidKind(_))
        ));
    }

    // traversal
    let mut escape = save_request("note", None, "b");
    escape.folder = Some("../../etc".into());
    assert_eq!(
        context_vault::capture::write_entry(vault.root(), &escape)
            .unwrap_err()
            .code(),
        "PATH_ESCAPE"
    );
}

#[test]
fn test_fts_only_capture_still_searchable() {
    let vault = TestVault::new();
    vault.save_fts_only(&save_request(
        "insight",
        Some("Tokio runtimes"),
        "Own the runtime, block_on at the edges.",
    ));
    assert_eq!(vault.store.vector_count().unwrap(), 0);

    let hits = vault
        .store
        .hybrid_search(None, "tokio runtime", &Default::default())
        .unwrap();
    assert_eq!(hits.len(), 1);
}
