//! Reindex integration tests: disk is the source of truth

mod common;

use common::{save_request, StubEmbedder, TestVault};
use context_vault::search::SearchOptions;
use context_vault::Store;

const DISK_ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

fn disk_entry_content(title: &str, body: &str) -> String {
    format!(
        "---\nid: {DISK_ID}\ntitle: {title}\ntags: [\"disk\"]\nsource: manual\ncreated: 2026-07-01T00:00:00.000000Z\n---\n# {title}\n\n{body}\n"
    )
}

#[test]
fn test_reindex_reconciles_disk_edits() {
    let vault = TestVault::new();
    let dir = vault.root().join("knowledge/insight");
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("disk-entry-q69g5fav.md");

    // Add: file appears on disk
    std::fs::write(&file, disk_entry_content("Disk entry", "Written straight to disk.")).unwrap();
    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 0);

    let hits = vault
        .store
        .hybrid_search(Some(&StubEmbedder), "written straight to disk", &SearchOptions::default())
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.id, DISK_ID);

    // Update: body edited on disk
    std::fs::write(&file, disk_entry_content("Disk entry", "Edited on disk afterwards.")).unwrap();
    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.added, 0);
    let loaded = vault.store.get_by_id(DISK_ID).unwrap().unwrap();
    assert_eq!(loaded.body, "Edited on disk afterwards.");

    // Unchanged: nothing touched
    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.updated, 0);

    // Remove: file deleted
    std::fs::remove_file(&file).unwrap();
    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.removed, 1);
    assert!(vault.store.get_by_id(DISK_ID).unwrap().is_none());
    assert_eq!(vault.store.vector_count().unwrap(), 0);
}

#[test]
fn test_reindex_derives_folder_from_disk_layout() {
    let vault = TestVault::new();
    let dir = vault.root().join("knowledge/note/work/acme");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("nested-q69g5fav.md"),
        disk_entry_content("Nested", "Lives in a subfolder."),
    )
    .unwrap();

    vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();

    let loaded = vault.store.get_by_id(DISK_ID).unwrap().unwrap();
    assert_eq!(
        loaded.meta.get("folder").and_then(|v| v.as_str()),
        Some("work/acme")
    );
}

#[test]
fn test_reindex_skips_excluded_dirs_and_files() {
    let vault = TestVault::new();

    for (dir, file) in [
        ("knowledge/_archive", "archived-q69g5fav.md"),
        ("knowledge/projects", "project-q69g5fav.md"),
        ("knowledge/_drafts", "draft-q69g5fav.md"),
    ] {
        let path = vault.root().join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(file), disk_entry_content("Skipped", "Not an entry dir.")).unwrap();
    }
    // Non-entry file names inside a real kind dir
    let insight = vault.root().join("knowledge/insight");
    std::fs::create_dir_all(&insight).unwrap();
    std::fs::write(insight.join("README.md"), "# readme").unwrap();
    std::fs::write(insight.join("context.md"), "notes").unwrap();
    std::fs::write(insight.join("not-markdown.txt"), "txt").unwrap();

    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(vault.store.entry_count().unwrap(), 0);
}

#[test]
fn test_reindex_skips_files_without_frontmatter() {
    let vault = TestVault::new();
    let dir = vault.root().join("knowledge/insight");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("plain.md"), "just some markdown, no frontmatter\n").unwrap();
    std::fs::write(dir.join("no-id.md"), "---\ntitle: x\n---\nbody\n").unwrap();

    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.added, 0);
}

#[test]
fn test_add_only_mode_skips_known_and_keeps_orphans() {
    let vault = TestVault::new();
    let entry = vault.save(&save_request("insight", Some("Kept"), "Indexed through capture."));

    // Edit the captured file on disk; add-only must NOT pick up the edit
    let edited = std::fs::read_to_string(&entry.file_path)
        .unwrap()
        .replace("Indexed through capture.", "Edited behind the index.");
    std::fs::write(&entry.file_path, edited).unwrap();

    // Remove nothing, add nothing: a DB row whose file is gone also survives
    let orphan = vault.save(&save_request("note", None, "row without file soon"));
    std::fs::remove_file(&orphan.file_path).unwrap();

    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), false).unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.updated, 0);
    assert_eq!(report.removed, 0, "add-only mode never removes");

    let loaded = vault.store.get_by_id(&entry.id).unwrap().unwrap();
    assert_eq!(loaded.body, "Indexed through capture.");
    assert!(vault.store.get_by_id(&orphan.id).unwrap().is_some());

    // Full sync afterwards applies both the edit and the removal
    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.removed, 1);
    let loaded = vault.store.get_by_id(&entry.id).unwrap().unwrap();
    assert_eq!(loaded.body, "Edited behind the index.");
}

#[test]
fn test_capture_then_reindex_is_unchanged() {
    let vault = TestVault::new();
    vault.save(&save_request("insight", Some("Round trip"), "Captured normally."));
    let mut req = save_request("session", None, "An event entry.");
    req.tags = vec!["meeting".into()];
    vault.save(&req);

    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.unchanged, 2, "capture output must round-trip through reindex");
    assert_eq!(report.updated, 0);
    assert_eq!(report.added, 0);
}

#[test]
fn test_supersession_survives_full_reindex() {
    let vault = TestVault::new();
    let old = vault.save(&save_request("decision", Some("Old plan"), "Take path A."));
    let new = vault.save(&save_request("decision", Some("New plan"), "Take path B."));
    vault.store.supersede(&old.id, &new.id).unwrap();

    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.removed, 0);

    // The pointer is database-owned: reconciling unchanged files must not
    // clear it
    let row = vault.store.get_by_id(&old.id).unwrap().unwrap();
    assert_eq!(row.superseded_by.as_deref(), Some(new.id.as_str()));

    let hits = vault
        .store
        .hybrid_search(Some(&StubEmbedder), "take path", &SearchOptions::default())
        .unwrap();
    assert!(hits.iter().any(|h| h.entry.id == new.id));
    assert!(hits.iter().all(|h| h.entry.id != old.id));
}

#[test]
fn test_superseded_file_edit_stays_hidden() {
    let vault = TestVault::new();
    let old = vault.save(&save_request("decision", Some("Old plan"), "Take path A."));
    let new = context_vault::capture::supersede_with(
        &vault.store,
        Some(&StubEmbedder),
        vault.root(),
        &old.id,
        &save_request("decision", Some("New plan"), "Take path B."),
    )
    .unwrap();

    // Edit the superseded entry's body directly on disk
    let edited = std::fs::read_to_string(&old.file_path)
        .unwrap()
        .replace("Take path A.", "Take path A, amended.");
    std::fs::write(&old.file_path, edited).unwrap();

    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.updated, 1);

    // The content edit lands, the supersession does not reset
    let row = vault.store.get_by_id(&old.id).unwrap().unwrap();
    assert_eq!(row.body, "Take path A, amended.");
    assert_eq!(row.superseded_by.as_deref(), Some(new.id.as_str()));

    let hits = vault
        .store
        .hybrid_search(Some(&StubEmbedder), "take path", &SearchOptions::default())
        .unwrap();
    assert!(hits.iter().all(|h| h.entry.id != old.id));
}

#[test]
fn test_supersession_survives_db_rebuild() {
    let vault = TestVault::new();
    let old = vault.save(&save_request("decision", Some("Old plan"), "Take path A."));
    let new = context_vault::capture::supersede_with(
        &vault.store,
        Some(&StubEmbedder),
        vault.root(),
        &old.id,
        &save_request("decision", Some("New plan"), "Take path B."),
    )
    .unwrap();

    // Rebuild into a brand-new database from the files alone
    let rebuilt = Store::open(&vault.root().join("rebuilt.db")).unwrap();
    let report = rebuilt.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.added, 2);

    let row = rebuilt.get_by_id(&old.id).unwrap().unwrap();
    assert_eq!(
        row.superseded_by.as_deref(),
        Some(new.id.as_str()),
        "frontmatter must carry supersession through a rebuild"
    );

    let hits = rebuilt
        .hybrid_search(Some(&StubEmbedder), "take path", &SearchOptions::default())
        .unwrap();
    assert!(hits.iter().any(|h| h.entry.id == new.id));
    assert!(hits.iter().all(|h| h.entry.id != old.id));
}

#[test]
fn test_reindex_without_provider_backfills_later() {
    let vault = TestVault::new();
    let dir = vault.root().join("knowledge/insight");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("disk-entry-q69g5fav.md"),
        disk_entry_content("Disk entry", "No vectors yet."),
    )
    .unwrap();

    let report = vault.store.reindex(vault.root(), None, true).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(vault.store.vector_count().unwrap(), 0);

    // Provider available on the next full sync: the row is unchanged but its
    // missing vector is backfilled
    let report = vault.store.reindex(vault.root(), Some(&StubEmbedder), true).unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(vault.store.vector_count().unwrap(), 1);
}
