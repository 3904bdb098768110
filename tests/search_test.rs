//! Hybrid retrieval integration tests, including the end-to-end scenarios

mod common;

use common::{entry_at, save_request, StubEmbedder, TestVault};
use context_vault::search::SearchOptions;

fn search(vault: &TestVault, query: &str, opts: &SearchOptions) -> Vec<context_vault::search::SearchHit> {
    vault
        .store
        .hybrid_search(Some(&StubEmbedder), query, opts)
        .unwrap()
}

#[test]
fn test_cold_start_save_then_search() {
    let vault = TestVault::new();
    let mut req = save_request(
        "insight",
        Some("SQLite is fast enough for local search"),
        "Tested with 1,000 entries — hybrid search returns results in under 50ms.",
    );
    req.tags = vec!["performance".into(), "sqlite".into(), "architecture".into()];
    let saved = vault.save(&req);

    let hits = search(&vault, "sqlite performance local search", &SearchOptions::default());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.id, saved.id);
    assert!(hits[0].score > 0.0);
}

#[test]
fn test_recency_ranks_newer_event_above_older() {
    let vault = TestVault::new();
    let now = chrono::Utc::now();
    let body = "standup notes about the retrieval pipeline deadline";

    let old = entry_at(vault.root(), "session", None, body, now - chrono::Duration::days(60));
    let new = entry_at(vault.root(), "session", None, body, now);
    // Distinct file paths despite the same body: ids differ
    vault.store.index_entry(&old, Some(&StubEmbedder)).unwrap();
    vault.store.index_entry(&new, Some(&StubEmbedder)).unwrap();

    let hits = search(&vault, "retrieval pipeline deadline", &SearchOptions::default());
    assert_eq!(hits.len(), 2, "limit 20 keeps both; dedup only kicks in past the page limit");
    assert_eq!(hits[0].entry.id, new.id, "newer event must rank first");
    assert!(hits[0].score > hits[1].score, "strictly higher score for the newer event");
}

#[test]
fn test_knowledge_entries_do_not_decay() {
    let vault = TestVault::new();
    let now = chrono::Utc::now();
    let body = "postgres tuning checklist for analytics workloads";

    let old = entry_at(vault.root(), "insight", None, body, now - chrono::Duration::days(365));
    vault.store.index_entry(&old, Some(&StubEmbedder)).unwrap();

    let hits = search(&vault, "postgres tuning checklist", &SearchOptions::default());
    assert_eq!(hits.len(), 1);
    // A year-old knowledge entry still scores like a fresh RRF hit
    assert!(hits[0].score > 0.015);
}

#[test]
fn test_near_duplicate_suppression() {
    let vault = TestVault::new();
    vault.save(&save_request(
        "note",
        None,
        "The deploy pipeline needs a manual approval step",
    ));
    vault.save(&save_request(
        "note",
        None,
        "The deploy pipeline needs a manual approval step.",
    ));
    vault.save(&save_request("note", None, "Unrelated grocery list items"));

    // Candidate set (3) exceeds the limit (2): the trailing-period twin is
    // suppressed and the distinct entry fills the page.
    let hits = search(
        &vault,
        "deploy pipeline approval",
        &SearchOptions {
            limit: 2,
            ..Default::default()
        },
    );
    let bodies: Vec<&str> = hits.iter().map(|h| h.entry.body.as_str()).collect();
    assert_eq!(
        bodies
            .iter()
            .filter(|b| b.starts_with("The deploy pipeline"))
            .count(),
        1,
        "near-duplicates must collapse to the higher-scored one, got {bodies:?}"
    );
}

#[test]
fn test_duplicates_not_suppressed_within_small_result_set() {
    let vault = TestVault::new();
    vault.save(&save_request("note", None, "identical twin body"));
    vault.save(&save_request("note", None, "identical twin body."));

    // Candidate set (2) does not exceed the default limit (20): both stay
    let hits = search(&vault, "identical twin body", &SearchOptions::default());
    assert_eq!(hits.len(), 2);
}

#[test]
fn test_fts_metacharacters_do_not_error() {
    let vault = TestVault::new();
    vault.save(&save_request("note", None, "foobar baseline text"));

    for query in ["foo*bar\"(", "\"\"\"", "NEAR(", "a:b^c~{d}", "***"] {
        let hits = vault
            .store
            .hybrid_search(Some(&StubEmbedder), query, &SearchOptions::default())
            .unwrap();
        // No error; possibly empty or vector-only results
        let _ = hits;
    }
}

#[test]
fn test_query_with_no_tokens_uses_pure_vector() {
    let vault = TestVault::new();
    vault.save(&save_request("note", None, "only vectors can find this"));

    // Every character is an FTS metachar: the token list is empty and
    // retrieval reduces to the vector stage alone
    let hits = vault
        .store
        .hybrid_search(Some(&StubEmbedder), "(::)", &SearchOptions::default())
        .unwrap();
    assert!(!hits.is_empty());
}

#[test]
fn test_superseded_hidden_unless_opted_in() {
    let vault = TestVault::new();
    let old = vault.save(&save_request("decision", None, "ship the monolith first"));
    let new = vault.save(&save_request("decision", None, "ship the monolith later"));
    vault.store.supersede(&old.id, &new.id).unwrap();

    let default_hits = search(&vault, "ship the monolith", &SearchOptions::default());
    assert!(default_hits.iter().all(|h| h.entry.id != old.id));

    let with_superseded = search(
        &vault,
        "ship the monolith",
        &SearchOptions {
            include_superseded: true,
            ..Default::default()
        },
    );
    assert!(with_superseded.iter().any(|h| h.entry.id == old.id));
}

#[test]
fn test_expired_entries_invisible() {
    let vault = TestVault::new();
    let mut req = save_request("session", None, "expired retro notes");
    req.expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(5));
    vault.save(&req);

    let hits = search(&vault, "expired retro notes", &SearchOptions::default());
    assert!(hits.is_empty());
}

#[test]
fn test_since_after_until_returns_empty() {
    let vault = TestVault::new();
    vault.save(&save_request("note", None, "window test entry"));

    let hits = search(
        &vault,
        "window test entry",
        &SearchOptions {
            since: Some(chrono::Utc::now()),
            until: Some(chrono::Utc::now() - chrono::Duration::days(1)),
            ..Default::default()
        },
    );
    assert!(hits.is_empty());
}

#[test]
fn test_kind_filter() {
    let vault = TestVault::new();
    vault.save(&save_request("insight", None, "shared keyword alpha"));
    vault.save(&save_request("session", None, "shared keyword alpha"));

    let hits = search(
        &vault,
        "shared keyword alpha",
        &SearchOptions {
            kind: Some("insight".into()),
            ..Default::default()
        },
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.kind, "insight");
}

#[test]
fn test_offset_paging() {
    let vault = TestVault::new();
    for i in 0..5 {
        vault.save(&save_request("note", None, &format!("paging entry number {i}")));
    }

    let page1 = search(
        &vault,
        "paging entry number",
        &SearchOptions {
            limit: 2,
            ..Default::default()
        },
    );
    let page2 = search(
        &vault,
        "paging entry number",
        &SearchOptions {
            limit: 2,
            offset: 2,
            ..Default::default()
        },
    );
    assert_eq!(page1.len(), 2);
    assert_eq!(page2.len(), 2);
    let ids1: Vec<_> = page1.iter().map(|h| &h.entry.id).collect();
    assert!(page2.iter().all(|h| !ids1.contains(&&h.entry.id)));
}

#[test]
fn test_access_tracking_after_search() {
    let vault = TestVault::new();
    let entry = vault.save(&save_request("note", None, "tracked search target"));

    let _ = search(&vault, "tracked search target", &SearchOptions::default());

    let loaded = vault.store.get_by_id(&entry.id).unwrap().unwrap();
    assert_eq!(loaded.hit_count, 1);
    assert!(loaded.last_accessed_at.is_some());
}

#[test]
fn test_frequency_boost_orders_popular_first() {
    let vault = TestVault::new();
    let a = vault.save(&save_request("note", None, "alpha shared topic words here"));
    let b = vault.save(&save_request("note", None, "beta shared topic words here"));

    // Simulate b being returned often
    for _ in 0..20 {
        vault.store.record_access(&[b.id.clone()]);
    }

    let hits = search(&vault, "shared topic words", &SearchOptions::default());
    assert_eq!(hits.len(), 2);
    let score_of = |id: &str| hits.iter().find(|h| h.entry.id == id).unwrap().score;
    assert!(
        score_of(&b.id) > score_of(&a.id),
        "frequently-accessed entry should score higher"
    );
}

#[test]
fn test_both_stages_empty_returns_empty() {
    let vault = TestVault::new();
    let hits = search(&vault, "anything at all", &SearchOptions::default());
    assert!(hits.is_empty());
}
