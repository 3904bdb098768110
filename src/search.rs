//! Hybrid retrieval pipeline
//!
//! FTS and vector rankings are fused with Reciprocal Rank Fusion, boosted by
//! recency (event entries decay) and access frequency, diversified with
//! Maximal Marginal Relevance, and near-duplicates are suppressed before
//! paging. Access tracking on the returned page is best-effort.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::embedder::EmbeddingProvider;
use crate::entry::{format_ts, Entry};
use crate::kind::Category;
use crate::math::{cosine_similarity, distance_to_similarity, jaccard_words};
use crate::store::helpers::{
    build_match_query, decode_entry_row, fts_tokens, is_fts_syntax_error, EntryWithRowid,
    ENTRY_COLUMNS,
};
use crate::store::{Store, StoreError};

/// FTS stage result cap.
const FTS_LIMIT: usize = 15;
/// Vector over-fetch budget: base, and with a kind filter in play.
const VEC_FETCH_BASE: usize = 15;
const VEC_FETCH_KIND: usize = 30;
/// Standard RRF constant.
const RRF_K: f32 = 60.0;
/// Weight of the hit-count frequency term.
const FREQUENCY_WEIGHT: f32 = 0.13;
/// MMR relevance/diversity balance.
const MMR_LAMBDA: f32 = 0.7;
/// Cosine similarity above which a later candidate is dropped as a near
/// duplicate of an already-emitted one.
const DEDUP_COSINE: f32 = 0.92;

/// Retrieval options. Unset filters match everything.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub kind: Option<String>,
    pub category: Option<Category>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub include_superseded: bool,
    /// Half-life-ish horizon for event decay, in days.
    pub decay_days: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            kind: None,
            category: None,
            since: None,
            until: None,
            user_id: None,
            team_id: None,
            limit: 20,
            offset: 0,
            include_superseded: false,
            decay_days: 30.0,
        }
    }
}

/// A ranked retrieval result.
#[derive(Debug)]
pub struct SearchHit {
    pub entry: Entry,
    pub score: f32,
}

struct Candidate {
    rowid: i64,
    entry: Entry,
    score: f32,
    vec_sim: Option<f32>,
}

/// SQL predicate fragment shared by the FTS join and vector hydration.
struct Predicates {
    clauses: Vec<String>,
    binds: Vec<String>,
}

fn visibility_predicates(opts: &SearchOptions, table: &str, now: &str) -> Predicates {
    let mut clauses = vec![format!(
        "({table}.expires_at IS NULL OR {table}.expires_at > ?)"
    )];
    let mut binds = vec![now.to_string()];

    if !opts.include_superseded {
        clauses.push(format!("{table}.superseded_by IS NULL"));
    }
    if let Some(kind) = &opts.kind {
        clauses.push(format!("{table}.kind = ?"));
        binds.push(kind.clone());
    }
    if let Some(category) = &opts.category {
        clauses.push(format!("{table}.category = ?"));
        binds.push(category.as_str().to_string());
    }
    if let Some(since) = &opts.since {
        clauses.push(format!("{table}.created_at >= ?"));
        binds.push(format_ts(since));
    }
    if let Some(until) = &opts.until {
        clauses.push(format!("{table}.created_at <= ?"));
        binds.push(format_ts(until));
    }
    if let Some(user_id) = &opts.user_id {
        clauses.push(format!("{table}.user_id = ?"));
        binds.push(user_id.clone());
    }
    if let Some(team_id) = &opts.team_id {
        clauses.push(format!("{table}.team_id = ?"));
        binds.push(team_id.clone());
    }

    Predicates { clauses, binds }
}

/// Reciprocal Rank Fusion over two rank-ordered id lists.
///
/// `score(id) = Σ 1 / (K + rank + 1)` with K = 60; ranks are 0-indexed here,
/// the `+ 1` converts to the paper's 1-indexed form.
pub(crate) fn rrf_fuse(fts_ids: &[String], vec_ids: &[String]) -> HashMap<String, f32> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for ids in [fts_ids, vec_ids] {
        for (rank, id) in ids.iter().enumerate() {
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
        }
    }
    scores
}

impl Store {
    /// Run the full hybrid retrieval pipeline.
    ///
    /// Degrades gracefully: no query tokens → pure vector; no vectors or no
    /// provider → pure FTS; both stages empty → empty result.
    pub fn hybrid_search(
        &self,
        provider: Option<&dyn EmbeddingProvider>,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let _span =
            tracing::info_span!("hybrid_search", limit = opts.limit, offset = opts.offset)
                .entered();

        let now = Utc::now();
        let now_str = format_ts(&now);

        // Stage 1: FTS
        let fts_ids = self.fts_stage(query, opts, &now_str)?;

        // Stage 2: vector
        let (vec_ids, vec_sims) = self.vector_stage(provider, query, opts, &now_str)?;

        if fts_ids.is_empty() && vec_ids.is_empty() {
            return Ok(vec![]);
        }

        // Stage 3: rank fusion
        let fused = rrf_fuse(&fts_ids, &vec_ids);

        // Hydrate candidates (rows may have vanished under concurrent writes)
        let candidate_ids: Vec<&str> = fused.keys().map(|s| s.as_str()).collect();
        let rows = self
            .rt
            .block_on(self.fetch_by_ids_async(&candidate_ids))?;

        let mut candidates: Vec<Candidate> = Vec::with_capacity(rows.len());
        for (id, fused_score) in &fused {
            let Some(EntryWithRowid { rowid, entry }) = rows.get(id).cloned() else {
                continue;
            };
            // Stage 4: category-aware recency boost
            let recency = match entry.category {
                Category::Event => {
                    let age_days = (now - entry.created_at).num_seconds().max(0) as f32 / 86_400.0;
                    1.0 / (1.0 + age_days / opts.decay_days.max(f32::EPSILON))
                }
                Category::Knowledge | Category::Entity => 1.0,
            };
            candidates.push(Candidate {
                rowid,
                entry,
                score: fused_score * recency,
                vec_sim: vec_sims.get(id).copied(),
            });
        }

        // Stage 5: frequency signal, normalized over this candidate set
        let max_hits = candidates.iter().map(|c| c.entry.hit_count).max().unwrap_or(0);
        if max_hits > 0 {
            let denom = (1.0 + max_hits as f32).ln();
            for c in &mut candidates {
                c.score += FREQUENCY_WEIGHT * (1.0 + c.entry.hit_count as f32).ln() / denom;
            }
        }

        // Stage 6: candidate ordering
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        // Stage 7: MMR diversification
        let rowids: Vec<i64> = candidates.iter().map(|c| c.rowid).collect();
        let embeddings = self.embeddings_for_rowids(&rowids).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Embedding fetch for MMR failed, falling back to text similarity");
            HashMap::new()
        });
        let take = opts.offset + opts.limit;
        let order = mmr_select(&candidates, &embeddings, take);

        // Stage 8: near-duplicate suppression (embeddings-only; a pair with a
        // missing embedding is never suppressed)
        let suppress = !embeddings.is_empty() && candidates.len() > opts.limit;
        let mut emitted: Vec<usize> = Vec::with_capacity(order.len());
        for idx in order {
            if suppress {
                let dup = emitted.iter().any(|&prev| {
                    match (
                        embeddings.get(&candidates[prev].rowid),
                        embeddings.get(&candidates[idx].rowid),
                    ) {
                        (Some(a), Some(b)) => {
                            cosine_similarity(a, b).map(|s| s > DEDUP_COSINE).unwrap_or(false)
                        }
                        _ => false,
                    }
                });
                if dup {
                    continue;
                }
            }
            emitted.push(idx);
        }

        // Stage 9: paging
        let page: Vec<SearchHit> = emitted
            .into_iter()
            .skip(opts.offset)
            .take(opts.limit)
            .map(|idx| SearchHit {
                score: candidates[idx].score,
                entry: candidates[idx].entry.clone(),
            })
            .collect();

        // Stage 10: best-effort access tracking
        let returned_ids: Vec<String> = page.iter().map(|h| h.entry.id.clone()).collect();
        self.record_access(&returned_ids);

        tracing::debug!(
            fts = fts_ids.len(),
            vector = vec_ids.len(),
            returned = page.len(),
            "Hybrid search completed"
        );

        Ok(page)
    }

    fn fts_stage(
        &self,
        query: &str,
        opts: &SearchOptions,
        now: &str,
    ) -> Result<Vec<String>, StoreError> {
        let tokens = fts_tokens(query);
        let Some(match_query) = build_match_query(&tokens) else {
            return Ok(vec![]);
        };

        let preds = visibility_predicates(opts, "vault", now);
        let sql = format!(
            "SELECT vault.id FROM vault_fts
             JOIN vault ON vault.rowid = vault_fts.rowid
             WHERE vault_fts MATCH ? AND {}
             ORDER BY rank LIMIT {}",
            preds.clauses.join(" AND "),
            FTS_LIMIT
        );

        let result = self.rt.block_on(async {
            let mut q = sqlx::query_as::<_, (String,)>(&sql).bind(&match_query);
            for bind in &preds.binds {
                q = q.bind(bind);
            }
            q.fetch_all(&self.pool).await
        });

        match result {
            Ok(rows) => Ok(rows.into_iter().map(|(id,)| id).collect()),
            Err(e) if is_fts_syntax_error(&e) => {
                tracing::debug!(query = %match_query, "Malformed MATCH query, empty FTS stage");
                Ok(vec![])
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns (ids in distance order, id → similarity).
    fn vector_stage(
        &self,
        provider: Option<&dyn EmbeddingProvider>,
        query: &str,
        opts: &SearchOptions,
        now: &str,
    ) -> Result<(Vec<String>, HashMap<String, f32>), StoreError> {
        let Some(provider) = provider else {
            return Ok((vec![], HashMap::new()));
        };
        if self.vector_count()? == 0 {
            return Ok((vec![], HashMap::new()));
        }

        let query_embedding = match provider.embed(query) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed, skipping vector stage");
                return Ok((vec![], HashMap::new()));
            }
        };

        let mut over_fetch = if opts.kind.is_some() {
            VEC_FETCH_KIND
        } else {
            VEC_FETCH_BASE
        };
        if opts.user_id.is_some() || opts.team_id.is_some() {
            over_fetch *= 2;
        }

        let nearest = self.nearest_vectors(query_embedding.as_slice(), over_fetch)?;
        if nearest.is_empty() {
            return Ok((vec![], HashMap::new()));
        }

        // Batch-hydrate candidates, applying the same predicate filters
        let preds = visibility_predicates(opts, "vault", now);
        let placeholders: Vec<&str> = nearest.iter().map(|_| "?").collect();
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM vault WHERE rowid IN ({}) AND {}",
            placeholders.join(","),
            preds.clauses.join(" AND ")
        );

        let rows = self.rt.block_on(async {
            let mut q = sqlx::query(&sql);
            for (rowid, _) in &nearest {
                q = q.bind(rowid);
            }
            for bind in &preds.binds {
                q = q.bind(bind);
            }
            q.fetch_all(&self.pool).await
        })?;

        let by_rowid: HashMap<i64, String> = rows
            .iter()
            .filter_map(|row| decode_entry_row(row).ok())
            .map(|e| (e.rowid, e.entry.id))
            .collect();

        let mut ids = Vec::new();
        let mut sims = HashMap::new();
        for (rowid, dist) in &nearest {
            if let Some(id) = by_rowid.get(rowid) {
                ids.push(id.clone());
                sims.insert(id.clone(), distance_to_similarity(*dist));
            }
        }
        Ok((ids, sims))
    }
}

/// Greedy MMR selection: `λ·rel − (1−λ)·max_sim_to_selected`, relevance from
/// vector similarity when known, else the fused score.
fn mmr_select(
    candidates: &[Candidate],
    embeddings: &HashMap<i64, Vec<f32>>,
    take: usize,
) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::with_capacity(take.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < take && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let rel = candidates[idx].vec_sim.unwrap_or(candidates[idx].score);
            let max_sim = selected
                .iter()
                .map(|&sel| pair_similarity(&candidates[idx], &candidates[sel], embeddings))
                .fold(0.0f32, f32::max);
            let mmr = MMR_LAMBDA * rel - (1.0 - MMR_LAMBDA) * max_sim;
            if mmr > best_score {
                best_score = mmr;
                best_pos = pos;
            }
        }
        selected.push(remaining.remove(best_pos));
    }
    selected
}

/// Pairwise similarity: embedding dot product when both vectors are stored,
/// otherwise Jaccard over the lowercased words of `title + " " + body`.
fn pair_similarity(
    a: &Candidate,
    b: &Candidate,
    embeddings: &HashMap<i64, Vec<f32>>,
) -> f32 {
    if let (Some(ea), Some(eb)) = (embeddings.get(&a.rowid), embeddings.get(&b.rowid)) {
        if let Some(sim) = cosine_similarity(ea, eb) {
            return sim;
        }
    }
    jaccard_words(&candidate_text(a), &candidate_text(b))
}

fn candidate_text(c: &Candidate) -> String {
    match &c.entry.title {
        Some(title) => format!("{} {}", title, c.entry.body),
        None => c.entry.body.clone(),
    }
}
