//! Vector and set similarity primitives
//!
//! Shared by the vector index scan, MMR diversification, and duplicate
//! suppression.

use crate::EMBEDDING_DIM;

/// Dot product of two embeddings (= cosine similarity for L2-normalized
/// vectors). SIMD-accelerated where available.
///
/// Returns `None` on length mismatch or unexpected dimensions so callers can
/// skip corrupt rows instead of panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.len() != EMBEDDING_DIM {
        return None;
    }
    use simsimd::SpatialSimilarity;
    let score = f32::dot(a, b).unwrap_or_else(|| {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| (x as f64) * (y as f64))
            .sum::<f64>()
    }) as f32;
    score.is_finite().then_some(score)
}

/// Euclidean (L2) distance between two unit vectors; range [0, 2].
pub fn l2_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.len() != EMBEDDING_DIM {
        return None;
    }
    use simsimd::SpatialSimilarity;
    let sq = f32::sqeuclidean(a, b).unwrap_or_else(|| {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| {
                let d = (x as f64) - (y as f64);
                d * d
            })
            .sum::<f64>()
    }) as f32;
    sq.is_finite().then(|| sq.max(0.0).sqrt())
}

/// Map an L2 distance between unit vectors to a [0, 1] similarity.
pub fn distance_to_similarity(d: f32) -> f32 {
    (1.0 - d / 2.0).max(0.0)
}

/// Jaccard similarity over lowercased word sets.
///
/// Fallback pairwise similarity when one side has no stored embedding.
pub fn jaccard_words(a: &str, b: &str) -> f32 {
    let set_a: std::collections::HashSet<String> = a
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let set_b: std::collections::HashSet<String> = b
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f32;
    let union = set_a.union(&set_b).count() as f32;
    intersection / union
}
