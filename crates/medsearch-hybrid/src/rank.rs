use std::cmp::Ordering;

use medsearch_core::types::{PredictionRecord, ScoredCandidate};

/// Keep candidates scoring at least `min_score`, best first, at most `top_k`.
///
/// The sort is stable, so equal scores stay in index order. A NaN score never
/// passes the threshold.
pub fn rank(candidates: Vec<ScoredCandidate<'_>>, min_score: f32, top_k: usize) -> Vec<PredictionRecord> {
    let mut kept: Vec<ScoredCandidate<'_>> = candidates.into_iter().filter(|c| c.final_score >= min_score).collect();
    // NaN is gone, so partial_cmp is total here; it also keeps -0.0 equal to 0.0.
    kept.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(Ordering::Equal));
    kept.truncate(top_k);
    kept.iter().map(PredictionRecord::from_candidate).collect()
}
