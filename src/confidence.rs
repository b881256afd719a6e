//! Heuristic confidence scoring (v1).
//!
//! Combines resolution success, retrieval similarity, and evidence volume
//! into a single scalar in `[0, 1]`. This is a documented heuristic, not a
//! calibrated probability: the number orders answers by how well-supported
//! they are, nothing more.
//!
//! Formula (v1):
//!
//! ```text
//! unresolved or no results        -> 0.0
//! otherwise                       -> 0.5 * top1 + 0.3 * mean + 0.2 * coverage
//! ```
//!
//! where `top1` is the best similarity, `mean` the average over returned
//! results, and `coverage` the fraction of the top-K slots filled by
//! results at or above the similarity threshold. Each term is monotonic:
//! better matches and more of them can only raise the score.

use crate::models::RetrievalResult;

/// Identifier for the scoring formula, reported in logs so score changes
/// across releases stay explainable.
pub const SCORING_VERSION: &str = "v1";

const WEIGHT_TOP1: f32 = 0.5;
const WEIGHT_MEAN: f32 = 0.3;
const WEIGHT_COVERAGE: f32 = 0.2;

/// Score a completed retrieval. `resolved` is whether entity resolution
/// found a member at all; `threshold` and `k` come from retrieval config.
pub fn score(results: &[RetrievalResult], resolved: bool, threshold: f32, k: usize) -> f32 {
    if !resolved || results.is_empty() {
        return 0.0;
    }

    let top1 = results[0].score;
    let mean = results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;
    let relevant = results.iter().filter(|r| r.score >= threshold).count();
    let coverage = relevant as f32 / k.max(1) as f32;

    (WEIGHT_TOP1 * top1 + WEIGHT_MEAN * mean + WEIGHT_COVERAGE * coverage).clamp(0.0, 1.0)
}

/// Count of results at or above the similarity threshold, reported as
/// `relevant_messages` in answer metadata.
pub fn relevant_count(results: &[RetrievalResult], threshold: f32) -> usize {
    results.iter().filter(|r| r.score >= threshold).count()
}
