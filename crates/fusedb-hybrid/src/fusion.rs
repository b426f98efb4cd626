//! Reciprocal Rank Fusion.
use std::collections::HashMap;

use fusedb_core::types::{FusedResult, RankedResult, StrategyHit, StrategyKind};

/// Merge ranked lists by summing `1 / (k + r)` per list, where `r` is the
/// 1-based position in that list.
///
/// Results are visited in [`StrategyKind::FUSION_ORDER`] by their `strategy`,
/// whatever order the lists are passed in. Ties keep first-seen order and each
/// chunk's payload comes from the first strategy that returned it.
pub fn fuse(lists: &[Vec<RankedResult>], k: u32) -> Vec<FusedResult> {
    let mut fused: Vec<FusedResult> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let in_order = StrategyKind::FUSION_ORDER.into_iter().flat_map(move |strategy| {
        lists.iter().flat_map(move |list| list.iter().enumerate().filter(move |(_, r)| r.strategy == strategy))
    });
    for (pos, result) in in_order {
        let rank = pos + 1;
        let slot = *slots.entry(result.chunk.chunk_id.as_str()).or_insert_with(|| {
            fused.push(FusedResult { chunk: result.chunk.clone(), fusion_score: 0.0, hits: Vec::new() });
            fused.len() - 1
        });
        let entry = &mut fused[slot];
        entry.fusion_score += rrf_contribution(k, rank);
        entry.hits.push(StrategyHit { strategy: result.strategy, rank, strategy_score: result.strategy_score });
    }
    // sort_by is stable: equal scores keep first-seen order
    fused.sort_by(|a, b| b.fusion_score.total_cmp(&a.fusion_score));
    fused
}

pub fn rrf_contribution(k: u32, rank: usize) -> f64 { 1.0 / (f64::from(k) + rank as f64) }
