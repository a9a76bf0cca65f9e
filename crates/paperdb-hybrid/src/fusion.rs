//! Score fusion over the two ranked candidate lists.
//!
//! Engine scores are not comparable across engines (cosine similarity vs
//! BM25), so each policy first maps them onto a shared scale and only then
//! combines. Both policies are pure functions of the two input lists, which
//! keeps a query deterministic for fixed index contents.

use std::collections::HashMap;

use paperdb_core::types::{FusionPolicy, FusionWeights, ScoredHit, StoredChunk};

/// A chunk after fusion, before ranking is assigned. Raw engine scores are
/// kept so callers can report where a result came from.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub chunk_id: String,
    pub fused_score: f32,
    pub semantic_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub stored: StoredChunk,
}

impl FusedCandidate {
    fn in_both(&self) -> bool {
        self.semantic_score.is_some() && self.lexical_score.is_some()
    }
}

/// Fuse the two candidate lists under `policy` and return the merged set
/// in final order: fused score descending, then chunks found by both
/// engines before single-engine ones, then chunk id ascending.
pub fn fuse(
    semantic: &[ScoredHit],
    lexical: &[ScoredHit],
    policy: FusionPolicy,
    weights: FusionWeights,
    rrf_c: f32,
) -> Vec<FusedCandidate> {
    let mut fused = match policy {
        FusionPolicy::WeightedMinMax => weighted_min_max(semantic, lexical, weights),
        FusionPolicy::ReciprocalRank => reciprocal_rank(semantic, lexical, rrf_c),
    };
    fused.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| b.in_both().cmp(&a.in_both()))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}

/// Min-max normalize each list to [0,1] independently, then combine with
/// the configured weights. A chunk absent from a list contributes 0 for
/// that list. A degenerate list (all scores equal) normalizes its present
/// entries to 1.0 since presence still carries signal.
fn weighted_min_max(
    semantic: &[ScoredHit],
    lexical: &[ScoredHit],
    weights: FusionWeights,
) -> Vec<FusedCandidate> {
    let sem_norm = min_max(semantic);
    let lex_norm = min_max(lexical);

    // With only one list present, its weight would merely rescale the
    // ranking, or erase it entirely at weight zero. Use the normalized
    // scores directly so a degraded single-engine result keeps its order.
    let (w_sem, w_lex) = match (semantic.is_empty(), lexical.is_empty()) {
        (true, false) => (0.0, 1.0),
        (false, true) => (1.0, 0.0),
        _ => (weights.semantic, weights.lexical),
    };

    merge_raw(semantic, lexical)
        .into_iter()
        .map(|(chunk_id, (semantic_score, lexical_score, stored))| {
            let s = sem_norm.get(&chunk_id).copied().unwrap_or(0.0);
            let l = lex_norm.get(&chunk_id).copied().unwrap_or(0.0);
            FusedCandidate {
                chunk_id,
                fused_score: w_sem * s + w_lex * l,
                semantic_score,
                lexical_score,
                stored,
            }
        })
        .collect()
}

/// Reciprocal-rank fusion: sum of `1 / (rank + c)` over the lists the
/// chunk appears in, ranks 1-based. Ignores score magnitudes entirely, so
/// an outlier score in one engine cannot dominate.
fn reciprocal_rank(semantic: &[ScoredHit], lexical: &[ScoredHit], c: f32) -> Vec<FusedCandidate> {
    let sem_rank: HashMap<&str, usize> = ranks(semantic);
    let lex_rank: HashMap<&str, usize> = ranks(lexical);

    let merged = merge_raw(semantic, lexical);
    merged
        .into_iter()
        .map(|(chunk_id, (semantic_score, lexical_score, stored))| {
            let mut score = 0.0f32;
            if let Some(r) = sem_rank.get(chunk_id.as_str()) {
                score += 1.0 / (*r as f32 + c);
            }
            if let Some(r) = lex_rank.get(chunk_id.as_str()) {
                score += 1.0 / (*r as f32 + c);
            }
            FusedCandidate {
                chunk_id,
                fused_score: score,
                semantic_score,
                lexical_score,
                stored,
            }
        })
        .collect()
}

fn ranks(hits: &[ScoredHit]) -> HashMap<&str, usize> {
    hits.iter()
        .enumerate()
        .map(|(i, h)| (h.chunk_id.as_str(), i + 1))
        .collect()
}

fn min_max(hits: &[ScoredHit]) -> HashMap<String, f32> {
    if hits.is_empty() {
        return HashMap::new();
    }
    let min = hits.iter().map(|h| h.score).fold(f32::INFINITY, f32::min);
    let max = hits.iter().map(|h| h.score).fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    hits.iter()
        .map(|h| {
            let norm = if range > 0.0 { (h.score - min) / range } else { 1.0 };
            (h.chunk_id.clone(), norm)
        })
        .collect()
}

type RawEntry = (Option<f32>, Option<f32>, StoredChunk);

/// Union of the two lists keyed by chunk id, carrying raw scores and the
/// stored payload (either engine's copy is equivalent).
fn merge_raw(semantic: &[ScoredHit], lexical: &[ScoredHit]) -> Vec<(String, RawEntry)> {
    let mut by_id: HashMap<String, RawEntry> = HashMap::new();
    for h in semantic {
        by_id.insert(h.chunk_id.clone(), (Some(h.score), None, h.stored.clone()));
    }
    for h in lexical {
        by_id
            .entry(h.chunk_id.clone())
            .and_modify(|e| e.1 = Some(h.score))
            .or_insert((None, Some(h.score), h.stored.clone()));
    }
    by_id.into_iter().collect()
}
