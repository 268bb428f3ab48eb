use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use memindex_core::types::{ChunkId, MatchedBy, SearchHit, SourceKind};

/// One chunk after reciprocal rank fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub id: ChunkId,
    pub score: f64,
    pub matched: MatchedBy,
    pub lexical_score: Option<f32>,
    pub semantic_score: Option<f32>,
}

/// Reciprocal rank fusion over ranked channel lists.
///
/// A chunk at 1-based rank `r` in a channel gains `1 / (r + rrf_k)`; a chunk
/// a channel did not return gains nothing from it. Output is ordered by fused
/// score descending, then chunk id ascending, and holds at most `limit` hits.
pub fn fuse(channels: &[Vec<SearchHit>], rrf_k: f64, limit: usize) -> Vec<FusedHit> {
    let mut by_id: BTreeMap<&str, FusedHit> = BTreeMap::new();
    for hits in channels {
        let mut seen = HashSet::new();
        for (pos, hit) in hits.iter().enumerate() {
            if !seen.insert(hit.id.as_str()) {
                continue;
            }
            let contribution = 1.0 / ((pos + 1) as f64 + rrf_k);
            let entry = by_id.entry(hit.id.as_str()).or_insert_with(|| FusedHit {
                id: hit.id.clone(),
                score: 0.0,
                matched: MatchedBy::from_source(hit.source),
                lexical_score: None,
                semantic_score: None,
            });
            entry.score += contribution;
            entry.matched = entry.matched.with(hit.source);
            match hit.source {
                SourceKind::Text => entry.lexical_score = Some(hit.score),
                SourceKind::Vector => entry.semantic_score = Some(hit.score),
            }
        }
    }
    let mut fused: Vec<FusedHit> = by_id.into_values().collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
    fused.truncate(limit);
    fused
}
