use std::cmp::Ordering;
use std::collections::HashMap;

use memindex_core::types::{ChunkId, Embedding, SearchHit, SourceKind};

/// Cosine similarity, `None` when the lengths differ or either side has
/// zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some((dot / (na.sqrt() * nb.sqrt())) as f32)
}

/// Chunk vectors held for brute-force cosine ranking. Chunks indexed with
/// `Embedding::Missing` are simply not stored.
#[derive(Debug, Default)]
pub struct VectorIndex {
    vectors: HashMap<ChunkId, Vec<f32>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vectors.contains_key(id)
    }

    /// Stores or replaces the vector of `id`; a missing embedding removes it.
    pub fn insert(&mut self, id: &str, embedding: &Embedding) {
        match embedding.as_vector() {
            Some(v) => {
                self.vectors.insert(id.to_string(), v.to_vec());
            }
            None => {
                self.vectors.remove(id);
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.vectors.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
    }

    /// Top `limit` chunks by cosine similarity to `query`, ties by chunk id.
    /// A missing query embedding yields no candidates.
    pub fn search(&self, query: &Embedding, limit: usize) -> Vec<SearchHit> {
        let Some(q) = query.as_vector() else { return Vec::new() };
        if limit == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(&str, f32)> = self
            .vectors
            .iter()
            .filter_map(|(id, v)| cosine(q, v).map(|s| (id.as_str(), s)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)));
        scored.truncate(limit);
        scored
            .into_iter()
            .map(|(id, score)| SearchHit { id: id.to_string(), score, source: SourceKind::Vector })
            .collect()
    }
}
