use std::cmp::Ordering;
use std::collections::HashMap;

use memindex_core::types::{ChunkId, SearchHit, SourceKind};

use crate::tokenize::tokenize;

/// BM25 tuning: `k1` saturates term frequency, `b` scales length normalisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    len: usize,
    terms: Vec<String>,
}

/// In-memory inverted index over chunk text.
///
/// Postings map a term to the chunks containing it and the term frequency
/// in each. Adding or removing a chunk only touches the postings of that
/// chunk's own terms.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    params: Bm25Params,
    postings: HashMap<String, HashMap<ChunkId, u32>>,
    chunks: HashMap<ChunkId, IndexedChunk>,
    total_len: usize,
}

impl LexicalIndex {
    pub fn new(params: Bm25Params) -> Self {
        Self { params, ..Self::default() }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chunks.contains_key(id)
    }

    /// Indexes `text` under `id`, replacing whatever `id` held before.
    pub fn add(&mut self, id: &str, text: &str) {
        self.remove(id);
        let tokens = tokenize(text);
        let mut freqs: HashMap<String, u32> = HashMap::new();
        for t in &tokens {
            *freqs.entry(t.clone()).or_default() += 1;
        }
        let mut terms = Vec::with_capacity(freqs.len());
        for (term, tf) in freqs {
            self.postings.entry(term.clone()).or_default().insert(id.to_string(), tf);
            terms.push(term);
        }
        self.total_len += tokens.len();
        self.chunks.insert(id.to_string(), IndexedChunk { len: tokens.len(), terms });
    }

    /// Returns whether `id` was indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(chunk) = self.chunks.remove(id) else { return false };
        for term in &chunk.terms {
            if let Some(list) = self.postings.get_mut(term) {
                list.remove(id);
                if list.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_len -= chunk.len;
        true
    }

    pub fn clear(&mut self) {
        self.postings.clear();
        self.chunks.clear();
        self.total_len = 0;
    }

    /// Top `limit` chunks sharing at least one term with `query`, by BM25
    /// score descending, then chunk id ascending.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        if limit == 0 || self.chunks.is_empty() {
            return Vec::new();
        }
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let n = self.chunks.len() as f64;
        let avg_len = (self.total_len as f64 / n).max(f64::EPSILON);
        let k1 = f64::from(self.params.k1);
        let b = f64::from(self.params.b);

        let mut scores: HashMap<&str, f64> = HashMap::new();
        for term in &terms {
            let Some(list) = self.postings.get(term) else { continue };
            let df = list.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for (id, tf) in list {
                let len = self.chunks.get(id).map_or(0, |c| c.len) as f64;
                let tf = f64::from(*tf);
                let norm = k1 * (1.0 - b + b * len / avg_len);
                *scores.entry(id.as_str()).or_default() += idf * tf * (k1 + 1.0) / (tf + norm);
            }
        }

        let mut ranked: Vec<(&str, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(limit);
        tracing::trace!(terms = terms.len(), hits = ranked.len(), "lexical search");
        ranked
            .into_iter()
            .map(|(id, score)| SearchHit { id: id.to_string(), score: score as f32, source: SourceKind::Text })
            .collect()
    }
}
