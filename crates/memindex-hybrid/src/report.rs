use serde::Serialize;

use memindex_core::types::{ChunkId, MatchedBy};

/// A retrieved chunk with provenance for citation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: ChunkId,
    pub file: String,
    pub line_start: usize,
    pub line_end: usize,
    pub text: String,
    /// Fused reciprocal rank score.
    pub score: f64,
    pub matched: MatchedBy,
    /// Raw BM25 score, when the lexical channel returned this chunk.
    pub lexical_score: Option<f32>,
    /// Raw cosine similarity, when the semantic channel returned this chunk.
    pub semantic_score: Option<f32>,
}

impl SearchResult {
    /// `file:start-end`
    pub fn citation(&self) -> String {
        format!("{}:{}-{}", self.file, self.line_start, self.line_end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Uninitialized,
    Ready,
    Indexing,
    Closed,
}

/// Outcome of a workspace pass (`index_workspace`, `rebuild`, `apply_changes`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub chunks_indexed: usize,
    /// `(path, reason)` for files that could not be read.
    pub failures: Vec<(String, String)>,
    pub embedding_failures: usize,
}

impl IndexReport {
    pub fn warnings(&self) -> usize {
        self.failures.len() + self.embedding_failures
    }
}

/// Drift between document records and stored chunk rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Ids a document record claims but the store lacks.
    pub missing_chunks: Vec<ChunkId>,
    /// Stored chunk rows no document record owns.
    pub orphan_chunks: Vec<ChunkId>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_chunks.is_empty() && self.orphan_chunks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub phase: Phase,
    pub backend: &'static str,
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub terms: usize,
    /// Transient failures (unreadable files, failed embeddings) seen so far.
    pub warnings: usize,
}
