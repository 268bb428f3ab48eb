//! Fills chunk embeddings through the cache.
//!
//! Each chunk's key is looked up first; misses go to the embedder one at a
//! time and successful vectors are written back. A failed or malformed
//! embedding leaves that chunk `Missing` and is counted, never raised.

use memindex_core::traits::Embedder;
use memindex_core::types::{Chunk, Embedding};
use memindex_core::Result;

use crate::cache::{cache_key, CacheEntry, EmbeddingCache};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedOutcome {
    /// Vectors computed by the embedder.
    pub embedded: usize,
    /// Vectors served from the cache.
    pub cached: usize,
    pub failed: usize,
}

pub async fn embed_chunks(
    chunks: &mut [Chunk],
    embedder: &dyn Embedder,
    cache: Option<&EmbeddingCache>,
) -> Result<EmbedOutcome> {
    let mut outcome = EmbedOutcome::default();
    if chunks.is_empty() {
        return Ok(outcome);
    }
    let keys: Vec<String> = chunks.iter().map(|c| cache_key(embedder.embedder_id(), &c.text)).collect();
    let hits = match cache {
        Some(cache) => cache.get_many(&keys)?,
        None => Default::default(),
    };

    let mut fresh = Vec::new();
    for (chunk, key) in chunks.iter_mut().zip(keys) {
        if let Some(v) = hits.get(&key).filter(|v| v.len() == embedder.dim()) {
            chunk.embedding = Embedding::Vector(v.clone());
            outcome.cached += 1;
            continue;
        }
        match embedder.embed(&chunk.text).await {
            Ok(v) if v.len() == embedder.dim() => {
                fresh.push(CacheEntry { key, vector: v.clone() });
                chunk.embedding = Embedding::Vector(v);
                outcome.embedded += 1;
            }
            Ok(v) => {
                tracing::warn!(chunk = %chunk.id, got = v.len(), expected = embedder.dim(), "embedding has wrong dimension");
                chunk.embedding = Embedding::Missing;
                outcome.failed += 1;
            }
            Err(e) => {
                tracing::warn!(chunk = %chunk.id, error = %e, "embedding failed");
                chunk.embedding = Embedding::Missing;
                outcome.failed += 1;
            }
        }
    }
    if let Some(cache) = cache {
        cache.put_many(&fresh)?;
    }
    Ok(outcome)
}

/// Query-side embedding. Any failure, or no embedder at all, yields
/// `Missing` so the caller falls back to the lexical channel.
pub async fn embed_query(embedder: Option<&dyn Embedder>, text: &str) -> Embedding {
    let Some(embedder) = embedder else { return Embedding::Missing };
    match embedder.embed(text).await {
        Ok(v) if v.len() == embedder.dim() => Embedding::Vector(v),
        Ok(v) => {
            tracing::warn!(got = v.len(), expected = embedder.dim(), "query embedding has wrong dimension");
            Embedding::Missing
        }
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed; semantic channel skipped");
            Embedding::Missing
        }
    }
}
