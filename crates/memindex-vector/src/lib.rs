//! memindex-vector
//!
//! Semantic channel: cosine ranking over chunk vectors, plus the store-backed
//! embedding cache and the cache-aware embedding pass used at index time.

pub mod cache;
pub mod embed_backfill;
pub mod search;

pub use cache::{cache_key, CacheEntry, EmbeddingCache, CACHE_COLUMNS, CACHE_TABLE};
pub use embed_backfill::{embed_chunks, embed_query, EmbedOutcome};
pub use search::{cosine, VectorIndex};
