//! memindex-hybrid
//!
//! Hybrid retrieval over memory files: chunks are scored by BM25 and by
//! cosine similarity, then merged with reciprocal rank fusion. The
//! `RetrievalIndex` owns the lifecycle (init, incremental indexing,
//! rebuild, close) and persists through a `RelationalStore`.

pub mod context;
pub mod fusion;
pub mod index;
pub mod report;
pub mod schema;

pub use context::render_memory_context;
pub use fusion::{fuse, FusedHit};
pub use index::RetrievalIndex;
pub use report::{ConsistencyReport, IndexReport, IndexStats, Phase, SearchResult};
