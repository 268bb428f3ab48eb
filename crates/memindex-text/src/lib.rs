//! memindex-text
//!
//! Lexical channel of the retrieval index: a BM25 inverted index over chunk
//! text. See `index` for scoring and `tokenize` for the analyzer.

pub mod index;
pub mod tokenize;

pub use index::{Bm25Params, LexicalIndex};
pub use tokenize::tokenize;
