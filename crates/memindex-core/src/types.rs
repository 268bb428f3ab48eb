//! Domain types shared by the store, the scorers and the retrieval index.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;

/// Builds the stable id of the `ordinal`-th chunk of `file`.
pub fn chunk_id(file: &str, ordinal: usize) -> ChunkId {
    format!("{}:{}", file, ordinal)
}

/// An optional embedding vector. Scorers only ever look at `Vector`; why a
/// chunk or query has no vector (semantic indexing off, provider failure)
/// is not their concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Embedding {
    Vector(Vec<f32>),
    #[default]
    Missing,
}

impl Embedding {
    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Embedding::Vector(v) => Some(v),
            Embedding::Missing => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Embedding::Vector(_))
    }
}

impl From<Option<Vec<f32>>> for Embedding {
    fn from(v: Option<Vec<f32>>) -> Self {
        v.map_or(Embedding::Missing, Embedding::Vector)
    }
}

/// A slice of a document's lines, the unit of indexing and retrieval.
///
/// - `id`: `"{file}:{ordinal}"`, identical across re-indexing of unchanged text
/// - `file`: path relative to the workspace root
/// - `line_start`/`line_end`: 1-based inclusive provenance
/// - `text`: raw lines joined with `\n`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub file: String,
    pub line_start: usize,
    pub line_end: usize,
    pub text: String,
    pub embedding: Embedding,
}

/// Indicates which scoring channel produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Vector,
    Text,
}

/// A per-channel candidate. `score` is channel-specific (BM25 or cosine)
/// and higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// Which channels contributed to a fused result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchedBy {
    Lexical,
    Semantic,
    Both,
}

impl MatchedBy {
    pub fn from_source(source: SourceKind) -> Self {
        match source {
            SourceKind::Text => MatchedBy::Lexical,
            SourceKind::Vector => MatchedBy::Semantic,
        }
    }

    pub fn with(self, source: SourceKind) -> Self {
        if self == MatchedBy::from_source(source) {
            self
        } else {
            MatchedBy::Both
        }
    }
}

/// Per-query retrieval mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Lexical,
    Semantic,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn uses_lexical(self) -> bool {
        matches!(self, SearchMode::Lexical | SearchMode::Hybrid)
    }

    pub fn uses_semantic(self) -> bool {
        matches!(self, SearchMode::Semantic | SearchMode::Hybrid)
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "fts5" | "text" => Ok(SearchMode::Lexical),
            "semantic" | "vector" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(Error::InvalidConfig(format!("unknown search mode '{}'", other))),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchMode::Lexical => "lexical",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// Cheap content-change detector: byte length plus blake3 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        Self(format!("{}:{}", text.len(), blake3::hash(text.as_bytes()).to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What the index knows about one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub file: String,
    pub fingerprint: Fingerprint,
    pub chunk_ids: Vec<ChunkId>,
}

/// Result of enumerating a document source.
///
/// `skipped` holds entries discovery could not turn into a document path
/// (walk errors, non-UTF-8 names) with the reason. A listing with skipped
/// entries is incomplete: absence from `paths` says nothing about a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub paths: Vec<String>,
    pub skipped: Vec<(String, String)>,
}

impl Listing {
    pub fn complete(paths: Vec<String>) -> Self {
        Self { paths, skipped: Vec::new() }
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// A change notification from file discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChange {
    Modified(String),
    Removed(String),
}

/// A cell of the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Equality as used by `WHERE col IS ?`: nulls match nulls, integers and
    /// reals compare numerically, text never equals a number.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Total order used by `ORDER BY`: null < numbers < text.
    pub fn order(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Integer(_) | Value::Real(_) => 1,
                Value::Text(_) => 2,
            }
        }
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) if rank(a) == 1 && rank(b) == 1 => {
                let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Integer(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Values aligned to a table's declared columns.
pub type Row = Vec<Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Filter → order → limit, each optional.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Option<(String, Value)>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self { filter: Some((column.to_string(), value.into())), ..Self::default() }
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order_by = Some((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
