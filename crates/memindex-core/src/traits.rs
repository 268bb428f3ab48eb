use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Listing, Query, Row, Value};

/// Narrow relational capability the retrieval index persists through.
///
/// Implemented by the embedded table store and by the native SQLite engine.
/// A table nobody created reads as empty: queries return no rows and
/// writes change nothing. Unknown columns and arity mismatches are errors.
pub trait RelationalStore: Send + Sync {
    /// Engine name, e.g. `embedded` or `sqlite`.
    fn backend(&self) -> &'static str;

    /// Idempotent; an existing table keeps its rows.
    fn create_table(&self, name: &str, columns: &[&str]) -> Result<()>;

    /// Appends a row. With `upsert`, rows sharing the new row's value in the
    /// table's first column are removed first. Returns rows written.
    fn insert(&self, table: &str, columns: &[&str], values: Vec<Value>, upsert: bool) -> Result<usize>;

    /// Overwrites `set` columns on rows where `where_column` matches.
    fn update(&self, table: &str, set: &[(&str, Value)], where_column: &str, where_value: &Value) -> Result<usize>;

    fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>>;

    fn delete(&self, table: &str, where_column: &str, where_value: &Value) -> Result<usize>;

    /// Removes every row, keeping the table.
    fn clear(&self, table: &str) -> Result<usize>;

    /// Declared columns, or `None` for an unknown table.
    fn columns(&self, table: &str) -> Result<Option<Vec<String>>>;
}

/// Embedding capability injected into the index. Failures are transient:
/// the index drops the semantic channel for that call and carries on.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hashing:d256`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<f32>>>;
}

/// File discovery: enumerates workspace documents and reads them.
pub trait DocumentSource: Send + Sync {
    /// Paths relative to the workspace root, `/`-separated, sorted, plus
    /// whatever could not be listed. `Err` means nothing could be listed.
    fn list(&self) -> anyhow::Result<Listing>;
    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;
}
