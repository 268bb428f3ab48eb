//! Embedding cache keyed by `(embedder_id, content hash)`, persisted in the
//! relational store so it survives restarts and rebuilds.
//!
//! Entries are only added during indexing; `retain` is how stale ones go
//! away (the retrieval index runs it at the end of a rebuild).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use memindex_core::traits::RelationalStore;
use memindex_core::types::{Query, Value};
use memindex_core::{Error, Result};
use memindex_store::ensure_table;

pub const CACHE_TABLE: &str = "embedding_cache";
pub const CACHE_COLUMNS: [&str; 2] = ["key", "vector"];

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: String,
    pub vector: Vec<f32>,
}

/// `"{embedder_id}:{blake3 of text}"`.
pub fn cache_key(embedder_id: &str, text: &str) -> String {
    format!("{}:{}", embedder_id, blake3::hash(text.as_bytes()).to_hex())
}

pub struct EmbeddingCache {
    store: Arc<dyn RelationalStore>,
}

impl EmbeddingCache {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    pub fn ensure(&self) -> Result<()> {
        ensure_table(self.store.as_ref(), CACHE_TABLE, &CACHE_COLUMNS)
    }

    /// Cached vectors for the given keys. Rows that fail to decode count as
    /// misses.
    pub fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let mut out = HashMap::new();
        for key in keys {
            if out.contains_key(key) {
                continue;
            }
            let rows = self.store.query(CACHE_TABLE, &Query::eq("key", key.as_str()).limit(1))?;
            let Some(row) = rows.into_iter().next() else { continue };
            match row.get(1).and_then(Value::as_str).map(serde_json::from_str::<Vec<f32>>) {
                Some(Ok(v)) => {
                    out.insert(key.clone(), v);
                }
                _ => tracing::warn!(key = %key, "undecodable embedding cache row ignored"),
            }
        }
        Ok(out)
    }

    pub fn put_many(&self, entries: &[CacheEntry]) -> Result<()> {
        for e in entries {
            let vector = serde_json::to_string(&e.vector).map_err(|err| Error::Operation(err.to_string()))?;
            self.store.insert(CACHE_TABLE, &CACHE_COLUMNS, vec![Value::from(e.key.as_str()), Value::Text(vector)], true)?;
        }
        Ok(())
    }

    /// Deletes every entry whose key is not in `keep`. Returns how many went.
    pub fn retain(&self, keep: &HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        for row in self.store.query(CACHE_TABLE, &Query::all())? {
            let Some(key) = row.first().and_then(Value::as_str) else { continue };
            if !keep.contains(key) {
                removed += self.store.delete(CACHE_TABLE, "key", &Value::from(key))?;
            }
        }
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.store.query(CACHE_TABLE, &Query::all())?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
