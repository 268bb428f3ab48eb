//! Persisted layout of the index and row conversions.
//!
//! `chunks(id, file, line_start, line_end, text, embedding)` stores the
//! embedding as a JSON array or `Null`; `documents(file, fingerprint,
//! chunk_ids)` stores the ids as a JSON array. The first column of each is
//! its upsert key.

use memindex_core::traits::RelationalStore;
use memindex_core::types::{Chunk, DocumentRecord, Embedding, Fingerprint, Row, Value};
use memindex_core::{Error, Result};
use memindex_store::ensure_table;

pub const CHUNKS_TABLE: &str = "chunks";
pub const CHUNK_COLUMNS: [&str; 6] = ["id", "file", "line_start", "line_end", "text", "embedding"];

pub const DOCUMENTS_TABLE: &str = "documents";
pub const DOCUMENT_COLUMNS: [&str; 3] = ["file", "fingerprint", "chunk_ids"];

pub fn ensure_schema(store: &dyn RelationalStore) -> Result<()> {
    ensure_table(store, CHUNKS_TABLE, &CHUNK_COLUMNS)?;
    ensure_table(store, DOCUMENTS_TABLE, &DOCUMENT_COLUMNS)
}

fn malformed(table: &str, what: impl std::fmt::Display) -> Error {
    Error::Store(format!("malformed {} row: {}", table, what))
}

fn text_at<'a>(row: &'a Row, i: usize, table: &str) -> Result<&'a str> {
    row.get(i).and_then(Value::as_str).ok_or_else(|| malformed(table, format!("column {} is not text", i)))
}

fn line_at(row: &Row, i: usize) -> Result<usize> {
    row.get(i)
        .and_then(Value::as_i64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| malformed(CHUNKS_TABLE, format!("column {} is not a line number", i)))
}

pub fn chunk_to_row(chunk: &Chunk) -> Result<Row> {
    let embedding = match chunk.embedding.as_vector() {
        Some(v) => Value::Text(serde_json::to_string(v).map_err(|e| Error::Operation(e.to_string()))?),
        None => Value::Null,
    };
    Ok(vec![
        Value::from(chunk.id.as_str()),
        Value::from(chunk.file.as_str()),
        Value::from(chunk.line_start),
        Value::from(chunk.line_end),
        Value::from(chunk.text.as_str()),
        embedding,
    ])
}

pub fn chunk_from_row(row: &Row) -> Result<Chunk> {
    let embedding = match row.get(5) {
        None | Some(Value::Null) => Embedding::Missing,
        Some(Value::Text(json)) => {
            Embedding::Vector(serde_json::from_str(json).map_err(|e| malformed(CHUNKS_TABLE, e))?)
        }
        Some(other) => return Err(malformed(CHUNKS_TABLE, format!("embedding {:?}", other))),
    };
    Ok(Chunk {
        id: text_at(row, 0, CHUNKS_TABLE)?.to_string(),
        file: text_at(row, 1, CHUNKS_TABLE)?.to_string(),
        line_start: line_at(row, 2)?,
        line_end: line_at(row, 3)?,
        text: text_at(row, 4, CHUNKS_TABLE)?.to_string(),
        embedding,
    })
}

pub fn document_to_row(record: &DocumentRecord) -> Result<Row> {
    let ids = serde_json::to_string(&record.chunk_ids).map_err(|e| Error::Operation(e.to_string()))?;
    Ok(vec![
        Value::from(record.file.as_str()),
        Value::from(record.fingerprint.as_str()),
        Value::Text(ids),
    ])
}

pub fn document_from_row(row: &Row) -> Result<DocumentRecord> {
    let chunk_ids = serde_json::from_str(text_at(row, 2, DOCUMENTS_TABLE)?).map_err(|e| malformed(DOCUMENTS_TABLE, e))?;
    Ok(DocumentRecord {
        file: text_at(row, 0, DOCUMENTS_TABLE)?.to_string(),
        fingerprint: Fingerprint::from(text_at(row, 1, DOCUMENTS_TABLE)?.to_string()),
        chunk_ids,
    })
}
