//! Native engine: the same contract on top of SQLite.
//!
//! Columns are declared without types and without a primary key, so a
//! non-upsert insert appends exactly like the embedded store. Store order is
//! rowid order; equality uses `IS` so nulls match nulls.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};

use memindex_core::traits::RelationalStore;
use memindex_core::types::{Order, Query, Row, Value};
use memindex_core::{Error, Result};

use crate::embedded::check_columns;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(v: SqlValue) -> Value {
    match v {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(i),
        SqlValue::Real(r) => Value::Real(r),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Option<Vec<String>>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table))).map_err(store_err)?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(store_err)?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(store_err)?;
    Ok(if columns.is_empty() { None } else { Some(columns) })
}

fn require(columns: &[String], table: &str, column: &str) -> Result<()> {
    if columns.iter().any(|c| c == column) {
        Ok(())
    } else {
        Err(Error::Operation(format!("table '{}' has no column '{}'", table, column)))
    }
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Store(format!("create {}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path).map_err(store_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(store_err)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::Store("sqlite connection lock poisoned".into()))
    }
}

impl RelationalStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn create_table(&self, name: &str, columns: &[&str]) -> Result<()> {
        check_columns(name, columns)?;
        let cols = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
        self.conn()?
            .execute(&format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(name), cols), [])
            .map_err(store_err)?;
        Ok(())
    }

    fn insert(&self, table: &str, columns: &[&str], values: Vec<Value>, upsert: bool) -> Result<usize> {
        if columns.len() != values.len() {
            return Err(Error::Operation(format!(
                "insert into '{}': {} columns but {} values",
                table,
                columns.len(),
                values.len()
            )));
        }
        let mut conn = self.conn()?;
        let Some(declared) = table_columns(&conn, table)? else { return Ok(0) };
        for c in columns {
            require(&declared, table, c)?;
        }
        let tx = conn.transaction().map_err(store_err)?;
        if upsert {
            let key = columns
                .iter()
                .position(|c| *c == declared[0])
                .map_or(Value::Null, |i| values[i].clone());
            tx.execute(
                &format!("DELETE FROM {} WHERE {} IS ?1", quote(table), quote(&declared[0])),
                [to_sql(&key)],
            )
            .map_err(store_err)?;
        }
        let names = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
        let slots = (1..=columns.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");
        let written = tx
            .execute(
                &format!("INSERT INTO {} ({}) VALUES ({})", quote(table), names, slots),
                params_from_iter(values.iter().map(to_sql)),
            )
            .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(written)
    }

    fn update(&self, table: &str, set: &[(&str, Value)], where_column: &str, where_value: &Value) -> Result<usize> {
        let conn = self.conn()?;
        let Some(declared) = table_columns(&conn, table)? else { return Ok(0) };
        require(&declared, table, where_column)?;
        for (c, _) in set {
            require(&declared, table, c)?;
        }
        if set.is_empty() {
            let n: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE {} IS ?1", quote(table), quote(where_column)),
                    [to_sql(where_value)],
                    |row| row.get(0),
                )
                .map_err(store_err)?;
            return Ok(usize::try_from(n).unwrap_or(0));
        }
        let assignments = set
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{} = ?{}", quote(c), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut params: Vec<SqlValue> = set.iter().map(|(_, v)| to_sql(v)).collect();
        params.push(to_sql(where_value));
        conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE {} IS ?{}",
                quote(table),
                assignments,
                quote(where_column),
                set.len() + 1
            ),
            params_from_iter(params),
        )
        .map_err(store_err)
    }

    fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let conn = self.conn()?;
        let Some(declared) = table_columns(&conn, table)? else { return Ok(Vec::new()) };
        let mut sql = format!("SELECT * FROM {}", quote(table));
        let mut params: Vec<SqlValue> = Vec::new();
        if let Some((column, value)) = &query.filter {
            require(&declared, table, column)?;
            sql.push_str(&format!(" WHERE {} IS ?1", quote(column)));
            params.push(to_sql(value));
        }
        sql.push_str(" ORDER BY ");
        if let Some((column, order)) = &query.order_by {
            require(&declared, table, column)?;
            let dir = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            sql.push_str(&format!("{} {}, ", quote(column), dir));
        }
        sql.push_str("rowid ASC");
        if let Some(limit) = query.limit {
            // SQLite reads LIMIT as a signed 64-bit integer
            sql.push_str(&format!(" LIMIT {}", i64::try_from(limit).unwrap_or(i64::MAX)));
        }
        let width = declared.len();
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                (0..width).map(|i| row.get::<_, SqlValue>(i).map(from_sql)).collect::<rusqlite::Result<Row>>()
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<Row>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn delete(&self, table: &str, where_column: &str, where_value: &Value) -> Result<usize> {
        let conn = self.conn()?;
        let Some(declared) = table_columns(&conn, table)? else { return Ok(0) };
        require(&declared, table, where_column)?;
        conn.execute(
            &format!("DELETE FROM {} WHERE {} IS ?1", quote(table), quote(where_column)),
            [to_sql(where_value)],
        )
        .map_err(store_err)
    }

    fn clear(&self, table: &str) -> Result<usize> {
        let conn = self.conn()?;
        if table_columns(&conn, table)?.is_none() {
            return Ok(0);
        }
        conn.execute(&format!("DELETE FROM {}", quote(table)), []).map_err(store_err)
    }

    fn columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        table_columns(&*self.conn()?, table)
    }
}
