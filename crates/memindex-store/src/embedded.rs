//! In-process table store.
//!
//! Tables are typed structures with an ordered column list; the first column
//! is the upsert key. No joins, no multi-column predicates, no transactions.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use memindex_core::traits::RelationalStore;
use memindex_core::types::{Order, Query, Row, Value};
use memindex_core::{Error, Result};

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    fn position(&self, table: &str, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| Error::Operation(format!("table '{}' has no column '{}'", table, column)))
    }
}

#[derive(Debug, Default)]
pub struct EmbeddedStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl EmbeddedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Table>>> {
        self.tables.read().map_err(|_| Error::Store("embedded store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Table>>> {
        self.tables.write().map_err(|_| Error::Store("embedded store lock poisoned".into()))
    }
}

pub(crate) fn check_columns(name: &str, columns: &[&str]) -> Result<()> {
    if columns.is_empty() {
        return Err(Error::Operation(format!("table '{}' needs at least one column", name)));
    }
    for (i, c) in columns.iter().enumerate() {
        if c.is_empty() || columns[..i].contains(c) {
            return Err(Error::Operation(format!("table '{}' has an empty or duplicate column '{}'", name, c)));
        }
    }
    Ok(())
}

impl RelationalStore for EmbeddedStore {
    fn backend(&self) -> &'static str {
        "embedded"
    }

    fn create_table(&self, name: &str, columns: &[&str]) -> Result<()> {
        check_columns(name, columns)?;
        let mut tables = self.write()?;
        tables.entry(name.to_string()).or_insert_with(|| Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        });
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
        let mut tables = self.write()?;
        let Some(t) = tables.get_mut(table) else { return Ok(0) };
        let mut row = vec![Value::Null; t.columns.len()];
        for (column, value) in columns.iter().zip(values) {
            let pos = t.position(table, column)?;
            row[pos] = value;
        }
        if upsert {
            let key = row[0].clone();
            t.rows.retain(|r| !r[0].matches(&key));
        }
        t.rows.push(row);
        Ok(1)
    }

    fn update(&self, table: &str, set: &[(&str, Value)], where_column: &str, where_value: &Value) -> Result<usize> {
        let mut tables = self.write()?;
        let Some(t) = tables.get_mut(table) else { return Ok(0) };
        let where_pos = t.position(table, where_column)?;
        let targets = set
            .iter()
            .map(|(column, value)| Ok((t.position(table, column)?, value)))
            .collect::<Result<Vec<_>>>()?;
        let mut changed = 0;
        for row in t.rows.iter_mut().filter(|r| r[where_pos].matches(where_value)) {
            for (pos, value) in &targets {
                row[*pos] = (*value).clone();
            }
            changed += 1;
        }
        Ok(changed)
    }

    fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let tables = self.read()?;
        let Some(t) = tables.get(table) else { return Ok(Vec::new()) };
        let mut rows: Vec<Row> = match &query.filter {
            Some((column, value)) => {
                let pos = t.position(table, column)?;
                t.rows.iter().filter(|r| r[pos].matches(value)).cloned().collect()
            }
            None => t.rows.clone(),
        };
        if let Some((column, order)) = &query.order_by {
            let pos = t.position(table, column)?;
            match order {
                Order::Asc => rows.sort_by(|a, b| a[pos].order(&b[pos])),
                Order::Desc => rows.sort_by(|a, b| b[pos].order(&a[pos])),
            }
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn delete(&self, table: &str, where_column: &str, where_value: &Value) -> Result<usize> {
        let mut tables = self.write()?;
        let Some(t) = tables.get_mut(table) else { return Ok(0) };
        let pos = t.position(table, where_column)?;
        let before = t.rows.len();
        t.rows.retain(|r| !r[pos].matches(where_value));
        Ok(before - t.rows.len())
    }

    fn clear(&self, table: &str) -> Result<usize> {
        let mut tables = self.write()?;
        Ok(tables.get_mut(table).map_or(0, |t| std::mem::take(&mut t.rows).len()))
    }

    fn columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        Ok(self.read()?.get(table).map(|t| t.columns.clone()))
    }
}
