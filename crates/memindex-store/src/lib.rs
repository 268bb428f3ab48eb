//! memindex-store
//!
//! Relational persistence for the retrieval index: an embedded table store
//! and, with the `native` feature, a SQLite engine honouring the same
//! `RelationalStore` contract. `open_store` picks one at construction time;
//! the choice never changes afterwards.

pub mod embedded;
#[cfg(feature = "native")]
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;

use memindex_core::config::BackendKind;
use memindex_core::traits::RelationalStore;
use memindex_core::{Error, Result};

pub use embedded::EmbeddedStore;
#[cfg(feature = "native")]
pub use sqlite::SqliteStore;

/// Whether a native engine was compiled in.
pub fn native_available() -> bool {
    cfg!(feature = "native")
}

/// Resolves the backend handle threaded through the index.
///
/// `Auto` prefers the native engine and falls back to the embedded store
/// when it is missing or cannot be opened; `Native` fails instead.
pub fn open_store(kind: BackendKind, path: &Path) -> Result<Arc<dyn RelationalStore>> {
    match kind {
        BackendKind::Embedded => Ok(Arc::new(EmbeddedStore::new())),
        BackendKind::Native => open_native(path),
        BackendKind::Auto => match open_native(path) {
            Ok(store) => Ok(store),
            Err(e) => {
                tracing::warn!(error = %e, "native store unavailable, using embedded store");
                Ok(Arc::new(EmbeddedStore::new()))
            }
        },
    }
}

#[cfg(feature = "native")]
fn open_native(path: &Path) -> Result<Arc<dyn RelationalStore>> {
    Ok(Arc::new(SqliteStore::open(path)?))
}

#[cfg(not(feature = "native"))]
fn open_native(path: &Path) -> Result<Arc<dyn RelationalStore>> {
    Err(Error::Store(format!(
        "no native engine compiled in (wanted {}); enable the `native` feature",
        path.display()
    )))
}

/// Creates `name` and checks that an already existing table has the
/// expected columns, so a stale schema is caught before it corrupts rows.
pub fn ensure_table(store: &dyn RelationalStore, name: &str, columns: &[&str]) -> Result<()> {
    store.create_table(name, columns)?;
    match store.columns(name)? {
        Some(existing) if existing.iter().map(String::as_str).eq(columns.iter().copied()) => Ok(()),
        Some(existing) => Err(Error::Store(format!(
            "table '{}' has columns {:?}, expected {:?}; rebuild the index",
            name, existing, columns
        ))),
        None => Err(Error::Store(format!("table '{}' missing right after creation", name))),
    }
}
