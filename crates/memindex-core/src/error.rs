use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    /// The storage engine itself failed (I/O, SQLite error). Missing tables
    /// or rows are not reported through this variant.
    #[error("Store unavailable: {0}")]
    Store(String),

    #[error("Index is not initialized")]
    NotReady,

    #[error("Index is closed")]
    Closed,

    /// A previous mutation was dropped before it finished; the instance must
    /// be recreated.
    #[error("Index left mid-mutation; recreate it and run a rebuild")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;
