pub mod chunker;
pub mod config;
pub mod discovery;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
