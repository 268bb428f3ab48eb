//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`APP_INDEX__CHUNK_SIZE=200` sets `index.chunk_size`). `IndexConfig` is the
//! typed view of the `[index]` section.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkerConfig;
use crate::error::{Error, Result};
use crate::types::SearchMode;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Wraps an already assembled figment (tests, embedding hosts).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[index]` section layered over the defaults, validated.
    pub fn index_config(&self) -> anyhow::Result<IndexConfig> {
        let config: IndexConfig = if self.figment.contains("index") {
            self.figment.extract_inner("index")?
        } else {
            IndexConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if env == "prod" || env == "production" {
            let backend: Option<BackendKind> = self.get("index.store.backend").ok();
            if backend == Some(BackendKind::Embedded) {
                tracing::warn!("index.store.backend = embedded in production; the index will not persist");
            }
        }
        Ok(())
    }
}

/// Which relational engine backs the index. Resolved once, at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Native engine when compiled in and openable, embedded otherwise.
    #[default]
    Auto,
    Embedded,
    Native,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Database file for the native engine, relative to the workspace.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: BackendKind::Auto, path: ".memory/index.sqlite".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// `hashing` or `none`.
    pub provider: String,
    pub dim: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self { provider: "hashing".to_string(), dim: 256 }
    }
}

/// Tunables of the retrieval index. Every field has a default so a partial
/// `[index]` table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub workspace: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Reciprocal rank fusion constant.
    pub rrf_k: f64,
    /// Each channel contributes `k * candidate_multiplier` candidates to fusion.
    pub candidate_multiplier: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    /// Compute chunk embeddings at index time.
    pub semantic: bool,
    pub default_mode: SearchMode,
    pub show_progress: bool,
    pub store: StoreConfig,
    pub embedder: EmbedderConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            workspace: ".".to_string(),
            chunk_size: 400,
            chunk_overlap: 80,
            rrf_k: 60.0,
            candidate_multiplier: 4,
            bm25_k1: 1.2,
            bm25_b: 0.75,
            semantic: true,
            default_mode: SearchMode::Hybrid,
            show_progress: false,
            store: StoreConfig::default(),
            embedder: EmbedderConfig::default(),
        }
    }
}

impl IndexConfig {
    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig { chunk_size: self.chunk_size, overlap: self.chunk_overlap }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker().validate()?;
        if !(self.rrf_k.is_finite() && self.rrf_k > 0.0) {
            return Err(Error::InvalidConfig(format!("rrf_k must be positive, got {}", self.rrf_k)));
        }
        if self.candidate_multiplier == 0 {
            return Err(Error::InvalidConfig("candidate_multiplier must be at least 1".into()));
        }
        if !(self.bm25_k1.is_finite() && self.bm25_k1 >= 0.0) {
            return Err(Error::InvalidConfig(format!("bm25_k1 must be non-negative, got {}", self.bm25_k1)));
        }
        if !(0.0..=1.0).contains(&self.bm25_b) {
            return Err(Error::InvalidConfig(format!("bm25_b must lie in [0, 1], got {}", self.bm25_b)));
        }
        Ok(())
    }

    /// Workspace root after `~`/`$VAR` expansion.
    pub fn workspace_dir(&self) -> PathBuf {
        expand_path(&self.workspace)
    }

    /// Native database file, resolved against the workspace root.
    pub fn store_path(&self) -> PathBuf {
        resolve_with_base(&self.workspace_dir(), &self.store.path)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
