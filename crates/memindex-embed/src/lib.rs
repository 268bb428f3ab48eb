//! memindex-embed
//!
//! Offline embedding provider. `HashingEmbedder` projects analyzer terms and
//! their character trigrams into a fixed number of buckets with xxHash, then
//! L2-normalises the result. It needs no model files and is deterministic,
//! which makes it the default provider and the one tests run against.

pub mod pool;

use std::hash::Hasher;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use twox_hash::XxHash64;

use memindex_core::config::EmbedderConfig;
use memindex_core::traits::Embedder;
use memindex_core::{Error, Result};
use memindex_text::tokenize;

pub use pool::{accumulate, l2_normalize};

const TERM_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("embedder dim must be at least 1".into()));
        }
        Ok(Self { dim, id: format!("hashing:d{}", dim) })
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for term in tokenize(text) {
            accumulate(&mut v, hash_feature(0, &term), TERM_WEIGHT);
            let padded: Vec<char> = format!("#{}#", term).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                accumulate(&mut v, hash_feature(1, &gram), TRIGRAM_WEIGHT);
            }
        }
        l2_normalize(&mut v);
        v
    }
}

fn hash_feature(seed: u64, feature: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(feature.as_bytes());
    hasher.finish()
}

impl Embedder for HashingEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<f32>>> {
        futures::future::ready(Ok(self.embed_text(text))).boxed()
    }
}

/// Builds the provider named in configuration. `none` disables semantic
/// indexing entirely.
pub fn embedder_from_config(config: &EmbedderConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match config.provider.trim().to_ascii_lowercase().as_str() {
        "hashing" => {
            let embedder = HashingEmbedder::new(config.dim)?;
            tracing::debug!(id = embedder.embedder_id(), "using hashing embedder");
            Ok(Some(Arc::new(embedder)))
        }
        "none" | "off" => Ok(None),
        other => Err(Error::InvalidConfig(format!("unknown embedding provider '{}'", other))),
    }
}
