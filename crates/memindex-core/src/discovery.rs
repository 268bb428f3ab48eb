//! Workspace file discovery.
//!
//! The memory layout written by the extraction pipeline is:
//! - `MEMORY.md` (core durable facts)
//! - `memory/**/*.md` (daily logs)
//! - `bank/entities/*.md` (entity summaries)
//! - `bank/opinions.md` (confidence-bearing beliefs)

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Component, Path, PathBuf};

use crate::traits::DocumentSource;
use crate::types::Listing;

/// Which files under the root count as documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    #[default]
    Memory,
    /// Every `.md` file outside hidden directories.
    AllMarkdown,
}

impl Layout {
    pub fn accepts(self, rel: &str) -> bool {
        if !rel.ends_with(".md") {
            return false;
        }
        match self {
            Layout::Memory => {
                rel == "MEMORY.md"
                    || rel == "bank/opinions.md"
                    || rel.starts_with("memory/")
                    || rel.strip_prefix("bank/entities/").is_some_and(|name| !name.contains('/'))
            }
            Layout::AllMarkdown => !rel.split('/').any(|part| part.starts_with('.')),
        }
    }
}

pub struct WorkspaceSource {
    root: PathBuf,
    layout: Layout,
}

impl WorkspaceSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), layout: Layout::Memory }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        if rel_path.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(anyhow!("refusing to read '{}' outside the workspace", rel));
        }
        Ok(self.root.join(rel_path))
    }
}

/// `/`-separated path of `path` relative to `root`. `None` when `path` is
/// outside `root` or any component is not valid UTF-8.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel.components().map(|c| c.as_os_str().to_str()).collect::<Option<Vec<&str>>>()?;
    if parts.is_empty() { None } else { Some(parts.join("/")) }
}

impl DocumentSource for WorkspaceSource {
    fn list(&self) -> Result<Listing> {
        if !self.root.is_dir() {
            return Err(anyhow!("workspace {} is not a directory", self.root.display()));
        }
        let mut listing = Listing::default();
        for entry in walkdir::WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e.path().unwrap_or(&self.root).display().to_string();
                    tracing::warn!(path = %at, error = %e, "workspace walk error");
                    listing.skipped.push((at, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match relative_path(&self.root, entry.path()) {
                Some(rel) => {
                    if self.layout.accepts(&rel) {
                        listing.paths.push(rel);
                    }
                }
                None => {
                    let at = entry.path().display().to_string();
                    tracing::warn!(path = %at, "skipping path that is not valid UTF-8");
                    listing.skipped.push((at, "path is not valid UTF-8".to_string()));
                }
            }
        }
        listing.paths.sort();
        Ok(listing)
    }

    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            let full = self.resolve(path)?;
            let bytes = tokio::fs::read(&full).await.map_err(|e| anyhow!("read {}: {}", full.display(), e))?;
            Ok(match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            })
        }
        .boxed()
    }
}
