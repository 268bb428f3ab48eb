//! The retrieval index: owns the scorers and document records, persists
//! through a `RelationalStore`, and serialises every mutation.
//!
//! State lives behind a `std::sync::RwLock` that is only taken for short,
//! synchronous sections. Reading and embedding a file happen before the
//! write guard is acquired, so a file's remove-then-insert is applied in one
//! critical section and searches never see it half done. Mutations queue on
//! a `tokio::sync::Mutex`. A mutation future dropped before completion
//! leaves the phase at `Indexing`; the next mutation reports
//! `Error::Interrupted`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indicatif::{ProgressBar, ProgressStyle};

use memindex_core::chunker::Chunker;
use memindex_core::config::IndexConfig;
use memindex_core::discovery::WorkspaceSource;
use memindex_core::traits::{DocumentSource, Embedder, RelationalStore};
use memindex_core::types::{Chunk, DocumentChange, DocumentRecord, Embedding, Fingerprint, Query, SearchMode, Value};
use memindex_core::{Error, Result};
use memindex_embed::embedder_from_config;
use memindex_store::open_store;
use memindex_text::{Bm25Params, LexicalIndex};
use memindex_vector::{cache_key, embed_chunks, embed_query, EmbeddingCache, VectorIndex};

use crate::context::render_memory_context;
use crate::fusion::fuse;
use crate::report::{ConsistencyReport, IndexReport, IndexStats, Phase, SearchResult};
use crate::schema::{
    chunk_from_row, chunk_to_row, document_from_row, document_to_row, ensure_schema, CHUNKS_TABLE, CHUNK_COLUMNS,
    DOCUMENTS_TABLE, DOCUMENT_COLUMNS,
};

/// Results injected into an agent prompt per turn.
pub const MEMORY_CONTEXT_RESULTS: usize = 3;

struct State {
    phase: Phase,
    rebuilding: bool,
    lexical: LexicalIndex,
    vectors: VectorIndex,
    documents: BTreeMap<String, DocumentRecord>,
    warnings: usize,
}

struct FileOutcome {
    chunks: usize,
    embedding_failures: usize,
}

pub struct RetrievalIndex {
    config: IndexConfig,
    chunker: Chunker,
    store: Arc<dyn RelationalStore>,
    embedder: Option<Arc<dyn Embedder>>,
    source: Arc<dyn DocumentSource>,
    cache: EmbeddingCache,
    write_lock: tokio::sync::Mutex<()>,
    state: RwLock<State>,
}

impl RetrievalIndex {
    /// Validates configuration; the index stays `Uninitialized` until `init`.
    pub fn new(
        config: IndexConfig,
        store: Arc<dyn RelationalStore>,
        embedder: Option<Arc<dyn Embedder>>,
        source: Arc<dyn DocumentSource>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunker())?;
        let lexical = LexicalIndex::new(Bm25Params { k1: config.bm25_k1, b: config.bm25_b });
        Ok(Self {
            chunker,
            cache: EmbeddingCache::new(store.clone()),
            store,
            embedder,
            source,
            write_lock: tokio::sync::Mutex::new(()),
            state: RwLock::new(State {
                phase: Phase::Uninitialized,
                rebuilding: false,
                lexical,
                vectors: VectorIndex::new(),
                documents: BTreeMap::new(),
                warnings: 0,
            }),
            config,
        })
    }

    /// Wires the store, embedder and workspace source named in `config`.
    pub fn from_config(config: IndexConfig) -> Result<Self> {
        let store = open_store(config.store.backend, &config.store_path())?;
        let embedder = embedder_from_config(&config.embedder)?;
        let source: Arc<dyn DocumentSource> = Arc::new(WorkspaceSource::new(config.workspace_dir()));
        tracing::info!(backend = store.backend(), workspace = %config.workspace_dir().display(), "retrieval index configured");
        Self::new(config, store, embedder, source)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| Error::Operation("index state lock poisoned".into()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| Error::Operation("index state lock poisoned".into()))
    }

    fn ensure_readable(&self) -> Result<()> {
        match self.read_state()?.phase {
            Phase::Uninitialized => Err(Error::NotReady),
            Phase::Closed => Err(Error::Closed),
            Phase::Ready | Phase::Indexing => Ok(()),
        }
    }

    fn begin_mutation(&self) -> Result<()> {
        let mut state = self.write_state()?;
        match state.phase {
            Phase::Ready => {
                state.phase = Phase::Indexing;
                Ok(())
            }
            Phase::Uninitialized => Err(Error::NotReady),
            Phase::Closed => Err(Error::Closed),
            Phase::Indexing => Err(Error::Interrupted),
        }
    }

    fn finish_mutation(&self) {
        if let Ok(mut state) = self.state.write() {
            if state.phase == Phase::Indexing {
                state.phase = Phase::Ready;
            }
            state.rebuilding = false;
        }
    }

    fn semantic_indexing(&self) -> Option<&dyn Embedder> {
        if self.config.semantic {
            self.embedder.as_deref()
        } else {
            None
        }
    }

    /// Creates the tables, loads persisted chunks and document records into
    /// the scorers and checks them against each other. Calling it again on
    /// a ready index is a no-op.
    pub async fn init(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match self.read_state()?.phase {
            Phase::Uninitialized => {}
            Phase::Ready => return Ok(()),
            Phase::Indexing => return Err(Error::Interrupted),
            Phase::Closed => return Err(Error::Closed),
        }
        ensure_schema(self.store.as_ref())?;
        if self.embedder.is_some() {
            self.cache.ensure()?;
        }

        let mut state = self.write_state()?;
        let mut skipped = 0;
        for row in self.store.query(DOCUMENTS_TABLE, &Query::all())? {
            match document_from_row(&row) {
                Ok(record) => {
                    state.documents.insert(record.file.clone(), record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping document row");
                    skipped += 1;
                }
            }
        }
        for row in self.store.query(CHUNKS_TABLE, &Query::all())? {
            match chunk_from_row(&row) {
                Ok(chunk) => {
                    state.lexical.add(&chunk.id, &chunk.text);
                    state.vectors.insert(&chunk.id, &chunk.embedding);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping chunk row");
                    skipped += 1;
                }
            }
        }
        state.warnings += skipped;
        state.phase = Phase::Ready;
        let (documents, chunks) = (state.documents.len(), state.lexical.len());
        drop(state);

        let report = self.consistency_report()?;
        if report.is_consistent() {
            tracing::info!(documents, chunks, backend = self.store.backend(), "retrieval index ready");
        } else {
            tracing::error!(
                missing = report.missing_chunks.len(),
                orphans = report.orphan_chunks.len(),
                "index is inconsistent with its store; run a rebuild"
            );
        }
        Ok(())
    }

    /// Indexes one document. Returns the number of chunks written, 0 when the
    /// content is unchanged since it was last indexed.
    pub async fn index_file(&self, path: &str, text: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        self.begin_mutation()?;
        let result = self.index_text(path, text).await;
        self.finish_mutation();
        Ok(result?.map_or(0, |o| o.chunks))
    }

    /// Indexes every document the source lists and drops records of
    /// documents it no longer lists. Entries the source could not list are
    /// reported as failures, and nothing is pruned on such a pass.
    pub async fn index_workspace(&self) -> Result<IndexReport> {
        let _guard = self.write_lock.lock().await;
        self.begin_mutation()?;
        let result = self.index_all().await;
        self.finish_mutation();
        result
    }

    /// Clears every chunk and document record, then re-indexes the source.
    /// Searches running meanwhile may see a partial index; see
    /// `is_rebuilding`.
    pub async fn rebuild(&self) -> Result<IndexReport> {
        let _guard = self.write_lock.lock().await;
        self.begin_mutation()?;
        let result = self.rebuild_locked().await;
        self.finish_mutation();
        result
    }

    async fn rebuild_locked(&self) -> Result<IndexReport> {
        {
            let mut state = self.write_state()?;
            state.rebuilding = true;
            self.store.clear(CHUNKS_TABLE)?;
            self.store.clear(DOCUMENTS_TABLE)?;
            state.lexical.clear();
            state.vectors.clear();
            state.documents.clear();
        }
        tracing::info!("rebuilding retrieval index");
        let report = self.index_all().await?;
        self.prune_cache()?;
        Ok(report)
    }

    /// Drops cache entries no stored chunk refers to.
    fn prune_cache(&self) -> Result<()> {
        let Some(embedder) = self.embedder.as_deref() else { return Ok(()) };
        let keep: HashSet<String> = self
            .store
            .query(CHUNKS_TABLE, &Query::all())?
            .iter()
            .filter_map(|row| chunk_from_row(row).ok())
            .map(|chunk| cache_key(embedder.embedder_id(), &chunk.text))
            .collect();
        let removed = self.cache.retain(&keep)?;
        if removed > 0 {
            tracing::info!(removed, "pruned embedding cache");
        }
        Ok(())
    }

    /// Drops a document and its chunks. Returns how many chunks went away.
    pub async fn remove_file(&self, path: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        self.begin_mutation()?;
        let result = self.remove_document(path);
        self.finish_mutation();
        Ok(result?.unwrap_or(0))
    }

    /// Applies change notifications from file discovery in order.
    pub async fn apply_changes(&self, changes: &[DocumentChange]) -> Result<IndexReport> {
        let _guard = self.write_lock.lock().await;
        self.begin_mutation()?;
        let result = self.apply_locked(changes).await;
        self.finish_mutation();
        result
    }

    async fn apply_locked(&self, changes: &[DocumentChange]) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        for change in changes {
            match change {
                DocumentChange::Modified(path) => {
                    report.files_seen += 1;
                    self.read_and_index(path, &mut report).await?;
                }
                DocumentChange::Removed(path) => {
                    if self.remove_document(path)?.is_some() {
                        report.files_removed += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    async fn index_all(&self) -> Result<IndexReport> {
        let listing = self
            .source
            .list()
            .map_err(|e| Error::Operation(format!("listing workspace documents failed: {}", e)))?;
        let files = &listing.paths;
        let mut report = IndexReport { files_seen: files.len(), ..IndexReport::default() };
        if !listing.is_complete() {
            report.failures.extend(listing.skipped.iter().cloned());
            self.write_state()?.warnings += listing.skipped.len();
        }

        let pb = if self.config.show_progress {
            ProgressBar::new(files.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        for path in files {
            pb.set_message(path.clone());
            self.read_and_index(path, &mut report).await?;
            pb.inc(1);
        }

        if listing.is_complete() {
            let listed: BTreeSet<&str> = files.iter().map(String::as_str).collect();
            let stale: Vec<String> = self
                .read_state()?
                .documents
                .keys()
                .filter(|f| !listed.contains(f.as_str()))
                .cloned()
                .collect();
            for path in stale {
                self.remove_document(&path)?;
                report.files_removed += 1;
            }
        } else {
            tracing::warn!(skipped = listing.skipped.len(), "workspace listing incomplete; not pruning unlisted documents");
        }
        pb.finish_and_clear();

        tracing::info!(
            seen = report.files_seen,
            indexed = report.files_indexed,
            unchanged = report.files_unchanged,
            removed = report.files_removed,
            chunks = report.chunks_indexed,
            warnings = report.warnings(),
            "workspace indexed"
        );
        Ok(report)
    }

    async fn read_and_index(&self, path: &str, report: &mut IndexReport) -> Result<()> {
        let text = match self.source.read(path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %path, error = %e, "skipping unreadable document");
                report.failures.push((path.to_string(), e.to_string()));
                self.write_state()?.warnings += 1;
                return Ok(());
            }
        };
        match self.index_text(path, &text).await? {
            Some(outcome) => {
                report.files_indexed += 1;
                report.chunks_indexed += outcome.chunks;
                report.embedding_failures += outcome.embedding_failures;
            }
            None => report.files_unchanged += 1,
        }
        Ok(())
    }

    /// `None` when the fingerprint matches the stored record.
    async fn index_text(&self, path: &str, text: &str) -> Result<Option<FileOutcome>> {
        let fingerprint = Fingerprint::of(text);
        if self.read_state()?.documents.get(path).is_some_and(|d| d.fingerprint == fingerprint) {
            tracing::debug!(file = %path, "unchanged, skipping");
            return Ok(None);
        }

        let mut chunks = self.chunker.chunk_document(path, text);
        let mut embedding_failures = 0;
        if let Some(embedder) = self.semantic_indexing() {
            let outcome = embed_chunks(&mut chunks, embedder, Some(&self.cache)).await?;
            embedding_failures = outcome.failed;
            tracing::debug!(file = %path, embedded = outcome.embedded, cached = outcome.cached, failed = outcome.failed, "chunks embedded");
        }

        let count = chunks.len();
        self.replace_document(path, fingerprint, chunks)?;
        if embedding_failures > 0 {
            self.write_state()?.warnings += embedding_failures;
        }
        tracing::debug!(file = %path, chunks = count, "indexed");
        Ok(Some(FileOutcome { chunks: count, embedding_failures }))
    }

    fn replace_document(&self, path: &str, fingerprint: Fingerprint, chunks: Vec<Chunk>) -> Result<()> {
        let record = DocumentRecord {
            file: path.to_string(),
            fingerprint,
            chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
        };
        let mut state = self.write_state()?;
        let written = self.write_document_rows(path, &chunks, &record);

        if let Some(old) = state.documents.remove(path) {
            for id in &old.chunk_ids {
                state.lexical.remove(id);
                state.vectors.remove(id);
            }
        }
        if let Err(e) = written {
            // a partial write leaves the file out of the index entirely
            tracing::error!(file = %path, error = %e, "store write failed; document dropped from the index");
            for table in [CHUNKS_TABLE, DOCUMENTS_TABLE] {
                if let Err(cleanup) = self.store.delete(table, "file", &Value::from(path)) {
                    tracing::warn!(file = %path, table, error = %cleanup, "cleanup after failed write also failed");
                }
            }
            state.warnings += 1;
            return Err(e);
        }
        for chunk in &chunks {
            state.lexical.add(&chunk.id, &chunk.text);
            state.vectors.insert(&chunk.id, &chunk.embedding);
        }
        state.documents.insert(path.to_string(), record);
        Ok(())
    }

    fn write_document_rows(&self, path: &str, chunks: &[Chunk], record: &DocumentRecord) -> Result<()> {
        self.store.delete(CHUNKS_TABLE, "file", &Value::from(path))?;
        for chunk in chunks {
            self.store.insert(CHUNKS_TABLE, &CHUNK_COLUMNS, chunk_to_row(chunk)?, true)?;
        }
        self.store.insert(DOCUMENTS_TABLE, &DOCUMENT_COLUMNS, document_to_row(record)?, true)?;
        Ok(())
    }

    /// `None` when nothing was known about `path`.
    fn remove_document(&self, path: &str) -> Result<Option<usize>> {
        let mut state = self.write_state()?;
        let removed_rows = self.store.delete(CHUNKS_TABLE, "file", &Value::from(path))?;
        self.store.delete(DOCUMENTS_TABLE, "file", &Value::from(path))?;
        let Some(record) = state.documents.remove(path) else {
            return Ok((removed_rows > 0).then_some(removed_rows));
        };
        for id in &record.chunk_ids {
            state.lexical.remove(id);
            state.vectors.remove(id);
        }
        tracing::debug!(file = %path, chunks = record.chunk_ids.len(), "removed");
        Ok(Some(record.chunk_ids.len().max(removed_rows)))
    }

    /// Top `k` chunks for `query`. Every mode goes through fusion, so a
    /// hybrid query whose embedding failed ranks exactly like a lexical one.
    pub async fn search(&self, query: &str, k: usize, mode: SearchMode) -> Result<Vec<SearchResult>> {
        self.ensure_readable()?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let depth = k.saturating_mul(self.config.candidate_multiplier);

        let query_embedding = if mode.uses_semantic() && self.config.semantic {
            let embedding = embed_query(self.embedder.as_deref(), query).await;
            if !embedding.is_present() && self.embedder.is_some() {
                self.write_state()?.warnings += 1;
            }
            embedding
        } else {
            Embedding::Missing
        };

        let channels = {
            let state = self.read_state()?;
            let lexical = if mode.uses_lexical() { state.lexical.search(query, depth) } else { Vec::new() };
            let semantic = if mode.uses_semantic() { state.vectors.search(&query_embedding, depth) } else { Vec::new() };
            [lexical, semantic]
        };

        let mut results = Vec::with_capacity(k);
        for hit in fuse(&channels, self.config.rrf_k, usize::MAX) {
            if results.len() == k {
                break;
            }
            let Some(row) = self.store.query(CHUNKS_TABLE, &Query::eq("id", hit.id.as_str()).limit(1))?.into_iter().next()
            else {
                tracing::debug!(chunk = %hit.id, "ranked chunk missing from store");
                continue;
            };
            let chunk = match chunk_from_row(&row) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(chunk = %hit.id, error = %e, "skipping unreadable chunk row");
                    continue;
                }
            };
            results.push(SearchResult {
                id: chunk.id,
                file: chunk.file,
                line_start: chunk.line_start,
                line_end: chunk.line_end,
                text: chunk.text,
                score: hit.score,
                matched: hit.matched,
                lexical_score: hit.lexical_score,
                semantic_score: hit.semantic_score,
            });
        }
        tracing::debug!(mode = %mode, k, results = results.len(), "search");
        Ok(results)
    }

    /// Hybrid search rendered as the memory block injected into a prompt.
    pub async fn memory_context(&self, query: &str) -> Result<Option<String>> {
        let results = self.search(query, MEMORY_CONTEXT_RESULTS, SearchMode::Hybrid).await?;
        Ok(render_memory_context(&results))
    }

    /// Compares document records with stored chunk rows. Never repairs;
    /// recovery is `rebuild`.
    pub fn check_consistency(&self) -> Result<ConsistencyReport> {
        self.ensure_readable()?;
        self.consistency_report()
    }

    fn consistency_report(&self) -> Result<ConsistencyReport> {
        let stored: BTreeSet<String> = self
            .store
            .query(CHUNKS_TABLE, &Query::all())?
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|v| v.as_str().map(str::to_string)))
            .collect();
        let state = self.read_state()?;
        let owned: BTreeSet<&str> =
            state.documents.values().flat_map(|d| d.chunk_ids.iter().map(String::as_str)).collect();
        Ok(ConsistencyReport {
            missing_chunks: owned.iter().filter(|id| !stored.contains(**id)).map(|id| id.to_string()).collect(),
            orphan_chunks: stored.iter().filter(|id| !owned.contains(id.as_str())).cloned().collect(),
        })
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let state = self.read_state()?;
        Ok(IndexStats {
            phase: state.phase,
            backend: self.store.backend(),
            documents: state.documents.len(),
            chunks: state.lexical.len(),
            embedded_chunks: state.vectors.len(),
            terms: state.lexical.term_count(),
            warnings: state.warnings,
        })
    }

    pub fn phase(&self) -> Result<Phase> {
        Ok(self.read_state()?.phase)
    }

    /// True while a rebuild holds the index; empty results are then not
    /// authoritative.
    pub fn is_rebuilding(&self) -> bool {
        self.state.read().map(|s| s.rebuilding).unwrap_or(false)
    }

    /// Waits for any running mutation, then refuses all further calls.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.write_state()?;
        if state.phase != Phase::Closed {
            state.phase = Phase::Closed;
            tracing::info!("retrieval index closed");
        }
        Ok(())
    }
}
