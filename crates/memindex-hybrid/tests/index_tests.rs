use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tempfile::TempDir;

use memindex_core::config::IndexConfig;
use memindex_core::discovery::WorkspaceSource;
use memindex_core::traits::{DocumentSource, Embedder, RelationalStore};
use memindex_core::types::{DocumentChange, Listing, MatchedBy, Query, Row, SearchMode, Value};
use memindex_core::Error;
use memindex_embed::HashingEmbedder;
use memindex_hybrid::schema::CHUNKS_TABLE;
use memindex_hybrid::{Phase, RetrievalIndex};
use memindex_store::{EmbeddedStore, SqliteStore};
use memindex_vector::{cache_key, EmbeddingCache};

const ALICE: &str = "Alice prefers short responses on WhatsApp.";

#[derive(Default)]
struct MemorySource {
    // `None` marks an unreadable document
    docs: Mutex<BTreeMap<String, Option<String>>>,
    // entries reported as unlistable, as a failed directory walk would
    skipped: Mutex<Vec<(String, String)>>,
}

impl MemorySource {
    fn with(docs: &[(&str, &str)]) -> Arc<Self> {
        let source = Self::default();
        for (path, text) in docs {
            source.put(path, text);
        }
        Arc::new(source)
    }

    fn put(&self, path: &str, text: &str) {
        self.docs.lock().unwrap().insert(path.to_string(), Some(text.to_string()));
    }

    fn break_file(&self, path: &str) {
        self.docs.lock().unwrap().insert(path.to_string(), None);
    }

    fn delete(&self, path: &str) {
        self.docs.lock().unwrap().remove(path);
    }

    fn hide(&self, path: &str) {
        self.delete(path);
        self.skipped.lock().unwrap().push((path.to_string(), "permission denied".to_string()));
    }
}

impl DocumentSource for MemorySource {
    fn list(&self) -> anyhow::Result<Listing> {
        Ok(Listing {
            paths: self.docs.lock().unwrap().keys().cloned().collect(),
            skipped: self.skipped.lock().unwrap().clone(),
        })
    }

    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        let result = match self.docs.lock().unwrap().get(path) {
            Some(Some(text)) => Ok(text.clone()),
            Some(None) => Err(anyhow::anyhow!("permission denied")),
            None => Err(anyhow::anyhow!("no such document")),
        };
        futures::future::ready(result).boxed()
    }
}

/// Reads never complete.
struct StuckSource;

impl DocumentSource for StuckSource {
    fn list(&self) -> anyhow::Result<Listing> {
        Ok(Listing::complete(vec!["stuck.md".to_string()]))
    }

    fn read<'a>(&'a self, _path: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        futures::future::pending().boxed()
    }
}

/// Embedded store whose chunk inserts start failing once `fail_at` is set:
/// the `fail_at`-th chunk insert after arming fails, later ones succeed.
#[derive(Default)]
struct FlakyStore {
    inner: EmbeddedStore,
    fail_at: AtomicUsize,
    chunk_inserts: AtomicUsize,
}

impl FlakyStore {
    fn arm(&self, nth: usize) {
        self.chunk_inserts.store(0, Ordering::SeqCst);
        self.fail_at.store(nth, Ordering::SeqCst);
    }
}

impl RelationalStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    fn create_table(&self, name: &str, columns: &[&str]) -> memindex_core::Result<()> {
        self.inner.create_table(name, columns)
    }

    fn insert(&self, table: &str, columns: &[&str], values: Vec<Value>, upsert: bool) -> memindex_core::Result<usize> {
        if table == CHUNKS_TABLE {
            let n = self.chunk_inserts.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_at.load(Ordering::SeqCst) {
                return Err(Error::Store("disk full".into()));
            }
        }
        self.inner.insert(table, columns, values, upsert)
    }

    fn update(&self, table: &str, set: &[(&str, Value)], where_column: &str, where_value: &Value) -> memindex_core::Result<usize> {
        self.inner.update(table, set, where_column, where_value)
    }

    fn query(&self, table: &str, query: &Query) -> memindex_core::Result<Vec<Row>> {
        self.inner.query(table, query)
    }

    fn delete(&self, table: &str, where_column: &str, where_value: &Value) -> memindex_core::Result<usize> {
        self.inner.delete(table, where_column, where_value)
    }

    fn clear(&self, table: &str) -> memindex_core::Result<usize> {
        self.inner.clear(table)
    }

    fn columns(&self, table: &str) -> memindex_core::Result<Option<Vec<String>>> {
        self.inner.columns(table)
    }
}

/// Hashing embedder that can be switched into failure and counts calls.
struct Switchable {
    inner: HashingEmbedder,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Switchable {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(128).expect("embedder"),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }
}

impl Embedder for Switchable {
    fn embedder_id(&self) -> &str {
        self.inner.embedder_id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return futures::future::ready(Err(anyhow::anyhow!("embedding service unreachable"))).boxed();
        }
        self.inner.embed(text)
    }
}

fn config(chunk_size: usize, overlap: usize) -> IndexConfig {
    IndexConfig { chunk_size, chunk_overlap: overlap, ..IndexConfig::default() }
}

async fn ready(
    config: IndexConfig,
    store: Arc<dyn RelationalStore>,
    embedder: Option<Arc<dyn Embedder>>,
    source: Arc<dyn DocumentSource>,
) -> RetrievalIndex {
    let index = RetrievalIndex::new(config, store, embedder, source).expect("index");
    index.init().await.expect("init");
    index
}

fn hashing() -> Option<Arc<dyn Embedder>> {
    Some(Arc::new(HashingEmbedder::new(128).expect("embedder")))
}

fn corpus() -> Vec<(&'static str, &'static str)> {
    vec![
        ("MEMORY.md", "Core facts.\nThe user lives in Lisbon.\nThe user works on distributed databases."),
        ("bank/entities/Alice.md", ALICE),
        ("bank/entities/Bob.md", "Bob is Alice's manager.\nBob prefers email over chat."),
        ("bank/opinions.md", "c=0.8 Rust is a good fit for storage engines.\nc=0.4 WhatsApp groups are noisy."),
        ("memory/2026-01-02.md", "Met Bob for coffee.\nDiscussed the database migration.\nAlice joined late."),
    ]
}

#[tokio::test]
async fn alice_scenario() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("bank/entities")).unwrap();
    fs::write(tmp.path().join("bank/entities/Alice.md"), ALICE).unwrap();
    let source: Arc<dyn DocumentSource> = Arc::new(WorkspaceSource::new(tmp.path()));

    let index = ready(config(400, 80), Arc::new(EmbeddedStore::new()), hashing(), source).await;
    let text = fs::read_to_string(tmp.path().join("bank/entities/Alice.md")).unwrap();
    assert_eq!(index.index_file("bank/entities/Alice.md", &text).await.expect("index"), 1);

    let results = index.search("What does Alice prefer?", 5, SearchMode::Lexical).await.expect("search");
    assert_eq!(results.len(), 1);
    let hit = &results[0];
    assert_eq!(hit.file, "bank/entities/Alice.md");
    assert_eq!((hit.line_start, hit.line_end), (1, 1));
    assert_eq!(hit.text, ALICE);
    assert_eq!(hit.matched, MatchedBy::Lexical);
    assert_eq!(hit.citation(), "bank/entities/Alice.md:1-1");
    assert!(hit.lexical_score.is_some() && hit.semantic_score.is_none());
}

#[tokio::test]
async fn unchanged_content_is_not_reindexed() {
    let store: Arc<dyn RelationalStore> = Arc::new(EmbeddedStore::new());
    let index = ready(config(3, 1), store.clone(), hashing(), MemorySource::with(&[])).await;
    let text = (1..=10).map(|i| format!("Line {i}")).collect::<Vec<_>>().join("\n");

    assert_eq!(index.index_file("memory/log.md", &text).await.unwrap(), 5);
    let first: Vec<_> = store.query(CHUNKS_TABLE, &Query::all()).unwrap();
    assert_eq!(index.index_file("memory/log.md", &text).await.unwrap(), 0);
    let second: Vec<_> = store.query(CHUNKS_TABLE, &Query::all()).unwrap();
    assert_eq!(first, second);
    let ids: BTreeSet<String> = second.iter().map(|r| r[0].as_str().unwrap().to_string()).collect();
    assert_eq!(ids.len(), second.len(), "no duplicate chunk rows");
}

#[tokio::test]
async fn changed_content_replaces_old_chunks() {
    let store: Arc<dyn RelationalStore> = Arc::new(EmbeddedStore::new());
    let index = ready(config(3, 1), store.clone(), hashing(), MemorySource::with(&[])).await;
    let text = (1..=10).map(|i| format!("Line {i}")).collect::<Vec<_>>().join("\n");
    index.index_file("memory/log.md", &text).await.unwrap();

    assert_eq!(index.index_file("memory/log.md", "fresh content\nsecond thought").await.unwrap(), 1);
    let rows = store.query(CHUNKS_TABLE, &Query::eq("file", "memory/log.md")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::from("memory/log.md:0"));
    assert!(index.search("line", 10, SearchMode::Lexical).await.unwrap().is_empty());
    assert_eq!(index.search("thought", 10, SearchMode::Lexical).await.unwrap().len(), 1);
    assert_eq!(index.stats().unwrap().chunks, 1);
    assert!(index.check_consistency().unwrap().is_consistent());
}

#[tokio::test]
async fn lexical_ranking_is_stable() {
    let source = MemorySource::with(&corpus());
    let index = ready(config(1, 0), Arc::new(EmbeddedStore::new()), hashing(), source).await;
    index.index_workspace().await.unwrap();

    let first = index.search("Bob Alice database", 10, SearchMode::Lexical).await.unwrap();
    assert!(first.len() > 2);
    for _ in 0..5 {
        assert_eq!(index.search("Bob Alice database", 10, SearchMode::Lexical).await.unwrap(), first);
    }
    for pair in first.windows(2) {
        assert!(pair[0].score > pair[1].score || (pair[0].score == pair[1].score && pair[0].id < pair[1].id));
    }
}

#[tokio::test]
async fn hybrid_results_come_from_the_channels() {
    let source = MemorySource::with(&corpus());
    let index = ready(config(1, 0), Arc::new(EmbeddedStore::new()), hashing(), source).await;
    index.index_workspace().await.unwrap();

    for query in ["What does Alice prefer?", "database migration", "chat preferences", "Lisbon", "zzz"] {
        let lexical: BTreeSet<String> =
            index.search(query, 1000, SearchMode::Lexical).await.unwrap().into_iter().map(|r| r.id).collect();
        let semantic: BTreeSet<String> =
            index.search(query, 1000, SearchMode::Semantic).await.unwrap().into_iter().map(|r| r.id).collect();
        for k in [1, 3, 10] {
            for r in index.search(query, k, SearchMode::Hybrid).await.unwrap() {
                assert!(lexical.contains(&r.id) || semantic.contains(&r.id), "{} for '{}'", r.id, query);
                match r.matched {
                    MatchedBy::Both => assert!(lexical.contains(&r.id) && semantic.contains(&r.id)),
                    MatchedBy::Lexical => assert!(r.lexical_score.is_some()),
                    MatchedBy::Semantic => assert!(r.semantic_score.is_some()),
                }
            }
        }
    }
}

#[tokio::test]
async fn failed_query_embedding_degrades_to_lexical() {
    let embedder = Switchable::new();
    let source = MemorySource::with(&corpus());
    let index = ready(config(1, 0), Arc::new(EmbeddedStore::new()), Some(embedder.clone() as Arc<dyn Embedder>), source).await;
    let report = index.index_workspace().await.unwrap();
    assert_eq!(report.embedding_failures, 0);
    assert!(index.stats().unwrap().embedded_chunks > 0);

    embedder.failing.store(true, Ordering::SeqCst);
    for query in ["What does Alice prefer?", "Bob", "storage engines"] {
        for k in [1, 2, 5] {
            let hybrid = index.search(query, k, SearchMode::Hybrid).await.expect("hybrid never fails on embedding");
            let lexical = index.search(query, k, SearchMode::Lexical).await.unwrap();
            assert_eq!(hybrid, lexical);
        }
    }
    assert!(index.search("Bob", 5, SearchMode::Semantic).await.unwrap().is_empty());
    assert!(index.stats().unwrap().warnings > 0);
}

#[tokio::test]
async fn embedding_failures_at_index_time_are_counted() {
    let embedder = Switchable::new();
    embedder.failing.store(true, Ordering::SeqCst);
    let source = MemorySource::with(&[("bank/entities/Alice.md", ALICE)]);
    let index = ready(config(400, 80), Arc::new(EmbeddedStore::new()), Some(embedder.clone() as Arc<dyn Embedder>), source).await;

    let report = index.index_workspace().await.expect("index despite embedder outage");
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.embedding_failures, 1);
    let stats = index.stats().unwrap();
    assert_eq!((stats.chunks, stats.embedded_chunks), (1, 0));
    assert_eq!(index.search("Alice", 5, SearchMode::Hybrid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn semantic_mode_without_embedder_is_empty() {
    let source = MemorySource::with(&[("bank/entities/Alice.md", ALICE)]);
    let index = ready(config(400, 80), Arc::new(EmbeddedStore::new()), None, source).await;
    index.index_workspace().await.unwrap();
    assert!(index.search("Alice", 5, SearchMode::Semantic).await.unwrap().is_empty());
    assert_eq!(index.search("Alice", 5, SearchMode::Hybrid).await.unwrap().len(), 1);
    assert!(index.search("Alice", 0, SearchMode::Hybrid).await.unwrap().is_empty());
}

#[tokio::test]
async fn semantic_only_finds_paraphrases() {
    let source = MemorySource::with(&corpus());
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(1024).expect("embedder"));
    let index = ready(config(1, 0), Arc::new(EmbeddedStore::new()), Some(embedder), source).await;
    index.index_workspace().await.unwrap();
    let results = index.search("preferring", 1, SearchMode::Semantic).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].text.contains("prefers"));
    assert_eq!(results[0].matched, MatchedBy::Semantic);
}

#[tokio::test]
async fn workspace_pass_reports_and_prunes() {
    let source = MemorySource::with(&corpus());
    source.break_file("memory/2026-01-03.md");
    let index = ready(config(400, 80), Arc::new(EmbeddedStore::new()), hashing(), source.clone()).await;

    let report = index.index_workspace().await.unwrap();
    assert_eq!(report.files_seen, 6);
    assert_eq!(report.files_indexed, 5);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "memory/2026-01-03.md");

    let again = index.index_workspace().await.unwrap();
    assert_eq!((again.files_indexed, again.files_unchanged), (0, 5));

    source.delete("bank/entities/Bob.md");
    source.put("MEMORY.md", "Core facts.\nThe user moved to Porto.");
    let pruned = index.index_workspace().await.unwrap();
    assert_eq!((pruned.files_indexed, pruned.files_removed), (1, 1));
    assert!(index
        .search("email", 10, SearchMode::Lexical)
        .await
        .unwrap()
        .iter()
        .all(|r| r.file != "bank/entities/Bob.md"));
    assert!(index.search("Lisbon", 10, SearchMode::Lexical).await.unwrap().is_empty());
    assert_eq!(index.search("Porto", 10, SearchMode::Lexical).await.unwrap().len(), 1);
    assert!(index.check_consistency().unwrap().is_consistent());
}

#[tokio::test]
async fn change_feed_and_removal() {
    let source = MemorySource::with(&corpus());
    let index = ready(config(400, 80), Arc::new(EmbeddedStore::new()), hashing(), source.clone()).await;
    index.index_workspace().await.unwrap();

    source.put("bank/entities/Alice.md", "Alice now prefers voice notes.");
    let report = index
        .apply_changes(&[
            DocumentChange::Modified("bank/entities/Alice.md".into()),
            DocumentChange::Removed("memory/2026-01-02.md".into()),
            DocumentChange::Removed("never/indexed.md".into()),
        ])
        .await
        .unwrap();
    assert_eq!((report.files_indexed, report.files_removed), (1, 1));
    assert!(index.search("coffee", 5, SearchMode::Lexical).await.unwrap().is_empty());
    assert_eq!(index.search("voice", 5, SearchMode::Lexical).await.unwrap()[0].file, "bank/entities/Alice.md");

    assert_eq!(index.remove_file("bank/opinions.md").await.unwrap(), 1);
    assert_eq!(index.remove_file("bank/opinions.md").await.unwrap(), 0);
    assert_eq!(index.stats().unwrap().documents, 3);
}

#[tokio::test]
async fn rebuild_repairs_drift() {
    let store: Arc<dyn RelationalStore> = Arc::new(EmbeddedStore::new());
    let source = MemorySource::with(&corpus());
    let index = ready(config(1, 0), store.clone(), hashing(), source).await;
    let first = index.index_workspace().await.unwrap();

    store.delete(CHUNKS_TABLE, "id", &Value::from("MEMORY.md:0")).unwrap();
    store
        .insert(CHUNKS_TABLE, &["id", "file", "text"], vec!["ghost.md:0".into(), "ghost.md".into(), "boo".into()], true)
        .unwrap();
    let drift = index.check_consistency().unwrap();
    assert_eq!(drift.missing_chunks, vec!["MEMORY.md:0".to_string()]);
    assert_eq!(drift.orphan_chunks, vec!["ghost.md:0".to_string()]);
    // missing rows are skipped, not raised
    assert!(index.search("Core facts", 5, SearchMode::Lexical).await.unwrap().iter().all(|r| r.id != "MEMORY.md:0"));

    let rebuilt = index.rebuild().await.unwrap();
    assert_eq!(rebuilt.chunks_indexed, first.chunks_indexed);
    assert!(!index.is_rebuilding());
    assert!(index.check_consistency().unwrap().is_consistent());
    assert_eq!(index.search("Core facts", 1, SearchMode::Lexical).await.unwrap()[0].id, "MEMORY.md:0");
}

#[tokio::test]
async fn lifecycle_is_enforced() {
    let index = RetrievalIndex::new(config(400, 80), Arc::new(EmbeddedStore::new()), None, MemorySource::with(&[]))
        .expect("index");
    assert!(matches!(index.search("x", 1, SearchMode::Hybrid).await, Err(Error::NotReady)));
    assert!(matches!(index.index_file("a.md", "x").await, Err(Error::NotReady)));

    index.init().await.unwrap();
    index.init().await.unwrap();
    assert_eq!(index.phase().unwrap(), Phase::Ready);

    index.close().await.unwrap();
    index.close().await.unwrap();
    assert!(matches!(index.search("x", 1, SearchMode::Hybrid).await, Err(Error::Closed)));
    assert!(matches!(index.index_file("a.md", "x").await, Err(Error::Closed)));
    assert!(matches!(index.rebuild().await, Err(Error::Closed)));
    assert!(matches!(index.init().await, Err(Error::Closed)));
}

#[test]
fn invalid_configuration_fails_fast() {
    let err = RetrievalIndex::new(config(10, 10), Arc::new(EmbeddedStore::new()), None, MemorySource::with(&[]));
    assert!(matches!(err, Err(Error::InvalidConfig(_))));
    let bad_rrf = IndexConfig { rrf_k: -1.0, ..IndexConfig::default() };
    let err = RetrievalIndex::new(bad_rrf, Arc::new(EmbeddedStore::new()), None, MemorySource::with(&[]));
    assert!(matches!(err, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn dropped_mutation_poisons_the_instance() {
    let index = ready(config(400, 80), Arc::new(EmbeddedStore::new()), None, Arc::new(StuckSource)).await;
    let attempt = tokio::time::timeout(Duration::from_millis(50), index.index_workspace()).await;
    assert!(attempt.is_err(), "read never completes");

    assert_eq!(index.phase().unwrap(), Phase::Indexing);
    assert!(matches!(index.index_file("a.md", "text").await, Err(Error::Interrupted)));
    assert!(matches!(index.rebuild().await, Err(Error::Interrupted)));
    assert!(index.search("text", 3, SearchMode::Lexical).await.unwrap().is_empty());
    index.close().await.unwrap();
}

#[tokio::test]
async fn cache_avoids_reembedding_unchanged_chunks() {
    let embedder = Switchable::new();
    let source = MemorySource::with(&[("memory/notes.md", "first line\nsecond line")]);
    let store: Arc<dyn RelationalStore> = Arc::new(EmbeddedStore::new());
    let index = ready(config(1, 0), store.clone(), Some(embedder.clone() as Arc<dyn Embedder>), source.clone()).await;
    index.index_workspace().await.unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

    source.put("memory/notes.md", "first line\nsecond line, revised");
    index.index_workspace().await.unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

    let cache = EmbeddingCache::new(store.clone());
    assert_eq!(cache.len().unwrap(), 3);

    index.rebuild().await.unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    assert_eq!(index.stats().unwrap().embedded_chunks, 2);
    // the entry for the superseded "second line" text is gone
    assert_eq!(cache.len().unwrap(), 2);
    let live: Vec<String> = ["first line", "second line, revised"].iter().map(|t| cache_key(embedder.embedder_id(), t)).collect();
    assert_eq!(cache.get_many(&live).unwrap().len(), 2);
}

#[tokio::test]
async fn sqlite_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join(".memory/index.sqlite");
    let source = MemorySource::with(&corpus());
    {
        let store: Arc<dyn RelationalStore> = Arc::new(SqliteStore::open(&db).unwrap());
        let index = ready(config(1, 0), store, hashing(), source.clone()).await;
        index.index_workspace().await.unwrap();
        index.close().await.unwrap();
    }
    let store: Arc<dyn RelationalStore> = Arc::new(SqliteStore::open(&db).unwrap());
    let index = ready(config(1, 0), store, hashing(), source).await;
    let stats = index.stats().unwrap();
    assert_eq!(stats.backend, "sqlite");
    assert_eq!(stats.documents, 5);
    assert_eq!(stats.chunks, stats.embedded_chunks);
    assert!(index.check_consistency().unwrap().is_consistent());

    let report = index.index_workspace().await.unwrap();
    assert_eq!(report.files_unchanged, 5);
    let hit = &index.search("Lisbon", 1, SearchMode::Hybrid).await.unwrap()[0];
    assert_eq!(hit.id, "MEMORY.md:1");
    assert_eq!(hit.matched, MatchedBy::Both);
}

#[tokio::test]
async fn memory_context_block() {
    let source = MemorySource::with(&[("bank/entities/Alice.md", ALICE)]);
    let index = ready(config(400, 80), Arc::new(EmbeddedStore::new()), hashing(), source).await;
    index.index_workspace().await.unwrap();
    let block = index.memory_context("What does Alice prefer?").await.unwrap().expect("memories");
    assert_eq!(block, format!("## Relevant Memories:\n- {} (source: bank/entities/Alice.md:1-1)", ALICE));
}

#[tokio::test]
async fn failed_store_write_drops_the_document() {
    let store = Arc::new(FlakyStore::default());
    let index = ready(config(1, 0), store.clone(), hashing(), MemorySource::with(&[])).await;
    assert_eq!(index.index_file("memory/a.md", "zebra alpha\nzebra beta").await.unwrap(), 2);

    store.arm(2);
    let err = index.index_file("memory/a.md", "giraffe gamma\ngiraffe delta").await;
    assert!(matches!(err, Err(Error::Store(_))));

    // neither the old text nor a half-written new version is searchable
    for query in ["zebra", "giraffe"] {
        assert!(index.search(query, 5, SearchMode::Hybrid).await.unwrap().is_empty(), "{}", query);
    }
    let stats = index.stats().unwrap();
    assert_eq!((stats.documents, stats.chunks, stats.embedded_chunks), (0, 0, 0));
    assert!(stats.warnings > 0);
    assert!(index.check_consistency().unwrap().is_consistent());
    assert!(store.query(CHUNKS_TABLE, &Query::eq("file", "memory/a.md")).unwrap().is_empty());
    assert_eq!(index.phase().unwrap(), Phase::Ready);

    store.arm(0);
    assert_eq!(index.index_file("memory/a.md", "giraffe gamma\ngiraffe delta").await.unwrap(), 2);
    let hit = &index.search("giraffe", 1, SearchMode::Lexical).await.unwrap()[0];
    assert_eq!(hit.file, "memory/a.md");
    assert!(hit.text.contains("giraffe"));
}

#[tokio::test]
async fn incomplete_listing_is_reported_and_not_pruned() {
    let source = MemorySource::with(&corpus());
    let index = ready(config(400, 80), Arc::new(EmbeddedStore::new()), hashing(), source.clone()).await;
    index.index_workspace().await.unwrap();

    source.hide("bank/entities/Bob.md");
    let report = index.index_workspace().await.unwrap();
    assert_eq!(report.files_removed, 0);
    assert_eq!(report.failures, vec![("bank/entities/Bob.md".to_string(), "permission denied".to_string())]);
    assert_eq!(index.stats().unwrap().documents, 5);
    assert_eq!(index.search("email", 1, SearchMode::Lexical).await.unwrap()[0].file, "bank/entities/Bob.md");

    source.skipped.lock().unwrap().clear();
    assert_eq!(index.index_workspace().await.unwrap().files_removed, 1);
    assert_eq!(index.stats().unwrap().documents, 4);
}
