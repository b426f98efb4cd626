use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fusedb_core::config::Settings;
use fusedb_core::traits::{CorpusStore, Embedder};
use fusedb_core::types::{ChunkReference, CorpusHit, HealthLevel, StrategyKind, StrategyMode};
use fusedb_core::{Error, Result};
use fusedb_hybrid::HybridRetriever;

const COLLECTION: &str = "rag_documents";

fn hit(id: &str, score: f32) -> CorpusHit {
    CorpusHit {
        chunk: ChunkReference { chunk_id: id.into(), content: format!("content of {id}"), source_title: "Survival Guide".into(), source_link: format!("guide.pdf#{id}") },
        score,
    }
}

/// Canned answers per strategy; `None` means the backend fails.
struct ScriptedStore {
    lexical: Option<Vec<CorpusHit>>,
    sparse: Option<Vec<CorpusHit>>,
    dense: Option<Vec<CorpusHit>>,
    sparse_model: bool,
    dense_delay: Option<Duration>,
    health: HealthLevel,
    requested: Mutex<Vec<(StrategyKind, usize)>>,
    knn_candidates: Mutex<Vec<usize>>,
}

impl Default for ScriptedStore {
    fn default() -> Self {
        Self {
            lexical: Some(Vec::new()),
            sparse: Some(Vec::new()),
            dense: Some(Vec::new()),
            sparse_model: true,
            dense_delay: None,
            health: HealthLevel::Available,
            requested: Mutex::new(Vec::new()),
            knn_candidates: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedStore {
    fn answer(&self, kind: StrategyKind, collection: &str, script: &Option<Vec<CorpusHit>>, size: usize) -> Result<Vec<CorpusHit>> {
        assert_eq!(collection, COLLECTION);
        self.requested.lock().unwrap().push((kind, size));
        match script {
            Some(hits) => Ok(hits.iter().take(size).cloned().collect()),
            None => Err(Error::BackendUnavailable(format!("{kind} backend down"))),
        }
    }

    fn requested(&self, kind: StrategyKind) -> Vec<usize> {
        self.requested.lock().unwrap().iter().filter(|(k, _)| *k == kind).map(|(_, s)| *s).collect()
    }
}

#[async_trait]
impl CorpusStore for ScriptedStore {
    async fn lexical_search(&self, collection: &str, _query: &str, size: usize) -> Result<Vec<CorpusHit>> {
        self.answer(StrategyKind::Lexical, collection, &self.lexical, size)
    }

    async fn sparse_search(&self, collection: &str, _query: &str, size: usize) -> Result<Vec<CorpusHit>> {
        if !self.sparse_model {
            return Err(Error::ModelUnavailable("no expansion model".into()));
        }
        self.answer(StrategyKind::SparseExpansion, collection, &self.sparse, size)
    }

    async fn knn_search(&self, collection: &str, _vector: &[f32], k: usize, num_candidates: usize) -> Result<Vec<CorpusHit>> {
        if let Some(delay) = self.dense_delay {
            tokio::time::sleep(delay).await;
        }
        self.knn_candidates.lock().unwrap().push(num_candidates);
        self.answer(StrategyKind::DenseVector, collection, &self.dense, k)
    }

    async fn health(&self) -> HealthLevel { self.health }
}

#[derive(Default)]
struct CountingEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize { 4 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("model not loaded");
        }
        Ok(texts.iter().map(|_| vec![0.5, 0.5, 0.5, 0.5]).collect())
    }
}

fn retriever(store: ScriptedStore, embedder: CountingEmbedder) -> (HybridRetriever, Arc<ScriptedStore>, Arc<CountingEmbedder>) {
    retriever_with(store, embedder, Settings::default())
}

fn retriever_with(store: ScriptedStore, embedder: CountingEmbedder, settings: Settings) -> (HybridRetriever, Arc<ScriptedStore>, Arc<CountingEmbedder>) {
    let store = Arc::new(store);
    let embedder = Arc::new(embedder);
    let retriever = HybridRetriever::new(store.clone(), embedder.clone(), &settings);
    (retriever, store, embedder)
}

fn ids(results: &[fusedb_core::types::FusedResult]) -> Vec<&str> { results.iter().map(|r| r.chunk.chunk_id.as_str()).collect() }

fn scenario_store() -> ScriptedStore {
    ScriptedStore {
        lexical: Some(vec![hit("A", 12.0), hit("C", 8.5)]),
        sparse: Some(vec![hit("B", 4.2)]),
        dense: Some(vec![hit("C", 0.91), hit("X", 0.80), hit("A", 0.77)]),
        ..Default::default()
    }
}

#[tokio::test]
async fn hybrid_fuses_three_strategies() {
    let (retriever, _, _) = retriever(scenario_store(), CountingEmbedder::default());
    let results = retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("search");
    assert_eq!(ids(&results), vec!["C", "A", "B"]);
    assert!((results[0].fusion_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
    assert!((results[1].fusion_score - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-12);
    assert!((results[2].fusion_score - 1.0 / 61.0).abs() < 1e-12);
    let c_hits: Vec<(StrategyKind, usize)> = results[0].hits.iter().map(|h| (h.strategy, h.rank)).collect();
    assert_eq!(c_hits, vec![(StrategyKind::Lexical, 2), (StrategyKind::DenseVector, 1)]);
    assert_eq!(results[0].chunk.source_link, "guide.pdf#C");
}

#[tokio::test]
async fn hybrid_requests_widened_candidate_pools() {
    let (retriever, store, _) = retriever(scenario_store(), CountingEmbedder::default());
    retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("search");
    assert_eq!(store.requested(StrategyKind::Lexical), vec![6]);
    assert_eq!(store.requested(StrategyKind::SparseExpansion), vec![6]);
    assert_eq!(store.requested(StrategyKind::DenseVector), vec![6]);
    assert_eq!(*store.knn_candidates.lock().unwrap(), vec![12]);
}

#[tokio::test]
async fn failing_strategy_degrades_to_empty() {
    let store = ScriptedStore { lexical: None, ..scenario_store() };
    let (retriever, _, _) = retriever(store, CountingEmbedder::default());
    let results = retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("search");
    assert!(results.iter().all(|r| r.hits.iter().all(|h| h.strategy != StrategyKind::Lexical)));
    // B (sparse) and C (dense) tie at 1/61; sparse is visited first
    assert_eq!(ids(&results), vec!["B", "C", "X"]);
}

#[tokio::test]
async fn slow_strategy_times_out_as_empty() {
    let mut settings = Settings::default();
    settings.retrieval.query_timeout_ms = 100;
    let store = ScriptedStore { dense_delay: Some(Duration::from_secs(5)), ..scenario_store() };
    let (retriever, _, _) = retriever_with(store, CountingEmbedder::default(), settings);
    let start = Instant::now();
    let results = retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("search");
    assert!(start.elapsed() < Duration::from_secs(2), "query waited for the slow strategy");
    assert_eq!(ids(&results), vec!["A", "B", "C"]);
    assert!(results.iter().all(|r| r.hits.iter().all(|h| h.strategy != StrategyKind::DenseVector)));
}

#[tokio::test]
async fn all_empty_is_not_an_error() {
    let (retriever, _, _) = retriever(ScriptedStore::default(), CountingEmbedder::default());
    let results = retriever.search("anything", StrategyMode::Hybrid, 5).await.expect("search");
    assert!(results.is_empty());
}

#[tokio::test]
async fn all_backends_down_is_not_an_error() {
    let store = ScriptedStore { lexical: None, sparse: None, dense: None, ..Default::default() };
    let (retriever, _, _) = retriever(store, CountingEmbedder { fail: true, ..Default::default() });
    assert!(retriever.search("anything", StrategyMode::Hybrid, 5).await.expect("search").is_empty());
}

#[tokio::test]
async fn repeated_query_reuses_cached_embedding() {
    let (retriever, _, embedder) = retriever(scenario_store(), CountingEmbedder::default());
    retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("first");
    retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("second");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    let stats = retriever.cache_stats();
    assert_eq!((stats.size, stats.request_count, stats.hit_count), (1, 2, 1));

    retriever.search("Purify water", StrategyMode::Hybrid, 3).await.expect("third");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2, "keys are case sensitive");

    retriever.clear_cache();
    retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("fourth");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn embedding_failure_only_drops_dense() {
    let (retriever, store, embedder) = retriever(scenario_store(), CountingEmbedder { fail: true, ..Default::default() });
    let results = retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("search");
    assert_eq!(ids(&results), vec!["A", "B", "C"]);
    assert!(store.requested(StrategyKind::DenseVector).is_empty());
    assert_eq!(retriever.cache_stats().size, 0);
    retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("search");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2, "failures are not cached");
}

#[tokio::test]
async fn single_strategy_uses_sparse_scores_without_fusion() {
    let store = ScriptedStore { sparse: Some(vec![hit("B", 4.2), hit("D", 3.1), hit("E", 0.4)]), ..scenario_store() };
    let (retriever, store, embedder) = retriever(store, CountingEmbedder::default());
    let results = retriever.search("purify water", StrategyMode::SingleStrategy, 2).await.expect("search");
    assert_eq!(ids(&results), vec!["B", "D"]);
    assert!((results[0].fusion_score - 4.2).abs() < 1e-6);
    assert_eq!(results[1].hits[0].rank, 2);
    assert_eq!(store.requested(StrategyKind::SparseExpansion), vec![2]);
    assert!(store.requested(StrategyKind::Lexical).is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_expansion_model_is_empty_not_error() {
    let store = ScriptedStore { sparse_model: false, ..scenario_store() };
    let (retriever, _, _) = retriever(store, CountingEmbedder::default());
    assert!(retriever.search("purify water", StrategyMode::SingleStrategy, 3).await.expect("single").is_empty());
    let hybrid = retriever.search("purify water", StrategyMode::Hybrid, 3).await.expect("hybrid");
    assert_eq!(ids(&hybrid), vec!["C", "A", "X"]);
}

#[tokio::test]
async fn zero_top_k_is_invalid() {
    let (retriever, _, _) = retriever(scenario_store(), CountingEmbedder::default());
    for mode in [StrategyMode::Hybrid, StrategyMode::SingleStrategy] {
        assert!(matches!(retriever.search("q", mode, 0).await, Err(Error::InvalidArgument(_))));
    }
    assert!(matches!("keyword".parse::<StrategyMode>(), Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn initialize_checks_store_health() {
    let (ok, _, _) = retriever(ScriptedStore { health: HealthLevel::Degraded, ..Default::default() }, CountingEmbedder::default());
    assert_eq!(ok.initialize().await.expect("degraded is usable"), HealthLevel::Degraded);
    let (down, _, _) = retriever(ScriptedStore { health: HealthLevel::Unavailable, ..Default::default() }, CountingEmbedder::default());
    assert!(matches!(down.initialize().await, Err(Error::BackendUnavailable(_))));
    assert_eq!(down.health().await, HealthLevel::Unavailable);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_share_the_cache() {
    let (retriever, _, embedder) = retriever(scenario_store(), CountingEmbedder::default());
    let retriever = Arc::new(retriever);
    retriever.search("warm up", StrategyMode::Hybrid, 3).await.expect("warm");
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let r = Arc::clone(&retriever);
            tokio::spawn(async move { r.search("warm up", StrategyMode::Hybrid, 3).await })
        })
        .collect();
    for t in tasks {
        let results = t.await.expect("join").expect("search");
        assert_eq!(ids(&results), vec!["C", "A", "B"]);
    }
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(retriever.cache_stats().hit_count, 8);
}
