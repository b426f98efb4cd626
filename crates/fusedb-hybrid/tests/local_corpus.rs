use std::sync::Arc;
use tempfile::TempDir;

use fusedb_core::config::{EmbeddingProvider, Settings};
use fusedb_core::traits::{CorpusStore, Embedder};
use fusedb_core::types::{ChunkReference, HealthLevel, StrategyKind, StrategyMode};
use fusedb_core::Error;
use fusedb_embed::HashEmbedder;
use fusedb_hybrid::{HybridRetriever, LocalCorpus};
use fusedb_text::TextIndex;
use fusedb_vector::VectorIndex;

fn chunk(id: &str, title: &str, content: &str) -> ChunkReference {
    ChunkReference { chunk_id: id.into(), content: content.into(), source_title: title.into(), source_link: format!("docs/{title}.pdf") }
}

fn corpus_chunks() -> Vec<ChunkReference> {
    vec![
        chunk("water_0", "water", "Boil water for at least one minute to make it safe."),
        chunk("water_1", "water", "Purification tablets make stream water drinkable."),
        chunk("fire_0", "fire", "Dry tinder and a ferro rod start a fire in wet weather."),
        chunk("shelter_0", "shelter", "A lean-to shelter blocks wind and rain."),
    ]
}

fn settings(tmp: &TempDir, with_expansions: bool) -> Settings {
    let mut s = Settings::default();
    s.corpus.root_dir = tmp.path().join("corpus").to_string_lossy().to_string();
    s.embedding.provider = EmbeddingProvider::Hash;
    s.embedding.dim = 64;
    if with_expansions {
        let table = serde_json::json!({
            "boil": { "heat": 0.5, "sterilize": 0.6 },
            "potable": { "drinkable": 0.9 },
            "drinkable": { "potable": 0.9 }
        });
        let path = tmp.path().join("expansions.json");
        std::fs::write(&path, table.to_string()).expect("write table");
        s.corpus.expansion_table = Some(path.to_string_lossy().to_string());
    }
    s
}

async fn open(settings: &Settings) -> (Arc<LocalCorpus>, Arc<dyn Embedder>) {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(settings.embedding.dim));
    let corpus = LocalCorpus::open(&settings.corpus, embedder.clone()).await.expect("open corpus");
    (Arc::new(corpus), embedder)
}

#[tokio::test]
async fn ingest_then_hybrid_query() {
    let tmp = TempDir::new().expect("tmp");
    let settings = settings(&tmp, true);
    let (corpus, embedder) = open(&settings).await;
    assert_eq!(corpus.ingest(&corpus_chunks()).await.expect("ingest"), 4);

    let retriever = HybridRetriever::new(corpus.clone(), embedder, &settings);
    assert_eq!(retriever.initialize().await.expect("init"), HealthLevel::Available);

    let results = retriever.search("boil water", StrategyMode::Hybrid, 3).await.expect("search");
    assert!(!results.is_empty() && results.len() <= 3);
    assert_eq!(results[0].chunk.chunk_id, "water_0");
    let strategies: Vec<StrategyKind> = results[0].hits.iter().map(|h| h.strategy).collect();
    assert!(strategies.contains(&StrategyKind::Lexical));
    assert!(strategies.contains(&StrategyKind::SparseExpansion));
    for pair in results.windows(2) {
        assert!(pair[0].fusion_score >= pair[1].fusion_score);
    }

    let single = retriever.search("potable", StrategyMode::SingleStrategy, 3).await.expect("single");
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].chunk.chunk_id, "water_1");
}

#[tokio::test]
async fn sparse_unavailable_without_expansion_table() {
    let tmp = TempDir::new().expect("tmp");
    let settings = settings(&tmp, false);
    let (corpus, embedder) = open(&settings).await;
    corpus.ingest(&corpus_chunks()).await.expect("ingest");
    assert!(matches!(corpus.sparse_search("rag_documents", "water", 3).await, Err(Error::ModelUnavailable(_))));

    let retriever = HybridRetriever::new(corpus.clone(), embedder, &settings);
    assert!(retriever.search("water", StrategyMode::SingleStrategy, 3).await.expect("single").is_empty());
    let hybrid = retriever.search("ferro rod fire", StrategyMode::Hybrid, 2).await.expect("hybrid");
    assert_eq!(hybrid[0].chunk.chunk_id, "fire_0");
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let tmp = TempDir::new().expect("tmp");
    let (corpus, _) = open(&settings(&tmp, false)).await;
    assert!(matches!(corpus.lexical_search("other", "water", 3).await, Err(Error::NotFound(_))));
    assert!(matches!(corpus.knn_search("other", &[0.0; 64], 3, 6).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn reingest_replaces_chunks() {
    let tmp = TempDir::new().expect("tmp");
    let settings = settings(&tmp, false);
    let (corpus, _) = open(&settings).await;
    corpus.ingest(&corpus_chunks()).await.expect("ingest");
    corpus.ingest(&[chunk("fire_0", "fire", "Bow drills need a hardwood spindle.")]).await.expect("reingest");
    assert_eq!(corpus.num_docs(), 4);
    let hits = corpus.lexical_search("rag_documents", "spindle", 5).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.chunk_id, "fire_0");
    assert!(corpus.lexical_search("rag_documents", "ferro", 5).await.expect("search").is_empty());

    corpus.clear().await.expect("clear");
    assert_eq!(corpus.num_docs(), 0);
}

#[tokio::test]
async fn close_makes_store_unavailable() {
    let tmp = TempDir::new().expect("tmp");
    let settings = settings(&tmp, false);
    let (corpus, embedder) = open(&settings).await;
    corpus.ingest(&corpus_chunks()).await.expect("ingest");
    let retriever = HybridRetriever::new(corpus.clone(), embedder, &settings);
    retriever.close().await.expect("close");
    assert_eq!(retriever.health().await, HealthLevel::Unavailable);
    assert!(retriever.search("water", StrategyMode::Hybrid, 3).await.expect("degraded search").is_empty());
    assert!(matches!(retriever.initialize().await, Err(Error::BackendUnavailable(_))));
}

#[tokio::test]
async fn dimension_mismatch_writes_nothing() {
    let tmp = TempDir::new().expect("tmp");
    let text = TextIndex::open_or_create(&tmp.path().join("text"), None).expect("text index");
    let vectors = VectorIndex::open(&tmp.path().join("vectors"), "chunks", 64).await.expect("vector table");
    let corpus = LocalCorpus::from_parts("rag_documents", text, vectors, Arc::new(HashEmbedder::new(32)));
    assert!(matches!(corpus.ingest(&corpus_chunks()).await, Err(Error::Embedding(_))));
    assert_eq!(corpus.num_docs(), 0);
    assert!(corpus.lexical_search("rag_documents", "water", 5).await.expect("search").is_empty());
    assert!(corpus.knn_search("rag_documents", &[0.1; 64], 3, 6).await.expect("knn").is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn health_runs_alongside_queries() {
    let tmp = TempDir::new().expect("tmp");
    let (corpus, _) = open(&settings(&tmp, false)).await;
    corpus.ingest(&corpus_chunks()).await.expect("ingest");
    let (health, hits) = tokio::join!(corpus.health(), corpus.lexical_search("rag_documents", "shelter", 3));
    assert_eq!(health, HealthLevel::Available);
    assert_eq!(hits.expect("search")[0].chunk.chunk_id, "shelter_0");
}
