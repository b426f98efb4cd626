//! Query orchestration: strategy fan-out, time budget, fusion and truncation.
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use fusedb_core::config::{RetrievalSettings, Settings};
use fusedb_core::traits::{CorpusStore, Embedder};
use fusedb_core::types::{FusedResult, HealthLevel, RankedResult, StrategyHit, StrategyMode};
use fusedb_core::{Error, Result};
use fusedb_vector::{CacheStats, EmbeddingCache};

use crate::fusion::fuse;
use crate::strategy::{DenseVectorStrategy, LexicalStrategy, RetrievalStrategy, SparseExpansionStrategy};

/// Entry point for queries. Holds the store, the three strategies and the
/// embedding cache shared by every query.
pub struct HybridRetriever {
    store: Arc<dyn CorpusStore>,
    lexical: Arc<dyn RetrievalStrategy>,
    sparse: Arc<dyn RetrievalStrategy>,
    dense: Arc<dyn RetrievalStrategy>,
    cache: Arc<EmbeddingCache>,
    settings: RetrievalSettings,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn CorpusStore>, embedder: Arc<dyn Embedder>, settings: &Settings) -> Self {
        let cache = Arc::new(EmbeddingCache::from_settings(&settings.cache));
        let collection = settings.corpus.collection.as_str();
        let lexical = Arc::new(LexicalStrategy::new(Arc::clone(&store), collection));
        let sparse = Arc::new(SparseExpansionStrategy::new(Arc::clone(&store), collection));
        let dense = Arc::new(DenseVectorStrategy::new(Arc::clone(&store), collection, embedder, Arc::clone(&cache), settings.retrieval.knn_candidate_factor));
        Self::with_strategies(store, cache, lexical, sparse, dense, settings.retrieval.clone())
    }

    /// Assemble a retriever from explicit strategies.
    pub fn with_strategies(
        store: Arc<dyn CorpusStore>,
        cache: Arc<EmbeddingCache>,
        lexical: Arc<dyn RetrievalStrategy>,
        sparse: Arc<dyn RetrievalStrategy>,
        dense: Arc<dyn RetrievalStrategy>,
        settings: RetrievalSettings,
    ) -> Self {
        Self { store, lexical, sparse, dense, cache, settings }
    }

    /// Fails with `BackendUnavailable` when the store cannot serve queries at all.
    pub async fn initialize(&self) -> Result<HealthLevel> {
        let health = self.store.health().await;
        if !health.is_usable() {
            return Err(Error::BackendUnavailable("corpus store reported unavailable".into()));
        }
        if health == HealthLevel::Degraded {
            warn!("corpus store is degraded, some strategies may return nothing");
        }
        info!(%health, "retriever initialized");
        Ok(health)
    }

    /// Rank chunks for `query`. At most `top_k` results; an empty list means no evidence.
    pub async fn search(&self, query: &str, mode: StrategyMode, top_k: usize) -> Result<Vec<FusedResult>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be a positive integer".into()));
        }
        let start = Instant::now();
        let results = match mode {
            StrategyMode::SingleStrategy => self.search_single(query, top_k).await,
            StrategyMode::Hybrid => self.search_hybrid(query, top_k).await,
        };
        info!(%mode, top_k, results = results.len(), elapsed_ms = start.elapsed().as_millis() as u64, "query complete");
        Ok(results)
    }

    async fn search_single(&self, query: &str, top_k: usize) -> Vec<FusedResult> {
        let ranked = bounded(self.sparse.as_ref(), query, top_k, self.settings.query_timeout()).await;
        ranked
            .into_iter()
            .take(top_k)
            .map(|r| FusedResult {
                fusion_score: f64::from(r.strategy_score),
                hits: vec![StrategyHit { strategy: r.strategy, rank: r.rank, strategy_score: r.strategy_score }],
                chunk: r.chunk,
            })
            .collect()
    }

    async fn search_hybrid(&self, query: &str, top_k: usize) -> Vec<FusedResult> {
        let pool = top_k.saturating_mul(self.settings.hybrid_candidate_multiplier);
        let budget = self.settings.query_timeout();
        let (lexical, sparse, dense) = tokio::join!(
            bounded(self.lexical.as_ref(), query, pool, budget),
            bounded(self.sparse.as_ref(), query, pool, budget),
            bounded(self.dense.as_ref(), query, pool, budget),
        );
        debug!(lexical = lexical.len(), sparse = sparse.len(), dense = dense.len(), "strategy lists collected");
        let mut fused = fuse(&[lexical, sparse, dense], self.settings.rrf_k);
        fused.truncate(top_k);
        fused
    }

    pub async fn health(&self) -> HealthLevel { self.store.health().await }

    pub fn cache_stats(&self) -> CacheStats { self.cache.stats() }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("embedding cache cleared");
    }

    /// Release the store. Later queries degrade to empty results.
    pub async fn close(&self) -> Result<()> { self.store.close().await }
}

/// Run one strategy within `budget`; running out of time counts as an empty list.
async fn bounded(strategy: &dyn RetrievalStrategy, query: &str, top_k: usize, budget: Duration) -> Vec<RankedResult> {
    match tokio::time::timeout(budget, strategy.search(query, top_k)).await {
        Ok(results) => results,
        Err(_) => {
            warn!(strategy = %strategy.kind(), budget_ms = budget.as_millis() as u64, "strategy timed out, contributing no results");
            Vec::new()
        }
    }
}
