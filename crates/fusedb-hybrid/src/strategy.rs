//! Strategy adapters over a [`CorpusStore`].
//!
//! Each adapter turns store hits into a ranked list. Failures stay inside the
//! adapter: [`RetrievalStrategy::search`] logs them and answers with an empty
//! list.
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use fusedb_core::traits::{CorpusStore, Embedder};
use fusedb_core::types::{CorpusHit, RankedResult, StrategyKind};
use fusedb_core::{Error, Result};
use fusedb_vector::EmbeddingCache;

#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Up to `top_k` results by descending strategy score, ranks `1..=n`.
    async fn try_search(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>>;

    /// [`Self::try_search`], with any failure logged and turned into an empty list.
    async fn search(&self, query: &str, top_k: usize) -> Vec<RankedResult> {
        match self.try_search(query, top_k).await {
            Ok(results) => {
                debug!(strategy = %self.kind(), hits = results.len(), "strategy finished");
                results
            }
            Err(err) => {
                warn!(strategy = %self.kind(), error = %err, "strategy degraded, contributing no results");
                Vec::new()
            }
        }
    }
}

/// Order hits by score (stable for equal scores), keep `top_k`, assign ranks.
pub fn rank_hits(mut hits: Vec<CorpusHit>, strategy: StrategyKind, top_k: usize) -> Vec<RankedResult> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_k);
    hits.into_iter()
        .enumerate()
        .map(|(i, hit)| RankedResult { chunk: hit.chunk, strategy, strategy_score: hit.score, rank: i + 1 })
        .collect()
}

pub struct LexicalStrategy {
    store: Arc<dyn CorpusStore>,
    collection: String,
}

impl LexicalStrategy {
    pub fn new(store: Arc<dyn CorpusStore>, collection: impl Into<String>) -> Self { Self { store, collection: collection.into() } }
}

#[async_trait]
impl RetrievalStrategy for LexicalStrategy {
    fn kind(&self) -> StrategyKind { StrategyKind::Lexical }

    async fn try_search(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>> {
        let hits = self.store.lexical_search(&self.collection, query, top_k).await?;
        Ok(rank_hits(hits, self.kind(), top_k))
    }
}

pub struct SparseExpansionStrategy {
    store: Arc<dyn CorpusStore>,
    collection: String,
}

impl SparseExpansionStrategy {
    pub fn new(store: Arc<dyn CorpusStore>, collection: impl Into<String>) -> Self { Self { store, collection: collection.into() } }
}

#[async_trait]
impl RetrievalStrategy for SparseExpansionStrategy {
    fn kind(&self) -> StrategyKind { StrategyKind::SparseExpansion }

    async fn try_search(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>> {
        let hits = self.store.sparse_search(&self.collection, query, top_k).await?;
        Ok(rank_hits(hits, self.kind(), top_k))
    }

    async fn search(&self, query: &str, top_k: usize) -> Vec<RankedResult> {
        match self.try_search(query, top_k).await {
            Ok(results) => {
                debug!(strategy = %self.kind(), hits = results.len(), "strategy finished");
                results
            }
            // A missing expansion model is an expected deployment state.
            Err(Error::ModelUnavailable(reason)) => {
                debug!(strategy = %self.kind(), %reason, "expansion model unavailable, skipping");
                Vec::new()
            }
            Err(err) => {
                warn!(strategy = %self.kind(), error = %err, "strategy degraded, contributing no results");
                Vec::new()
            }
        }
    }
}

/// kNN over query embeddings, with embeddings served from the shared cache.
pub struct DenseVectorStrategy {
    store: Arc<dyn CorpusStore>,
    collection: String,
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    candidate_factor: usize,
}

impl DenseVectorStrategy {
    pub fn new(store: Arc<dyn CorpusStore>, collection: impl Into<String>, embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>, candidate_factor: usize) -> Self {
        Self { store, collection: collection.into(), embedder, cache, candidate_factor: candidate_factor.max(1) }
    }

    /// Cached embedding of `query`; on a miss the model is called once and the result stored.
    async fn query_vector(&self, query: &str) -> Result<Vec<f32>> {
        self.cache.record_request();
        if let Some(vector) = self.cache.get(query) {
            self.cache.record_hit();
            debug!("embedding cache hit");
            return Ok(vector);
        }
        debug!("embedding cache miss");
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let mut vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&[text]))
            .await
            .map_err(Error::operation)?
            .map_err(|e| Error::Embedding(e.to_string()))?;
        if vectors.len() != 1 {
            return Err(Error::Embedding(format!("expected one vector, model returned {}", vectors.len())));
        }
        let vector = vectors.remove(0);
        if vector.len() != self.embedder.dim() {
            return Err(Error::Embedding(format!("expected {} dims, model returned {}", self.embedder.dim(), vector.len())));
        }
        self.cache.put(query, vector.clone());
        Ok(vector)
    }
}

#[async_trait]
impl RetrievalStrategy for DenseVectorStrategy {
    fn kind(&self) -> StrategyKind { StrategyKind::DenseVector }

    async fn try_search(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.query_vector(query).await?;
        let num_candidates = top_k.saturating_mul(self.candidate_factor);
        let hits = self.store.knn_search(&self.collection, &vector, top_k, num_candidates).await?;
        Ok(rank_hits(hits, self.kind(), top_k))
    }
}
