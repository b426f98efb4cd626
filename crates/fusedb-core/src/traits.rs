use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CorpusHit, HealthLevel};

/// Dense sentence encoder. Vectors are L2-normalized and all have length `dim()`.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Learned term expansion: maps text onto a weighted set of vocabulary terms.
pub trait TermExpander: Send + Sync {
    fn model_id(&self) -> &str;
    fn expand(&self, text: &str) -> anyhow::Result<Vec<(String, f32)>>;
}

/// The searchable corpus. Every query is scoped to a named collection and
/// returns at most the requested number of hits, best first.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// OR-of-terms match against the chunk `content` field.
    async fn lexical_search(&self, collection: &str, query: &str, size: usize) -> Result<Vec<CorpusHit>>;

    /// Term-expansion query against the precomputed expansion field.
    async fn sparse_search(&self, collection: &str, query: &str, size: usize) -> Result<Vec<CorpusHit>>;

    /// Nearest neighbours of `vector`, scanning up to `num_candidates` internally.
    async fn knn_search(&self, collection: &str, vector: &[f32], k: usize, num_candidates: usize) -> Result<Vec<CorpusHit>>;

    async fn health(&self) -> HealthLevel;

    /// Release backend handles. Further queries may fail.
    async fn close(&self) -> Result<()> { Ok(()) }
}
