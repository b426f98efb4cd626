//! On-disk corpus store: a tantivy index for the lexical and sparse-expansion
//! fields and a LanceDB table for vectors, both keyed by `chunk_id`.
//!
//! Layout under `corpus.root_dir`:
//!
//! ```text
//! <collection>/text/     tantivy index
//! <collection>/vectors/  LanceDB database, table "chunks"
//! ```
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use fusedb_core::config::CorpusSettings;
use fusedb_core::traits::{CorpusStore, Embedder, TermExpander};
use fusedb_core::types::{ChunkReference, CorpusHit, HealthLevel};
use fusedb_core::{Error, Result};
use fusedb_text::{TableExpander, TextIndex};
use fusedb_vector::VectorIndex;

const VECTOR_TABLE: &str = "chunks";
const EMBED_BATCH: usize = 32;

pub struct LocalCorpus {
    collection: String,
    text: Arc<TextIndex>,
    vectors: VectorIndex,
    embedder: Arc<dyn Embedder>,
    closed: AtomicBool,
}

impl LocalCorpus {
    /// Open or create the collection named in `settings`. A configured but
    /// unreadable expansion table leaves sparse search unavailable rather than failing.
    pub async fn open(settings: &CorpusSettings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let root = settings.root_path().join(&settings.collection);
        let expander: Option<Arc<dyn TermExpander>> = match settings.expansion_table_path() {
            Some(path) => match TableExpander::load(&path) {
                Ok(table) => {
                    info!(model = table.model_id(), "sparse expansion model ready");
                    Some(Arc::new(table))
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "expansion table unavailable, sparse search disabled");
                    None
                }
            },
            None => None,
        };
        let text = TextIndex::open_or_create(&root.join("text"), expander).map_err(|e| Error::BackendUnavailable(format!("text index: {e:#}")))?;
        let vectors = VectorIndex::open(&root.join("vectors"), VECTOR_TABLE, embedder.dim())
            .await
            .map_err(|e| Error::BackendUnavailable(format!("vector table: {e:#}")))?;
        info!(collection = %settings.collection, root = %root.display(), docs = text.num_docs(), "corpus opened");
        Ok(Self::from_parts(settings.collection.clone(), text, vectors, embedder))
    }

    pub fn from_parts(collection: impl Into<String>, text: TextIndex, vectors: VectorIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self { collection: collection.into(), text: Arc::new(text), vectors, embedder, closed: AtomicBool::new(false) }
    }

    pub fn collection(&self) -> &str { &self.collection }

    pub fn num_docs(&self) -> u64 { self.text.num_docs() }

    /// Embed and index `chunks`, replacing any existing chunk with the same id.
    pub async fn ingest(&self, chunks: &[ChunkReference]) -> Result<usize> {
        self.ensure_open()?;
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let embedder = Arc::clone(&self.embedder);
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
                .await
                .map_err(Error::operation)?
                .map_err(|e| Error::Embedding(e.to_string()))?;
            if embedded.len() != batch.len() {
                return Err(Error::Embedding(format!("{} texts but {} vectors", batch.len(), embedded.len())));
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != self.vectors.dim()) {
                return Err(Error::Embedding(format!("model returned {} dims, vector table expects {}", bad.len(), self.vectors.dim())));
            }
            vectors.extend(embedded);
        }
        let text = Arc::clone(&self.text);
        let owned = chunks.to_vec();
        tokio::task::spawn_blocking(move || text.upsert(&owned)).await.map_err(Error::operation)?.map_err(Error::operation)?;
        if let Err(err) = self.vectors.upsert(chunks, &vectors).await {
            // text is already committed; dense search misses these chunks until they are ingested again
            warn!(collection = %self.collection, chunks = chunks.len(), error = %err, "vector upsert failed after text commit, stores diverge");
            return Err(Error::operation(err));
        }
        info!(collection = %self.collection, chunks = chunks.len(), "ingested chunks");
        Ok(chunks.len())
    }

    /// Remove every chunk from both stores.
    pub async fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let text = Arc::clone(&self.text);
        tokio::task::spawn_blocking(move || text.clear()).await.map_err(Error::operation)?.map_err(Error::operation)?;
        self.vectors.clear().await.map_err(Error::operation)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::BackendUnavailable(format!("corpus '{}' is closed", self.collection)));
        }
        Ok(())
    }

    fn check_collection(&self, collection: &str) -> Result<()> {
        self.ensure_open()?;
        if collection != self.collection {
            return Err(Error::NotFound(format!("collection '{collection}'")));
        }
        Ok(())
    }
}

#[async_trait]
impl CorpusStore for LocalCorpus {
    async fn lexical_search(&self, collection: &str, query: &str, size: usize) -> Result<Vec<CorpusHit>> {
        self.check_collection(collection)?;
        let text = Arc::clone(&self.text);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || text.lexical_search(&query, size)).await.map_err(Error::operation)?.map_err(Error::operation)
    }

    async fn sparse_search(&self, collection: &str, query: &str, size: usize) -> Result<Vec<CorpusHit>> {
        self.check_collection(collection)?;
        if !self.text.has_expander() {
            return Err(Error::ModelUnavailable("no term expansion table configured".into()));
        }
        let text = Arc::clone(&self.text);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || text.sparse_search(&query, size)).await.map_err(Error::operation)?.map_err(Error::operation)
    }

    async fn knn_search(&self, collection: &str, vector: &[f32], k: usize, num_candidates: usize) -> Result<Vec<CorpusHit>> {
        self.check_collection(collection)?;
        self.vectors.knn(vector, k, num_candidates).await.map_err(Error::operation)
    }

    async fn health(&self) -> HealthLevel {
        if self.closed.load(Ordering::Acquire) {
            return HealthLevel::Unavailable;
        }
        let text = Arc::clone(&self.text);
        let text_ok = match tokio::task::spawn_blocking(move || text.probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "text index probe failed");
                false
            }
            Err(err) => {
                warn!(error = %err, "text index probe task failed");
                false
            }
        };
        let vectors_ok = match self.vectors.count().await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "vector table probe failed");
                false
            }
        };
        match (text_ok, vectors_ok) {
            (true, true) => HealthLevel::Available,
            (false, false) => HealthLevel::Unavailable,
            _ => HealthLevel::Degraded,
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(collection = %self.collection, "corpus closed");
        }
        Ok(())
    }
}
