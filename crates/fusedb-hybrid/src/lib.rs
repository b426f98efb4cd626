//! fusedb-hybrid
//!
//! Runs the lexical, sparse-expansion and dense-vector strategies against a
//! corpus store, fuses their rankings with Reciprocal Rank Fusion and bounds
//! the whole query with a time budget. `LocalCorpus` is the on-disk store built
//! from a tantivy index and a LanceDB table.
pub mod corpus;
pub mod fusion;
pub mod orchestrator;
pub mod strategy;

pub use corpus::LocalCorpus;
pub use fusion::fuse;
pub use orchestrator::HybridRetriever;
pub use strategy::{DenseVectorStrategy, LexicalStrategy, RetrievalStrategy, SparseExpansionStrategy};
