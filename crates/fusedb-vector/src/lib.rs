//! fusedb-vector
//!
//! LanceDB table of chunk vectors for the dense-vector strategy, and the
//! in-memory query embedding cache that sits in front of the embedding model.
pub mod cache;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use cache::{CacheStats, EmbeddingCache};
pub use writer::VectorIndex;
