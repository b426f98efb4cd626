//! fusedb-text
//!
//! Tantivy-backed inverted index for the two term-based strategies: OR-of-terms
//! lexical matching over chunk `content`, and weighted term-expansion matching
//! over the precomputed `expansion` field. See `index`, `search` and `expansion`.
pub mod expansion;
pub mod index;
pub mod schema;
pub mod search;

pub use expansion::TableExpander;
pub use index::TextIndex;
