//! Domain types shared by the corpus backends, the strategies and fusion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;

/// One indexed unit of text.
///
/// - `chunk_id`: globally unique, stable across re-ingestion of the same content region
/// - `content`: the chunk text, opaque to fusion
/// - `source_title`/`source_link`: provenance, carried through unchanged
///
/// `chunk_id` is the only identity used to merge results across strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReference {
    pub chunk_id: ChunkId,
    pub content: String,
    pub source_title: String,
    pub source_link: String,
}

/// A raw hit as returned by the corpus store, before rank assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusHit {
    pub chunk: ChunkReference,
    pub score: f32,
}

/// The three ranking strategies, in fusion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Lexical,
    SparseExpansion,
    DenseVector,
}

impl StrategyKind {
    /// Order in which `fuse` visits strategies; decides tie-breaks and payload selection.
    pub const FUSION_ORDER: [StrategyKind; 3] = [Self::Lexical, Self::SparseExpansion, Self::DenseVector];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::SparseExpansion => "sparse_expansion",
            Self::DenseVector => "dense_vector",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A chunk as ranked by a single strategy.
///
/// `strategy_score` is only meaningful inside `strategy`. `rank` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk: ChunkReference,
    pub strategy: StrategyKind,
    pub strategy_score: f32,
    pub rank: usize,
}

/// Where a fused result was seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyHit {
    pub strategy: StrategyKind,
    pub rank: usize,
    pub strategy_score: f32,
}

/// A chunk in the final ranking of one query.
///
/// In hybrid mode `fusion_score` is the RRF sum; in single-strategy mode it is
/// the sparse strategy's native score. `hits` lists every contributing strategy
/// in fusion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub chunk: ChunkReference,
    pub fusion_score: f64,
    pub hits: Vec<StrategyHit>,
}

/// How the orchestrator answers a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Sparse-expansion only, no fusion.
    SingleStrategy,
    /// All three strategies fused with RRF.
    Hybrid,
}

impl FromStr for StrategyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(Self::Hybrid),
            "single_strategy" | "sparse" | "elser" => Ok(Self::SingleStrategy),
            other => Err(Error::InvalidArgument(format!("unknown strategy mode: {other}"))),
        }
    }
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleStrategy => f.write_str("single_strategy"),
            Self::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// Liveness of the corpus store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Available,
    Degraded,
    Unavailable,
}

impl HealthLevel {
    pub fn is_usable(self) -> bool { !matches!(self, Self::Unavailable) }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => f.write_str("available"),
            Self::Degraded => f.write_str("degraded"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}
