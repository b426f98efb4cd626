//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_RETRIEVAL__RRF_K=30`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load `config.toml` and the `RUST_ENV` overlay from `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    /// Extract and validate the full settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub cache: CacheSettings,
    pub corpus: CorpusSettings,
    pub embedding: EmbeddingSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.rrf_k == 0 { return Err(Error::InvalidConfig("retrieval.rrf_k must be positive".into())); }
        if r.hybrid_candidate_multiplier == 0 { return Err(Error::InvalidConfig("retrieval.hybrid_candidate_multiplier must be positive".into())); }
        if r.knn_candidate_factor == 0 { return Err(Error::InvalidConfig("retrieval.knn_candidate_factor must be positive".into())); }
        if r.query_timeout_ms == 0 { return Err(Error::InvalidConfig("retrieval.query_timeout_ms must be positive".into())); }
        if r.default_top_k == 0 || r.default_top_k > r.max_top_k {
            return Err(Error::InvalidConfig(format!("retrieval.default_top_k must be in 1..={}", r.max_top_k)));
        }
        if self.cache.max_size == 0 { return Err(Error::InvalidConfig("cache.max_size must be positive".into())); }
        if self.embedding.dim == 0 { return Err(Error::InvalidConfig("embedding.dim must be positive".into())); }
        if self.corpus.collection.trim().is_empty() { return Err(Error::InvalidConfig("corpus.collection must not be empty".into())); }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// RRF smoothing constant.
    pub rrf_k: u32,
    /// Candidate pool per strategy in hybrid mode is `top_k * hybrid_candidate_multiplier`.
    pub hybrid_candidate_multiplier: usize,
    /// kNN scans `k * knn_candidate_factor` candidates.
    pub knn_candidate_factor: usize,
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Total budget for one query; late strategies count as empty.
    pub query_timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { rrf_k: 60, hybrid_candidate_multiplier: 2, knn_candidate_factor: 2, default_top_k: 5, max_top_k: 20, query_timeout_ms: 5_000 }
    }
}

impl RetrievalSettings {
    pub fn query_timeout(&self) -> Duration { Duration::from_millis(self.query_timeout_ms) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_size: usize,
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self { Self { max_size: 1_000, ttl_secs: 3_600 } }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub collection: String,
    /// Root directory holding `<collection>/text` and `<collection>/vectors`.
    pub root_dir: String,
    /// JSON expansion table; sparse search is unavailable without it.
    pub expansion_table: Option<String>,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self { collection: "rag_documents".to_string(), root_dir: "data/corpus".to_string(), expansion_table: None }
    }
}

impl CorpusSettings {
    pub fn root_path(&self) -> PathBuf { expand_path(&self.root_dir) }
    pub fn expansion_table_path(&self) -> Option<PathBuf> { self.expansion_table.as_deref().map(expand_path) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Bert,
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model_dir: String,
    pub dim: usize,
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { provider: EmbeddingProvider::Bert, model_dir: "models/all-MiniLM-L6-v2".to_string(), dim: 384, max_len: 256 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
