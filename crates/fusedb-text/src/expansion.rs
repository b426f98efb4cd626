//! Precomputed term-expansion model.
//!
//! The table maps an analyzed input term to weighted vocabulary terms, e.g. an
//! export of a learned sparse encoder's top activations per token:
//!
//! ```json
//! { "water": { "purification": 0.8, "drinking": 0.6 } }
//! ```
//!
//! Every input term also expands to itself with weight 1.0. When a term is
//! reached more than once the highest weight wins.
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tantivy::tokenizer::TokenStream;
use tracing::info;

use fusedb_core::traits::TermExpander;

use crate::schema::content_analyzer;

pub struct TableExpander {
	model_id: String,
	table: HashMap<String, Vec<(String, f32)>>,
}

impl TableExpander {
	pub fn from_map(model_id: impl Into<String>, table: HashMap<String, HashMap<String, f32>>) -> Self {
		let table = table
			.into_iter()
			.map(|(term, expansions)| {
				let mut expansions: Vec<(String, f32)> = expansions.into_iter().filter(|(_, w)| *w > 0.0).map(|(t, w)| (normalize_term(&t), w)).collect();
				expansions.sort_by(|a, b| a.0.cmp(&b.0));
				(normalize_term(&term), expansions)
			})
			.collect();
		Self { model_id: model_id.into(), table }
	}

	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).with_context(|| format!("reading expansion table {}", path.display()))?;
		let table: HashMap<String, HashMap<String, f32>> = serde_json::from_str(&raw).with_context(|| format!("parsing expansion table {}", path.display()))?;
		let model_id = path.file_stem().map_or_else(|| "expansion-table".to_string(), |s| s.to_string_lossy().to_string());
		info!(path = %path.display(), terms = table.len(), "loaded term expansion table");
		Ok(Self::from_map(model_id, table))
	}
}

impl TermExpander for TableExpander {
	fn model_id(&self) -> &str { &self.model_id }

	fn expand(&self, text: &str) -> Result<Vec<(String, f32)>> {
		let mut weights: BTreeMap<String, f32> = BTreeMap::new();
		let mut bump = |term: &str, w: f32| { let e = weights.entry(term.to_string()).or_insert(0.0); if w > *e { *e = w; } };
		let mut analyzer = content_analyzer();
		let mut stream = analyzer.token_stream(text);
		while stream.advance() {
			let term = stream.token().text.clone();
			bump(&term, 1.0);
			if let Some(expansions) = self.table.get(&term) { for (t, w) in expansions { bump(t, *w); } }
		}
		let mut out: Vec<(String, f32)> = weights.into_iter().collect();
		out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		Ok(out)
	}
}

/// Expansion terms are indexed with a whitespace tokenizer, so they must be single tokens.
pub fn normalize_term(term: &str) -> String { term.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_") }
