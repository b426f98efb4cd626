use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tantivy::directory::MmapDirectory;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use fusedb_core::traits::TermExpander;
use fusedb_core::types::ChunkReference;

use crate::schema::{build_schema, register_tokenizers, TextFields};

/// Upper bound on how often one expansion term is repeated in the field.
const MAX_TERM_REPEAT: usize = 100;
/// Weight-to-frequency scale: weight 1.0 is written 10 times.
const WEIGHT_SCALE: f32 = 10.0;
const WRITER_HEAP_BYTES: usize = 50_000_000;

pub struct TextIndex {
	pub(crate) index: Index,
	pub(crate) reader: IndexReader,
	pub(crate) fields: TextFields,
	pub(crate) expander: Option<Arc<dyn TermExpander>>,
}

impl TextIndex {
	/// Open the index in `index_dir`, creating it when the directory holds none.
	pub fn open_or_create(index_dir: &Path, expander: Option<Arc<dyn TermExpander>>) -> Result<Self> {
		std::fs::create_dir_all(index_dir).with_context(|| format!("creating {}", index_dir.display()))?;
		let dir = MmapDirectory::open(index_dir)?;
		let index = Index::open_or_create(dir, build_schema())?;
		Self::from_index(index, expander)
	}

	/// Open an existing index; fails when `index_dir` holds none.
	pub fn open(index_dir: &Path, expander: Option<Arc<dyn TermExpander>>) -> Result<Self> {
		let index = Index::open_in_dir(index_dir).with_context(|| format!("opening text index {}", index_dir.display()))?;
		Self::from_index(index, expander)
	}

	pub fn in_memory(expander: Option<Arc<dyn TermExpander>>) -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()), expander)
	}

	fn from_index(index: Index, expander: Option<Arc<dyn TermExpander>>) -> Result<Self> {
		register_tokenizers(&index);
		let fields = TextFields::resolve(&index.schema())?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, fields, expander })
	}

	pub fn has_expander(&self) -> bool { self.expander.is_some() }

	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }

	/// Re-read index metadata from storage; fails when the directory is gone or corrupt.
	pub fn probe(&self) -> Result<()> {
		self.index.searchable_segment_metas()?;
		Ok(())
	}

	/// Insert or replace chunks keyed by `chunk_id`. Expansion terms are computed
	/// here when an expander is configured; otherwise the field stays empty.
	pub fn upsert(&self, chunks: &[ChunkReference]) -> Result<usize> {
		if chunks.is_empty() { return Ok(0); }
		let mut writer: IndexWriter = self.index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
		for c in chunks {
			let expansion = match &self.expander { Some(e) => encode_expansion(&e.expand(&c.content)?), None => String::new() };
			writer.delete_term(Term::from_field_text(self.fields.chunk_id, &c.chunk_id));
			let doc: TantivyDocument = doc!(
				self.fields.chunk_id => c.chunk_id.clone(),
				self.fields.content => c.content.clone(),
				self.fields.expansion => expansion,
				self.fields.source_title => c.source_title.clone(),
				self.fields.source_link => c.source_link.clone(),
			);
			writer.add_document(doc)?;
		}
		writer.commit()?;
		self.reader.reload()?;
		debug!(chunks = chunks.len(), "text index upsert committed");
		Ok(chunks.len())
	}

	pub fn clear(&self) -> Result<()> {
		let mut writer: IndexWriter = self.index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
		writer.delete_all_documents()?;
		writer.commit()?;
		self.reader.reload()?;
		info!("text index cleared");
		Ok(())
	}
}

/// Encode weighted terms as a whitespace-separated list where the repeat count
/// carries the weight.
pub fn encode_expansion(terms: &[(String, f32)]) -> String {
	let mut out = Vec::new();
	for (term, weight) in terms {
		if term.is_empty() || !weight.is_finite() || *weight <= 0.0 { continue; }
		let repeat = ((weight * WEIGHT_SCALE).round() as usize).clamp(1, MAX_TERM_REPEAT);
		out.extend(std::iter::repeat(term.as_str()).take(repeat));
	}
	out.join(" ")
}
