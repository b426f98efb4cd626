use anyhow::{anyhow, Result};
use std::collections::HashSet;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{TantivyDocument, Term};

use fusedb_core::types::{ChunkReference, CorpusHit};

use crate::index::TextIndex;

impl TextIndex {
	/// BM25 over `content`, any query term may match.
	pub fn lexical_search(&self, query: &str, size: usize) -> Result<Vec<CorpusHit>> {
		let mut analyzer = self.index.tokenizer_for_field(self.fields.content)?;
		let mut stream = analyzer.token_stream(query);
		let mut seen = HashSet::new();
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
		while stream.advance() {
			let text = stream.token().text.clone();
			if !seen.insert(text.clone()) { continue; }
			let term = Term::from_field_text(self.fields.content, &text);
			clauses.push((Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))));
		}
		self.run(BooleanQuery::new(clauses), size)
	}

	/// Weighted term-expansion match over the `expansion` field.
	pub fn sparse_search(&self, query: &str, size: usize) -> Result<Vec<CorpusHit>> {
		let expander = self.expander.as_ref().ok_or_else(|| anyhow!("no term expansion model configured"))?;
		let clauses: Vec<(Occur, Box<dyn Query>)> = expander
			.expand(query)?
			.into_iter()
			.filter(|(t, w)| !t.is_empty() && w.is_finite() && *w > 0.0)
			.map(|(t, w)| {
				let term = Term::from_field_text(self.fields.expansion, &t);
				let q: Box<dyn Query> = Box::new(BoostQuery::new(Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)), w));
				(Occur::Should, q)
			})
			.collect();
		self.run(BooleanQuery::new(clauses), size)
	}

	fn run(&self, query: BooleanQuery, size: usize) -> Result<Vec<CorpusHit>> {
		if size == 0 || query.clauses().is_empty() { return Ok(Vec::new()); }
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(size))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let text = |field: Field| doc.get_first(field).and_then(|v| v.as_str()).unwrap_or("").to_string();
			let chunk = ChunkReference {
				chunk_id: text(self.fields.chunk_id),
				content: text(self.fields.content),
				source_title: text(self.fields.source_title),
				source_link: text(self.fields.source_link),
			};
			hits.push(CorpusHit { chunk, score });
		}
		Ok(hits)
	}
}
