use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

pub const CONTENT_TOKENIZER: &str = "content_with_stopwords";
pub const EXPANSION_TOKENIZER: &str = "expansion_terms";

#[derive(Clone, Copy, Debug)]
pub struct TextFields {
	pub chunk_id: Field,
	pub content: Field,
	pub expansion: Field,
	pub source_title: Field,
	pub source_link: Field,
}

impl TextFields {
	pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			chunk_id: schema.get_field("chunk_id")?,
			content: schema.get_field("content")?,
			expansion: schema.get_field("expansion")?,
			source_title: schema.get_field("source_title")?,
			source_link: schema.get_field("source_link")?,
		})
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("chunk_id", STRING | STORED);
	let content_indexing = TextFieldIndexing::default().set_tokenizer(CONTENT_TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	schema_builder.add_text_field("content", TextOptions::default().set_indexing_options(content_indexing).set_stored());
	// Expansion weights are encoded as term frequency, so positions are not needed.
	let expansion_indexing = TextFieldIndexing::default().set_tokenizer(EXPANSION_TOKENIZER).set_index_option(IndexRecordOption::WithFreqs);
	schema_builder.add_text_field("expansion", TextOptions::default().set_indexing_options(expansion_indexing));
	schema_builder.add_text_field("source_title", STORED);
	schema_builder.add_text_field("source_link", STORED);
	schema_builder.build()
}

pub fn content_analyzer() -> TextAnalyzer {
	let stop_words = [
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(str::to_string)))
		.build()
}

pub fn register_tokenizers(index: &Index) {
	index.tokenizers().register(CONTENT_TOKENIZER, content_analyzer());
	index.tokenizers().register(EXPANSION_TOKENIZER, TextAnalyzer::builder(WhitespaceTokenizer::default()).build());
}
