use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use fusedb_core::types::{ChunkReference, CorpusHit};

use crate::writer::VectorIndex;

impl VectorIndex {
	/// Cosine kNN. Scores are `1 - distance`, so higher is closer. `num_candidates`
	/// widens the refine step and never shrinks the result below `k`.
	pub async fn knn(&self, vector: &[f32], k: usize, num_candidates: usize) -> Result<Vec<CorpusHit>> {
		if k == 0 { return Ok(Vec::new()); }
		if vector.len() != self.dim { return Err(anyhow!("query vector has {} dims, table expects {}", vector.len(), self.dim)); }
		let table = self.db.open_table(&self.table_name).execute().await?;
		let refine = (num_candidates.max(k) / k).max(1) as u32;
		let mut stream = table
			.vector_search(vector.to_vec())?
			.column("vector")
			.distance_type(DistanceType::Cosine)
			.refine_factor(refine)
			.limit(k)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
			read_hits(&batch, &mut hits)?;
		}
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(k);
		Ok(hits)
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("missing {name} column"))
}

fn read_hits(batch: &RecordBatch, out: &mut Vec<CorpusHit>) -> Result<()> {
	let ids = string_col(batch, "chunk_id")?;
	let contents = string_col(batch, "content")?;
	let titles = string_col(batch, "source_title")?;
	let links = string_col(batch, "source_link")?;
	let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>()).ok_or_else(|| anyhow!("missing _distance column"))?;
	for i in 0..batch.num_rows() {
		if distances.is_null(i) { continue; }
		let chunk = ChunkReference {
			chunk_id: ids.value(i).to_string(),
			content: contents.value(i).to_string(),
			source_title: titles.value(i).to_string(),
			source_link: links.value(i).to_string(),
		};
		out.push(CorpusHit { chunk, score: 1.0 - distances.value(i) });
	}
	Ok(())
}
