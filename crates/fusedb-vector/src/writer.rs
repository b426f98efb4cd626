use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use fusedb_core::types::ChunkReference;

use crate::schema::build_chunk_schema;
use crate::table::{ensure_table, open_db};

const WRITE_BATCH: usize = 1000;

/// One LanceDB table of chunk vectors, keyed by `chunk_id`.
pub struct VectorIndex { pub(crate) db: Connection, pub(crate) table_name: String, pub(crate) dim: usize }

impl VectorIndex {
	/// Connect to the database at `db_path` and make sure the table exists.
	pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
		std::fs::create_dir_all(db_path)?;
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		ensure_table(&db, table_name, build_chunk_schema(dim as i32)).await?;
		debug!(table = table_name, dim, "vector table ready");
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	pub fn dim(&self) -> usize { self.dim }

	pub async fn count(&self) -> Result<usize> {
		let table = self.db.open_table(&self.table_name).execute().await?;
		Ok(table.count_rows(None).await?)
	}

	/// Insert or replace chunks by `chunk_id`; `vectors[i]` belongs to `chunks[i]`.
	pub async fn upsert(&self, chunks: &[ChunkReference], vectors: &[Vec<f32>]) -> Result<usize> {
		if chunks.is_empty() { return Ok(0); }
		if chunks.len() != vectors.len() { return Err(anyhow!("{} chunks but {} vectors", chunks.len(), vectors.len())); }
		if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
			return Err(anyhow!("vector has {} dims, table expects {}", bad.len(), self.dim));
		}
		let table = self.db.open_table(&self.table_name).execute().await?;
		for (cs, vs) in chunks.chunks(WRITE_BATCH).zip(vectors.chunks(WRITE_BATCH)) {
			let batch = self.to_record_batch(cs, vs)?;
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_chunk_schema(self.dim as i32)));
			let mut mi = table.merge_insert(&["chunk_id"]);
			mi.when_matched_update_all(None).when_not_matched_insert_all();
			let _ = mi.execute(reader).await?;
			debug!(rows = cs.len(), table = %self.table_name, "merged vector batch");
		}
		Ok(chunks.len())
	}

	pub async fn clear(&self) -> Result<()> {
		let table = self.db.open_table(&self.table_name).execute().await?;
		table.delete("chunk_id IS NOT NULL").await?;
		info!(table = %self.table_name, "vector table cleared");
		Ok(())
	}

	fn to_record_batch(&self, chunks: &[ChunkReference], vectors: &[Vec<f32>]) -> Result<RecordBatch> {
		let mut ids = Vec::new(); let mut contents = Vec::new(); let mut titles = Vec::new(); let mut links = Vec::new(); let mut vecs: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		for (c, v) in chunks.iter().zip(vectors) { ids.push(c.chunk_id.clone()); contents.push(c.content.clone()); titles.push(c.source_title.clone()); links.push(c.source_link.clone()); vecs.push(Some(v.iter().map(|&x| Some(x)).collect())); }
		let record_batch = RecordBatch::try_new(build_chunk_schema(self.dim as i32), vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(contents)),
			Arc::new(StringArray::from(titles)),
			Arc::new(StringArray::from(links)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vecs.into_iter(), self.dim as i32)),
		])?;
		Ok(record_batch)
	}
}
