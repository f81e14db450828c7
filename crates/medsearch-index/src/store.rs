//! Read-only disease index held for the lifetime of the process.
//!
//! The store is built once at startup and never mutated, so a single
//! `Arc<IndexStore>` can be shared by any number of concurrent queries.

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray};
use std::path::Path;
use tracing::{info, warn};

use medsearch_core::config::IndexSettings;
use medsearch_core::error::{Error, Result};
use medsearch_core::types::{DiseaseRecord, IdfTable, IndexEntry};

use crate::schema::{COL_CATEGORY, COL_ID, COL_NAME, COL_SYMPTOMS, COL_TERM, COL_VECTOR, COL_WEIGHT};
use crate::table::{open_db, read_all, table_exists};

/// Rows whose L2 norm is further than this from 1 are reported at load.
pub const NORM_TOLERANCE: f32 = 1e-3;

/// Row-major `N × D` embedding matrix.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(Error::Operation(format!("matrix of {} values cannot have {} columns", data.len(), dim)));
        }
        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn rows(&self) -> usize { self.data.len() / self.dim }

    pub fn row(&self, i: usize) -> &[f32] { &self.data[i * self.dim..(i + 1) * self.dim] }

    pub fn iter_rows(&self) -> std::slice::ChunksExact<'_, f32> { self.data.chunks_exact(self.dim) }
}

pub struct IndexStore {
    entries: Vec<IndexEntry>,
    matrix: EmbeddingMatrix,
    idf: IdfTable,
    malformed: usize,
}

/// One decoded row before symptom parsing.
struct RawRow {
    id: i32,
    name: String,
    category: String,
    symptoms: String,
    vector: Vec<f32>,
}

impl IndexStore {
    /// Load the bundle at `path`. Any structural problem is a [`Error::MissingIndex`].
    pub async fn load(path: &Path, settings: &IndexSettings) -> Result<Self> {
        if !path.exists() {
            return Err(Error::missing_index(path, "path does not exist"));
        }
        let uri = path.to_string_lossy().to_string();
        let missing = |e: anyhow::Error| Error::missing_index(path, e.to_string());

        let conn = open_db(&uri).await.map_err(missing)?;
        if !table_exists(&conn, &settings.diseases_table).await.map_err(missing)? {
            return Err(Error::missing_index(path, format!("table '{}' not found", settings.diseases_table)));
        }
        let batches = read_all(&conn, &settings.diseases_table).await.map_err(missing)?;
        let mut rows = Vec::new();
        for batch in &batches {
            decode_disease_batch(batch, &mut rows).map_err(|reason| Error::missing_index(path, reason))?;
        }
        rows.sort_by_key(|r| r.id);

        let idf = if table_exists(&conn, &settings.idf_table).await.map_err(missing)? {
            let batches = read_all(&conn, &settings.idf_table).await.map_err(missing)?;
            decode_idf_batches(&batches).map_err(|reason| Error::missing_index(path, reason))?
        } else {
            info!(table = %settings.idf_table, "no IDF table in index bundle; weighted lexical mode will count terms");
            IdfTable::new()
        };

        let store = Self::from_raw_rows(rows, idf).map_err(|e| match e {
            Error::MissingIndex { .. } => e,
            other => Error::missing_index(path, other.to_string()),
        })?;
        info!(
            path = %path.display(),
            entries = store.len(),
            dim = store.dim(),
            idf_terms = store.idf.len(),
            malformed_symptoms = store.malformed,
            "loaded disease index"
        );
        Ok(store)
    }

    /// Build an in-memory store; symptom lists are taken as already parsed.
    pub fn from_records(records: Vec<DiseaseRecord>, idf: IdfTable) -> Result<Self> {
        let dim = records.first().map(|r| r.embedding.len()).unwrap_or(0);
        let mut entries = Vec::with_capacity(records.len());
        let mut data = Vec::with_capacity(records.len() * dim);
        for (id, record) in records.into_iter().enumerate() {
            if record.embedding.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: record.embedding.len() });
            }
            data.extend_from_slice(&record.embedding);
            entries.push(IndexEntry::new(id, record.name, record.category, record.symptoms, false));
        }
        Self::assemble(entries, dim, data, idf, 0)
    }

    fn from_raw_rows(rows: Vec<RawRow>, idf: IdfTable) -> Result<Self> {
        let dim = rows.first().map(|r| r.vector.len()).unwrap_or(0);
        let mut entries = Vec::with_capacity(rows.len());
        let mut data = Vec::with_capacity(rows.len() * dim);
        let mut malformed = 0usize;
        for (id, row) in rows.into_iter().enumerate() {
            if row.vector.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: row.vector.len() });
            }
            data.extend_from_slice(&row.vector);
            let (symptoms, bad) = parse_symptoms(&row.symptoms);
            if bad {
                malformed += 1;
                warn!(entry = id, name = %row.name, "unparseable symptom list; treating as empty");
            }
            entries.push(IndexEntry::new(id, row.name, row.category, symptoms, bad));
        }
        Self::assemble(entries, dim, data, idf, malformed)
    }

    fn assemble(entries: Vec<IndexEntry>, dim: usize, data: Vec<f32>, idf: IdfTable, malformed: usize) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Operation("index holds no entries".into()));
        }
        let matrix = EmbeddingMatrix::new(dim, data)?;
        let store = Self { entries, matrix, idf, malformed };
        let off_norm = store.matrix.iter_rows().filter(|r| (l2_norm(r) - 1.0).abs() > NORM_TOLERANCE).count();
        if off_norm > 0 {
            warn!(rows = off_norm, "embedding rows are not L2-normalized; cosine scores will be skewed");
        }
        Ok(store)
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn dim(&self) -> usize { self.matrix.dim() }

    pub fn entries(&self) -> &[IndexEntry] { &self.entries }

    pub fn entry(&self, id: usize) -> Option<&IndexEntry> { self.entries.get(id) }

    pub fn embedding(&self, id: usize) -> Option<&[f32]> { (id < self.len()).then(|| self.matrix.row(id)) }

    pub fn matrix(&self) -> &EmbeddingMatrix { &self.matrix }

    pub fn idf(&self) -> &IdfTable { &self.idf }

    /// Entries whose symptom list could not be parsed at load.
    pub fn malformed_count(&self) -> usize { self.malformed }

    /// Largest `|‖row‖₂ − 1|` over the matrix.
    pub fn max_norm_deviation(&self) -> f32 {
        self.matrix.iter_rows().map(|r| (l2_norm(r) - 1.0).abs()).fold(0.0, f32::max)
    }
}

fn l2_norm(v: &[f32]) -> f32 { v.iter().map(|x| x * x).sum::<f32>().sqrt() }

/// Returns the parsed list and whether parsing failed.
fn parse_symptoms(raw: &str) -> (Vec<String>, bool) {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => (list, false),
        Err(_) => (Vec::new(), true),
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> std::result::Result<&'a T, String> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| format!("column '{name}' missing or of unexpected type"))
}

fn decode_disease_batch(batch: &RecordBatch, out: &mut Vec<RawRow>) -> std::result::Result<(), String> {
    let ids = column::<Int32Array>(batch, COL_ID)?;
    let names = column::<StringArray>(batch, COL_NAME)?;
    let cats = column::<StringArray>(batch, COL_CATEGORY)?;
    let symps = column::<StringArray>(batch, COL_SYMPTOMS)?;
    let vecs = column::<FixedSizeListArray>(batch, COL_VECTOR)?;
    for i in 0..batch.num_rows() {
        if vecs.is_null(i) {
            return Err(format!("row {} has no embedding", ids.value(i)));
        }
        let list = vecs.value(i);
        let values = list
            .as_primitive_opt::<Float32Type>()
            .ok_or_else(|| format!("column '{COL_VECTOR}' is not a float32 list"))?;
        out.push(RawRow {
            id: ids.value(i),
            name: names.value(i).to_string(),
            category: cats.value(i).to_string(),
            symptoms: symps.value(i).to_string(),
            vector: values.values().to_vec(),
        });
    }
    Ok(())
}

fn decode_idf_batches(batches: &[RecordBatch]) -> std::result::Result<IdfTable, String> {
    let mut pairs = Vec::new();
    for batch in batches {
        let terms = column::<StringArray>(batch, COL_TERM)?;
        let weights = column::<Float32Array>(batch, COL_WEIGHT)?;
        for i in 0..batch.num_rows() {
            pairs.push((terms.value(i).to_string(), weights.value(i)));
        }
    }
    Ok(IdfTable::from_pairs(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symptom_parsing_recovers_from_bad_json() {
        assert_eq!(parse_symptoms(r#"["头痛","发热"]"#), (vec!["头痛".to_string(), "发热".to_string()], false));
        assert_eq!(parse_symptoms("['头痛'"), (Vec::new(), true));
        assert_eq!(parse_symptoms("[1, 2]"), (Vec::new(), true));
    }

    #[test]
    fn matrix_rejects_ragged_data() {
        assert!(EmbeddingMatrix::new(3, vec![0.0; 7]).is_err());
        let m = EmbeddingMatrix::new(2, vec![1.0, 0.0, 0.0, 1.0]).expect("matrix");
        assert_eq!(m.rows(), 2);
        assert_eq!(m.row(1), &[0.0, 1.0]);
    }
}
