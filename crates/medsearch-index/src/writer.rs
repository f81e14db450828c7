//! Materialise an index bundle from in-memory records.
//!
//! The directory at `path` is replaced: an existing bundle is removed first.

use anyhow::{anyhow, Result};
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use medsearch_core::config::IndexSettings;
use medsearch_core::types::{DiseaseRecord, IdfTable};

use crate::schema::{build_diseases_schema, build_idf_schema};
use crate::table::open_db;

pub async fn write_index(path: &Path, settings: &IndexSettings, records: &[DiseaseRecord], idf: &IdfTable) -> Result<()> {
    let dim = records.first().map(|r| r.embedding.len()).ok_or_else(|| anyhow!("no records to write"))?;
    if dim == 0 { return Err(anyhow!("records carry empty embeddings")); }
    if let Some(bad) = records.iter().find(|r| r.embedding.len() != dim) {
        return Err(anyhow!("record '{}' has dimension {}, expected {}", bad.name, bad.embedding.len(), dim));
    }

    if path.exists() { std::fs::remove_dir_all(path)?; }
    std::fs::create_dir_all(path)?;
    let conn = open_db(&path.to_string_lossy()).await?;

    let diseases = diseases_batch(records, dim)?;
    let schema = diseases.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(diseases)].into_iter(), schema));
    conn.create_table(&settings.diseases_table, reader).execute().await?;

    let idf_batch = idf_batch(idf)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(idf_batch)].into_iter(), build_idf_schema()));
    conn.create_table(&settings.idf_table, reader).execute().await?;

    info!(path = %path.display(), entries = records.len(), dim, idf_terms = idf.len(), "wrote disease index");
    Ok(())
}

fn diseases_batch(records: &[DiseaseRecord], dim: usize) -> Result<RecordBatch> {
    let dim = i32::try_from(dim)?;
    let mut ids = Vec::with_capacity(records.len());
    let mut names = Vec::with_capacity(records.len());
    let mut categories = Vec::with_capacity(records.len());
    let mut symptoms = Vec::with_capacity(records.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
    for (i, r) in records.iter().enumerate() {
        ids.push(i32::try_from(i)?);
        names.push(r.name.clone());
        categories.push(r.category.clone());
        symptoms.push(serde_json::to_string(&r.symptoms)?);
        vectors.push(Some(r.embedding.iter().map(|&x| Some(x)).collect()));
    }
    Ok(RecordBatch::try_new(
        build_diseases_schema(dim),
        vec![
            Arc::new(Int32Array::from(ids)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(categories)),
            Arc::new(StringArray::from(symptoms)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim)),
        ],
    )?)
}

fn idf_batch(idf: &IdfTable) -> Result<RecordBatch> {
    let (terms, weights): (Vec<String>, Vec<f32>) = idf.sorted_pairs().into_iter().map(|(t, w)| (t.to_string(), w)).unzip();
    Ok(RecordBatch::try_new(
        build_idf_schema(),
        vec![Arc::new(StringArray::from(terms)), Arc::new(Float32Array::from(weights))],
    )?)
}
