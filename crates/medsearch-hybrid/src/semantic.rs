use medsearch_core::error::{Error, Result};
use medsearch_index::EmbeddingMatrix;

/// `matrix · query`, one score per row. Both sides are expected to be
/// unit-length already; nothing is normalized here.
pub fn semantic_scores(matrix: &EmbeddingMatrix, query: &[f32]) -> Result<Vec<f32>> {
    if query.len() != matrix.dim() {
        return Err(Error::DimensionMismatch { expected: matrix.dim(), actual: query.len() });
    }
    Ok(matrix.iter_rows().map(|row| dot(row, query)).collect())
}

fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }
