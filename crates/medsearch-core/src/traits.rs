/// Boundary to the external embedding service.
///
/// Implementations turn a query's symptom tokens into a vector of length
/// `dim()` with L2 norm ≈ 1. The scorer relies on that normalisation and does
/// not re-check it.
pub trait QueryEmbedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_tokens(&self, tokens: &[String]) -> anyhow::Result<Vec<f32>>;
}
