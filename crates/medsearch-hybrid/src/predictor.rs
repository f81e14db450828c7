use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

use medsearch_core::config::PredictSettings;
use medsearch_core::error::{Error, Result};
use medsearch_core::traits::QueryEmbedder;
use medsearch_core::types::{tokenize, LexicalMode, Prediction, PredictionRecord, Query, ScoredCandidate};
use medsearch_index::IndexStore;
use medsearch_text::lexical_score;

use crate::rank::rank;
use crate::rules::RuleEngine;
use crate::semantic::semantic_scores;

/// Query API over one loaded index.
///
/// Cheap to clone; every field is shared read-only, so clones can serve
/// concurrent queries.
#[derive(Clone)]
pub struct DiseasePredictor {
    index: Arc<IndexStore>,
    embedder: Arc<dyn QueryEmbedder>,
    rules: Arc<RuleEngine>,
    settings: PredictSettings,
}

impl DiseasePredictor {
    /// Fails when the encoder and the index disagree on dimensionality.
    pub fn new(index: Arc<IndexStore>, embedder: Arc<dyn QueryEmbedder>, rules: RuleEngine, settings: PredictSettings) -> Result<Self> {
        if embedder.dim() != index.dim() {
            return Err(Error::DimensionMismatch { expected: index.dim(), actual: embedder.dim() });
        }
        info!(
            entries = index.len(),
            dim = index.dim(),
            encoder_max_len = embedder.max_len(),
            rules_version = rules.tables().version,
            top_k = settings.top_k,
            min_score = settings.min_score,
            lexical_mode = %settings.lexical_mode,
            "disease predictor ready"
        );
        Ok(Self { index, embedder, rules: Arc::new(rules), settings })
    }

    pub fn index(&self) -> &IndexStore { &self.index }

    pub fn rules(&self) -> &RuleEngine { &self.rules }

    pub fn settings(&self) -> &PredictSettings { &self.settings }

    /// Longest input, in tokenizer ids, the encoder reads before truncating.
    pub fn encoder_max_len(&self) -> usize { self.embedder.max_len() }

    /// `predict` with the configured `top_k`, `min_score` and lexical mode.
    pub async fn predict_default(&self, raw_text: &str) -> Result<Prediction> {
        self.predict(raw_text, self.settings.top_k, self.settings.min_score, self.settings.lexical_mode).await
    }

    /// Rank diseases for a free-text symptom query.
    ///
    /// Blank input gives an empty prediction. Encoder problems are returned as
    /// [`Error::EmbeddingUnavailable`]; anything that goes wrong after the query
    /// vector is known is logged and answered with an empty, failed prediction.
    pub async fn predict(&self, raw_text: &str, top_k: usize, min_score: f32, mode: LexicalMode) -> Result<Prediction> {
        check_request(top_k, min_score)?;
        let tokens = tokenize(raw_text);
        if tokens.is_empty() {
            return Ok(Prediction::empty(tokens));
        }

        let embedding = self.embed(tokens.clone()).await?;
        let query = Query { raw_text: raw_text.to_string(), tokens, embedding };

        match catch_unwind(AssertUnwindSafe(|| self.score_query(&query, top_k, min_score, mode))) {
            Ok(Ok(results)) => {
                debug!(tokens = ?query.tokens, returned = results.len(), "query ranked");
                Ok(Prediction { query: query.tokens, results, failure: None })
            }
            Ok(Err(e)) => {
                error!(error = %e, tokens = ?query.tokens, "scoring failed");
                Ok(Prediction::failed(query.tokens, e.to_string()))
            }
            Err(_) => {
                error!(tokens = ?query.tokens, "scoring panicked");
                Ok(Prediction::failed(query.tokens, "scoring panicked"))
            }
        }
    }

    /// Run the encoder off the async runtime, bounded by the configured timeout.
    pub async fn embed(&self, tokens: Vec<String>) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let timeout = self.settings.embed_timeout();
        let task = tokio::task::spawn_blocking(move || embedder.embed_tokens(&tokens));
        let embedding = match tokio::time::timeout(timeout, task).await {
            Err(_) => return Err(Error::EmbeddingUnavailable(format!("no answer within {timeout:?}"))),
            Ok(Err(join)) => return Err(Error::EmbeddingUnavailable(format!("encoder task failed: {join}"))),
            Ok(Ok(Err(e))) => return Err(Error::EmbeddingUnavailable(e.to_string())),
            Ok(Ok(Ok(v))) => v,
        };
        if embedding.is_empty() || embedding.iter().all(|x| *x == 0.0) {
            return Err(Error::EmbeddingUnavailable("encoder returned an empty vector".into()));
        }
        Ok(embedding)
    }

    /// Synchronous scoring core, used once the query vector is known.
    pub fn score_query(&self, query: &Query, top_k: usize, min_score: f32, mode: LexicalMode) -> Result<Vec<PredictionRecord>> {
        check_request(top_k, min_score)?;
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(rank(self.score_candidates(query, mode)?, min_score, top_k))
    }

    /// One candidate per index entry, in index order, with the cascade applied.
    pub fn score_candidates<'a>(&'a self, query: &Query, mode: LexicalMode) -> Result<Vec<ScoredCandidate<'a>>> {
        let semantic = semantic_scores(self.index.matrix(), &query.embedding)?;
        let ctx = self.rules.context(query);
        let idf = self.index.idf();
        Ok(self
            .index
            .entries()
            .iter()
            .zip(semantic)
            .map(|(entry, semantic_score)| ScoredCandidate {
                entry,
                semantic_score,
                lexical_score: lexical_score(&query.tokens, &entry.symptoms, mode, idf),
                final_score: self.rules.apply(&ctx, entry, semantic_score),
            })
            .collect())
    }
}

fn check_request(top_k: usize, min_score: f32) -> Result<()> {
    if top_k == 0 {
        return Err(Error::InvalidRequest("top_k must be at least 1".into()));
    }
    if !min_score.is_finite() {
        return Err(Error::InvalidRequest(format!("min_score must be finite, got {min_score}")));
    }
    Ok(())
}
