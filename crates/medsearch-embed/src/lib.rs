//! Query tower of the symptom bi-encoder.
//!
//! [`BertEncoder`] runs the fine-tuned BERT checkpoint with candle;
//! [`FakeEmbedder`] is a deterministic hashing stand-in selected with
//! `APP_USE_FAKE_EMBEDDINGS=1` for tests and development. Both return
//! L2-normalized vectors.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use medsearch_core::config::ModelSettings;
use medsearch_core::error::Error;
use medsearch_core::traits::QueryEmbedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;

/// Marker the encoder was trained to read in front of symptom lists.
pub const SYMPTOM_MARKER: &str = "[SYM]";

const DEFAULT_MODEL_DIR: &str = "models/medical_biencoder/biencoder";
const MODEL_FILES: [&str; 3] = ["config.json", "tokenizer.json", "pytorch_model.bin"];

/// `"[SYM] a b c"`, or an empty string when no token is non-empty.
pub fn format_query(tokens: &[String]) -> String {
    let kept: Vec<&str> = tokens.iter().map(String::as_str).filter(|t| !t.is_empty()).collect();
    if kept.is_empty() { return String::new(); }
    format!("{} {}", SYMPTOM_MARKER, kept.join(" "))
}

pub struct BertEncoder { model: BertModel, tokenizer: Tokenizer, device: Device, max_len: usize, dim: usize }

impl BertEncoder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading query encoder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_text = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&config_text)?;
        let dim = serde_json::from_str::<serde_json::Value>(&config_text)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;
        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?;
        let weights_map: std::collections::HashMap<String, candle_core::Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        info!(dim, max_len, "query encoder ready");
        Ok(Self { model, tokenizer, device, max_len, dim })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize::tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        if emb.len() != self.dim {
            return Err(anyhow!("encoder produced {} values, expected {}", emb.len(), self.dim));
        }
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 { warn!(?elapsed, "slow query embedding"); } else { debug!(?elapsed, "query embedded"); }
        Ok(emb)
    }
}

impl QueryEmbedder for BertEncoder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_tokens(&self, tokens: &[String]) -> Result<Vec<f32>> {
        let text = format_query(tokens);
        if text.is_empty() { return Err(anyhow!("nothing to embed")); }
        self.embed_text(&text)
    }
}

/// Hashes each token (and its character bigrams, at half weight) into a fixed
/// number of buckets. Related symptoms such as "头痛"/"偏头痛" share buckets.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder { pub fn new(dim: usize) -> Self { Self { dim } } }

impl FakeEmbedder {
    fn bucket(&self, s: &str) -> (usize, f32) {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut hasher = XxHash64::with_seed(0); s.hash(&mut hasher); let h = hasher.finish();
        ((h as usize) % self.dim, 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32) * 0.5)
    }
}

impl QueryEmbedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_tokens(&self, tokens: &[String]) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        for token in tokens.iter().filter(|t| !t.is_empty()) {
            let (idx, val) = self.bucket(token); v[idx] += val;
            let chars: Vec<char> = token.chars().collect();
            for w in chars.windows(2) { let (idx, val) = self.bucket(&w.iter().collect::<String>()); v[idx] += 0.5 * val; }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 { return Err(anyhow!("nothing to embed")); }
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}

/// Encoder chosen by the environment: the hashing embedder when
/// `APP_USE_FAKE_EMBEDDINGS` is `1`/`true`, otherwise the BERT checkpoint.
/// Missing artifacts are fatal.
pub fn get_default_embedder(settings: &ModelSettings) -> medsearch_core::error::Result<Arc<dyn QueryEmbedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake { info!(dim = settings.fake_dim, "using FakeEmbedder"); return Ok(Arc::new(FakeEmbedder::new(settings.fake_dim))); }
    let dir = resolve_model_dir(settings)?;
    let encoder = BertEncoder::load(&dir, settings.max_len).map_err(|e| Error::MissingModel(format!("{}: {}", dir.display(), e)))?;
    Ok(Arc::new(encoder))
}

fn resolve_model_dir(settings: &ModelSettings) -> medsearch_core::error::Result<PathBuf> {
    let candidates = [
        settings.dir.clone(),
        std::env::var("APP_MODEL_DIR").ok(),
        std::env::var("MODEL_DIR").ok(),
        Some(DEFAULT_MODEL_DIR.to_string()),
    ];
    for dir in candidates.into_iter().flatten() {
        let p = medsearch_core::config::expand_path(&dir);
        if !p.is_dir() { continue; }
        if let Some(missing) = MODEL_FILES.iter().find(|f| !p.join(f).exists()) {
            return Err(Error::MissingModel(format!("{} lacks {}", p.display(), missing)));
        }
        info!(dir = %p.display(), "using model dir");
        return Ok(p);
    }
    Err(Error::MissingModel("could not locate the bi-encoder model directory".into()))
}
