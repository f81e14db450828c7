//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_PREDICT__TOP_K=10`). Typed sections
//! fall back to their defaults when absent.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::types::LexicalMode;

/// Location and table names of the disease index bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub path: String,
    pub diseases_table: String,
    pub idf_table: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            path: "models/medical_biencoder/index".to_string(),
            diseases_table: "diseases".to_string(),
            idf_table: "idf".to_string(),
        }
    }
}

impl IndexSettings {
    pub fn resolved_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.path) }
}

/// Query encoder artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Directory holding `config.json`, `tokenizer.json` and `pytorch_model.bin`.
    pub dir: Option<String>,
    pub max_len: usize,
    /// Output size of the hashing embedder used when `APP_USE_FAKE_EMBEDDINGS=1`.
    pub fake_dim: usize,
}

impl Default for ModelSettings {
    fn default() -> Self { Self { dir: None, max_len: 128, fake_dim: 768 } }
}

/// Caller policy defaults for `predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictSettings {
    pub top_k: usize,
    pub min_score: f32,
    pub lexical_mode: LexicalMode,
    pub embed_timeout_ms: u64,
}

impl Default for PredictSettings {
    fn default() -> Self { Self { top_k: 5, min_score: 0.25, lexical_mode: LexicalMode::Wexact, embed_timeout_ms: 5_000 } }
}

impl PredictSettings {
    pub fn embed_timeout(&self) -> Duration { Duration::from_millis(self.embed_timeout_ms) }
}

/// Optional override of the built-in rule tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub path: Option<String>,
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    /// Build from an in-memory TOML document, without files or environment.
    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        let config = Self { figment: Figment::from(Toml::string(toml)) };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn index(&self) -> anyhow::Result<IndexSettings> { self.section("index") }

    pub fn model(&self) -> anyhow::Result<ModelSettings> { self.section("model") }

    pub fn predict(&self) -> anyhow::Result<PredictSettings> { self.section("predict") }

    pub fn rules(&self) -> anyhow::Result<RuleSettings> { self.section("rules") }

    fn section<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.figment.contains(key) { self.get(key) } else { Ok(T::default()) }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let predict = self.predict()?;
        if predict.top_k == 0 {
            return Err(Error::InvalidConfig("predict.top_k must be at least 1".into()).into());
        }
        if !predict.min_score.is_finite() {
            return Err(Error::InvalidConfig("predict.min_score must be finite".into()).into());
        }
        if predict.embed_timeout_ms == 0 {
            return Err(Error::InvalidConfig("predict.embed_timeout_ms must be positive".into()).into());
        }
        let model = self.model()?;
        if model.max_len == 0 || model.fake_dim == 0 {
            return Err(Error::InvalidConfig("model.max_len and model.fake_dim must be positive".into()).into());
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
