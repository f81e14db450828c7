//! Domain types shared by the index, scorers and the predictor facade.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Field markers the bi-encoder was trained with. They never count as symptoms.
pub const FIELD_MARKERS: [&str; 5] = ["[SYM]", "[DESC]", "[CAUSE]", "[CAT]", "[SEP]"];

/// Number of symptoms copied into each result record.
pub const RESULT_SYMPTOM_LIMIT: usize = 5;

/// Token-overlap flavour used for the reported lexical score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LexicalMode {
    /// Semantic-only retrieval; lexical score is always 0.
    None,
    /// Unweighted Jaccard over symptom tokens.
    Exact,
    /// IDF-weighted Jaccard over symptom tokens.
    Wexact,
    /// Jaccard over character 2-grams.
    Fuzzy,
}

impl LexicalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Exact => "exact",
            Self::Wexact => "wexact",
            Self::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for LexicalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for LexicalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "exact" => Ok(Self::Exact),
            "wexact" => Ok(Self::Wexact),
            "fuzzy" => Ok(Self::Fuzzy),
            other => Err(Error::InvalidRequest(format!(
                "unknown lexical mode '{other}' (expected none, exact, wexact or fuzzy)"
            ))),
        }
    }
}

/// Symptom term → inverse document frequency. Absent terms weigh 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdfTable {
    weights: HashMap<String, f32>,
}

impl IdfTable {
    pub fn new() -> Self { Self::default() }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        Self { weights: pairs.into_iter().map(|(t, w)| (t.into(), w)).collect() }
    }

    pub fn get(&self, term: &str) -> f32 { self.weights.get(term).copied().unwrap_or(0.0) }

    pub fn len(&self) -> usize { self.weights.len() }

    pub fn is_empty(&self) -> bool { self.weights.is_empty() }

    /// Pairs sorted by term, so writers produce the same bundle for the same table.
    pub fn sorted_pairs(&self) -> Vec<(&str, f32)> {
        let mut pairs: Vec<(&str, f32)> = self.weights.iter().map(|(t, w)| (t.as_str(), *w)).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

/// One disease row as handed to the index writer or an in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseRecord {
    pub name: String,
    pub category: String,
    pub symptoms: Vec<String>,
    pub embedding: Vec<f32>,
}

/// A loaded index row. `id` is the row position; the embedding lives in the
/// store's matrix at the same position.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: usize,
    pub name: String,
    pub category: String,
    pub symptoms: Vec<String>,
    /// Set when the serialized symptom list could not be parsed at load time.
    pub symptoms_malformed: bool,
    symptom_set: HashSet<String>,
}

impl IndexEntry {
    /// Empty symptom strings are dropped and duplicates collapsed, keeping first occurrence order.
    pub fn new(id: usize, name: String, category: String, symptoms: Vec<String>, symptoms_malformed: bool) -> Self {
        let mut symptom_set = HashSet::with_capacity(symptoms.len());
        let symptoms: Vec<String> = symptoms
            .into_iter()
            .filter(|s| !s.is_empty())
            .filter(|s| symptom_set.insert(s.clone()))
            .collect();
        Self { id, name, category, symptoms, symptoms_malformed, symptom_set }
    }

    pub fn symptom_set(&self) -> &HashSet<String> { &self.symptom_set }

    pub fn has_symptoms(&self) -> bool { !self.symptoms.is_empty() }
}

/// A single transient query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub raw_text: String,
    /// Whitespace-delimited tokens in input order, field markers removed.
    pub tokens: Vec<String>,
    pub embedding: Vec<f32>,
}

impl Query {
    pub fn new(raw_text: impl Into<String>, embedding: Vec<f32>) -> Self {
        let raw_text = raw_text.into();
        let tokens = tokenize(&raw_text);
        Self { raw_text, tokens, embedding }
    }

    pub fn unique_tokens(&self) -> HashSet<&str> { self.tokens.iter().map(String::as_str).collect() }

    pub fn is_empty(&self) -> bool { self.tokens.is_empty() }
}

/// Split raw query text on whitespace and drop encoder field markers.
pub fn tokenize(raw_text: &str) -> Vec<String> {
    raw_text
        .split_whitespace()
        .filter(|t| !FIELD_MARKERS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Per-query working record for one index entry.
#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub entry: &'a IndexEntry,
    pub semantic_score: f32,
    pub lexical_score: f32,
    pub final_score: f32,
}

/// A ranked result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub name: String,
    pub category: String,
    pub score: f32,
    pub semantic_score: f32,
    pub lexical_score: f32,
    pub symptoms: Vec<String>,
}

impl PredictionRecord {
    pub fn from_candidate(candidate: &ScoredCandidate<'_>) -> Self {
        let entry = candidate.entry;
        Self {
            name: entry.name.clone(),
            category: entry.category.clone(),
            score: candidate.final_score,
            semantic_score: candidate.semantic_score,
            lexical_score: candidate.lexical_score,
            symptoms: entry.symptoms.iter().take(RESULT_SYMPTOM_LIMIT).cloned().collect(),
        }
    }
}

/// Outcome of one `predict` call.
///
/// `failure` is set when scoring failed and the query was answered fail-open
/// with an empty result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub query: Vec<String>,
    pub results: Vec<PredictionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Prediction {
    pub fn empty(query: Vec<String>) -> Self { Self { query, results: Vec::new(), failure: None } }

    pub fn failed(query: Vec<String>, failure: impl Into<String>) -> Self {
        Self { query, results: Vec::new(), failure: Some(failure.into()) }
    }

    pub fn is_failure(&self) -> bool { self.failure.is_some() }
}
