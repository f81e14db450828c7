//! Deterministic rerank cascade applied on top of the semantic score.
//!
//! Per document, in order:
//! - A: single-symptom common-disease boost, or multi-symptom match tiering plus
//!   the non-core penalty;
//! - B: rare-disease and specialist-department suppression;
//! - C: per-disease common boost.
//!
//! Multipliers compound on one running score and are never capped. The tables
//! are versioned data (`rules/rules.v1.toml`) rather than code.

use figment::providers::{Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::debug;

use medsearch_core::error::{Error, Result};
use medsearch_core::types::{IndexEntry, Query};

const BUILTIN_RULES: &str = include_str!("../rules/rules.v1.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multipliers {
    pub single_symptom_common: f32,
    pub full_match: f32,
    pub high_ratio: f32,
    pub mid_ratio: f32,
    pub low_ratio: f32,
    pub no_match: f32,
    pub non_core: f32,
    pub rare: f32,
    pub specialist: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high_ratio: f64,
    pub mid_ratio: f64,
    pub low_ratio: f64,
    pub fuzzy_hit: f64,
    pub specialist_max_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTables {
    pub version: u32,
    pub very_common: BTreeSet<String>,
    pub rare_diseases: BTreeSet<String>,
    pub specialist_departments: BTreeSet<String>,
    pub specialist_keywords: Vec<String>,
    pub multipliers: Multipliers,
    pub thresholds: Thresholds,
    pub symptom_common: BTreeMap<String, BTreeSet<String>>,
    pub common_boost: BTreeMap<String, f32>,
}

impl RuleTables {
    /// The tables shipped with the crate.
    pub fn builtin() -> Result<Self> { Self::from_figment(Figment::from(Toml::string(BUILTIN_RULES))) }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::InvalidConfig(format!("rule file {} not found", path.display())));
        }
        Self::from_figment(Figment::from(Toml::file(path)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let tables: Self = figment.extract().map_err(|e| Error::InvalidConfig(format!("rule tables: {e}")))?;
        tables.validate()?;
        Ok(tables)
    }

    fn validate(&self) -> Result<()> {
        let m = &self.multipliers;
        let named = [
            ("single_symptom_common", m.single_symptom_common),
            ("full_match", m.full_match),
            ("high_ratio", m.high_ratio),
            ("mid_ratio", m.mid_ratio),
            ("low_ratio", m.low_ratio),
            ("no_match", m.no_match),
            ("non_core", m.non_core),
            ("rare", m.rare),
            ("specialist", m.specialist),
        ];
        let boosts = self.common_boost.iter().map(|(k, v)| (k.as_str(), *v));
        if let Some((name, v)) = named.into_iter().chain(boosts).find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(Error::InvalidConfig(format!("multiplier '{name}' must be positive, got {v}")));
        }
        let t = &self.thresholds;
        if !(t.high_ratio >= t.mid_ratio && t.mid_ratio >= t.low_ratio) {
            return Err(Error::InvalidConfig("ratio thresholds must satisfy high >= mid >= low".into()));
        }
        Ok(())
    }
}

/// Step A tier for multi-symptom queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    FullMatch,
    High,
    Mid,
    Low,
    Poor,
}

/// Overlap between the unique query tokens and one document's symptoms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchStats {
    pub exact_count: usize,
    /// Exact hits plus fractional credit for substring hits.
    pub matched: f64,
    /// Harmonic mean of query-side and document-side coverage.
    pub ratio: f64,
}

/// Everything the cascade needs from the query, computed once per query.
#[derive(Debug, Clone)]
pub struct QueryContext<'q> {
    unique: HashSet<&'q str>,
    single_common: HashSet<&'q str>,
    specialist_keyword: bool,
}

impl QueryContext<'_> {
    pub fn unique_count(&self) -> usize { self.unique.len() }
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    tables: RuleTables,
}

impl RuleEngine {
    pub fn new(tables: RuleTables) -> Self { Self { tables } }

    pub fn builtin() -> Result<Self> { Ok(Self::new(RuleTables::builtin()?)) }

    pub fn tables(&self) -> &RuleTables { &self.tables }

    pub fn context<'q>(&'q self, query: &'q Query) -> QueryContext<'q> {
        let unique = query.unique_tokens();
        let mut single_common = HashSet::new();
        if unique.len() == 1 {
            if let Some(token) = unique.iter().next() {
                for (key, diseases) in &self.tables.symptom_common {
                    if token.contains(key.as_str()) {
                        single_common.extend(diseases.iter().map(String::as_str));
                    }
                }
            }
        }
        let joined = query.tokens.join(" ");
        let specialist_keyword = self.tables.specialist_keywords.iter().any(|k| joined.contains(k.as_str()));
        QueryContext { unique, single_common, specialist_keyword }
    }

    /// Run the full cascade for one document starting from `base`.
    pub fn apply(&self, ctx: &QueryContext<'_>, entry: &IndexEntry, base: f32) -> f32 {
        let t = &self.tables;
        let m = &t.multipliers;
        let k = ctx.unique_count();
        let mut score = base;

        // Step A
        if k == 1 {
            if ctx.single_common.contains(entry.name.as_str()) {
                score *= m.single_symptom_common;
            }
        } else if k >= 2 {
            // No symptoms to overlap with: lowest tier.
            let tier = if entry.has_symptoms() {
                self.tier(&self.match_stats(&ctx.unique, entry.symptom_set()), k)
            } else {
                MatchTier::Poor
            };
            if tier == MatchTier::FullMatch {
                debug!(name = %entry.name, matched = k, "full symptom match");
            }
            score *= self.tier_multiplier(tier);
            if !t.very_common.contains(&entry.name) {
                score *= m.non_core;
            }
        }

        // Step B
        if t.rare_diseases.contains(&entry.name) {
            score *= m.rare;
        }
        if k <= t.thresholds.specialist_max_tokens
            && t.specialist_departments.contains(&entry.category)
            && !ctx.specialist_keyword
        {
            score *= m.specialist;
        }

        // Step C
        if let Some(boost) = t.common_boost.get(&entry.name) {
            score *= boost;
        }
        score
    }

    pub fn match_stats(&self, query: &HashSet<&str>, doc: &HashSet<String>) -> MatchStats {
        let exact: HashSet<&str> = query.iter().copied().filter(|q| doc.contains(*q)).collect();
        let exact_count = exact.len();
        let remaining_doc: Vec<&str> = doc.iter().map(String::as_str).filter(|d| !exact.contains(d)).collect();
        let fuzzy_hits = query
            .iter()
            .filter(|q| !exact.contains(*q))
            .filter(|q| remaining_doc.iter().any(|d| d.contains(**q) || q.contains(*d)))
            .count();
        let matched = exact_count as f64 + fuzzy_hits as f64 * self.tables.thresholds.fuzzy_hit;

        let ratio_q = matched / query.len().max(1) as f64;
        let ratio_d = matched / doc.len().max(1) as f64;
        let ratio = if ratio_q > 0.0 || ratio_d > 0.0 { 2.0 * ratio_q * ratio_d / (ratio_q + ratio_d).max(1e-9) } else { 0.0 };
        MatchStats { exact_count, matched, ratio }
    }

    pub fn tier(&self, stats: &MatchStats, k: usize) -> MatchTier {
        let t = &self.tables.thresholds;
        if k >= 2 && stats.exact_count == k {
            MatchTier::FullMatch
        } else if stats.ratio >= t.high_ratio {
            MatchTier::High
        } else if stats.ratio >= t.mid_ratio {
            MatchTier::Mid
        } else if stats.ratio >= t.low_ratio {
            MatchTier::Low
        } else {
            MatchTier::Poor
        }
    }

    pub fn tier_multiplier(&self, tier: MatchTier) -> f32 {
        let m = &self.tables.multipliers;
        match tier {
            MatchTier::FullMatch => m.full_match,
            MatchTier::High => m.high_ratio,
            MatchTier::Mid => m.mid_ratio,
            MatchTier::Low => m.low_ratio,
            MatchTier::Poor => m.no_match,
        }
    }

    /// Smallest and largest combined multiplier the tables can produce.
    ///
    /// Steps are bounded independently, so the result may be looser than what
    /// any single disease can reach. Built-in tables: `(0.08316, 2.025)`.
    pub fn multiplier_bounds(&self) -> (f32, f32) {
        let m = &self.tables.multipliers;
        let tiers = [m.full_match, m.high_ratio, m.mid_ratio, m.low_ratio, m.no_match];
        let min_tier = tiers.iter().copied().fold(f32::INFINITY, f32::min);
        let max_tier = tiers.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let boosts = self.tables.common_boost.values().copied();
        let min_boost = boosts.clone().fold(1.0, f32::min);
        let max_boost = boosts.fold(1.0, f32::max);

        let lower_a = [1.0, m.single_symptom_common, min_tier, min_tier * m.non_core.min(1.0)].into_iter().fold(f32::INFINITY, f32::min);
        let upper_a = [1.0, m.single_symptom_common, max_tier * m.non_core.max(1.0)].into_iter().fold(f32::NEG_INFINITY, f32::max);
        let lower_b = m.rare.min(1.0) * m.specialist.min(1.0);
        let upper_b = m.rare.max(1.0) * m.specialist.max(1.0);
        (lower_a * lower_b * min_boost, upper_a * upper_b * max_boost)
    }
}
