use anyhow::{anyhow, Result};
use std::path::PathBuf;

use medsearch_core::config::PredictSettings;
use medsearch_core::types::LexicalMode;

/// Flags shared by `query`, `selftest` and `batch`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub min_score: f32,
    pub mode: LexicalMode,
    pub json: bool,
}

impl QueryOptions {
    pub fn from_settings(settings: &PredictSettings) -> Self {
        Self { top_k: settings.top_k, min_score: settings.min_score, mode: settings.lexical_mode, json: false }
    }
}

/// Parse `[--topk N] [--min-score X] [--lexical MODE] [--json]` out of `args`.
/// Everything else is returned as positional arguments, in order.
pub fn parse_query_options(args: &[String], defaults: &PredictSettings) -> Result<(QueryOptions, Vec<String>)> {
    let mut opts = QueryOptions::from_settings(defaults);
    let mut positional = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--topk" | "-k" => {
                let v = value(args, i)?;
                opts.top_k = v.parse().map_err(|_| anyhow!("--topk requires a positive integer, got '{v}'"))?;
                if opts.top_k == 0 { return Err(anyhow!("--topk must be at least 1")); }
                i += 1;
            }
            "--min-score" => {
                let v = value(args, i)?;
                opts.min_score = v.parse().map_err(|_| anyhow!("--min-score requires a number, got '{v}'"))?;
                if !opts.min_score.is_finite() { return Err(anyhow!("--min-score must be finite")); }
                i += 1;
            }
            "--lexical" => {
                opts.mode = value(args, i)?.parse()?;
                i += 1;
            }
            "--json" => opts.json = true,
            flag if flag.starts_with("--") => return Err(anyhow!("unknown flag {flag}")),
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }
    Ok((opts, positional))
}

/// `batch <file>` input path.
pub fn batch_input(positional: &[String]) -> Result<PathBuf> {
    match positional {
        [path] => Ok(PathBuf::from(path)),
        [] => Err(anyhow!("batch requires an input file")),
        _ => Err(anyhow!("batch takes exactly one input file")),
    }
}

fn value(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1).map(String::as_str).ok_or_else(|| anyhow!("{} requires a value", args[i]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(xs: &[&str]) -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn defaults_come_from_settings() {
        let (opts, rest) = parse_query_options(&strs(&["头痛", "发热"]), &PredictSettings::default()).expect("parse");
        assert_eq!(opts.top_k, 5);
        assert_eq!(opts.mode, LexicalMode::Wexact);
        assert!(!opts.json);
        assert_eq!(rest, strs(&["头痛", "发热"]));
    }

    #[test]
    fn flags_override_defaults() {
        let args = strs(&["--topk", "10", "头痛", "--min-score", "0.3", "--lexical", "fuzzy", "--json"]);
        let (opts, rest) = parse_query_options(&args, &PredictSettings::default()).expect("parse");
        assert_eq!(opts, QueryOptions { top_k: 10, min_score: 0.3, mode: LexicalMode::Fuzzy, json: true });
        assert_eq!(rest, strs(&["头痛"]));
    }

    #[test]
    fn bad_values_are_errors() {
        let d = PredictSettings::default();
        assert!(parse_query_options(&strs(&["--topk", "0"]), &d).is_err());
        assert!(parse_query_options(&strs(&["--topk"]), &d).is_err());
        assert!(parse_query_options(&strs(&["--lexical", "bm25"]), &d).is_err());
        assert!(parse_query_options(&strs(&["--min-score", "NaN"]), &d).is_err());
        assert!(parse_query_options(&strs(&["--verbose"]), &d).is_err());
    }

    #[test]
    fn batch_needs_one_file() {
        assert!(batch_input(&[]).is_err());
        assert_eq!(batch_input(&strs(&["q.txt"])).expect("path"), PathBuf::from("q.txt"));
    }
}
