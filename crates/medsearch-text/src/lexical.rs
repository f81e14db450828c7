use std::collections::BTreeSet;

use medsearch_core::types::{IdfTable, LexicalMode};

use crate::ngram::char_ngrams;

const FUZZY_GRAM: usize = 2;

/// Token-overlap score in `[0, 1]` between query tokens and a document's symptoms.
///
/// Empty strings on either side are ignored; if nothing remains on one side
/// the score is 0. With [`LexicalMode::Wexact`] and an entirely empty IDF
/// table every term weighs 1, which reduces to plain Jaccard.
pub fn lexical_score<Q, D>(query_tokens: &[Q], doc_symptoms: &[D], mode: LexicalMode, idf: &IdfTable) -> f32
where
    Q: AsRef<str>,
    D: AsRef<str>,
{
    let q: Vec<&str> = query_tokens.iter().map(AsRef::as_ref).filter(|t| !t.is_empty()).collect();
    let d: Vec<&str> = doc_symptoms.iter().map(AsRef::as_ref).filter(|t| !t.is_empty()).collect();
    if q.is_empty() || d.is_empty() {
        return 0.0;
    }

    match mode {
        LexicalMode::None => 0.0,
        LexicalMode::Exact => {
            let (q_set, d_set) = (to_set(&q), to_set(&d));
            jaccard(&q_set, &d_set)
        }
        LexicalMode::Wexact => weighted_jaccard(&to_set(&q), &to_set(&d), idf),
        LexicalMode::Fuzzy => {
            let q_grams = grams(&q);
            let d_grams = grams(&d);
            if q_grams.is_empty() || d_grams.is_empty() {
                return 0.0;
            }
            jaccard(&q_grams, &d_grams)
        }
    }
}

fn to_set<'a>(tokens: &[&'a str]) -> BTreeSet<&'a str> { tokens.iter().copied().collect() }

fn grams(tokens: &[&str]) -> BTreeSet<String> {
    tokens.iter().flat_map(|t| char_ngrams(t, FUZZY_GRAM)).collect()
}

fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f32 {
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    if union == 0 { 0.0 } else { inter as f32 / union as f32 }
}

/// Terms are summed in sorted order so repeated queries give identical bits.
fn weighted_jaccard(q: &BTreeSet<&str>, d: &BTreeSet<&str>, idf: &IdfTable) -> f32 {
    let weight = |t: &str| -> f64 { if idf.is_empty() { 1.0 } else { f64::from(idf.get(t).max(0.0)) } };
    let inter: f64 = q.intersection(d).map(|t| weight(t)).sum();
    let union: f64 = q.union(d).map(|t| weight(t)).sum();
    if union <= 0.0 {
        return 0.0;
    }
    (inter / union) as f32
}
