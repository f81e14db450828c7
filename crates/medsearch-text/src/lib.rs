//! medsearch-text
//!
//! Token-overlap scoring between a query's symptom tokens and a disease's
//! symptom list. See `lexical` for the four scoring modes and `ngram` for the
//! character n-gram helper used by fuzzy matching.

pub mod lexical;
pub mod ngram;

pub use lexical::lexical_score;
pub use ngram::char_ngrams;
