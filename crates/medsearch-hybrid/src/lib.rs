//! Hybrid disease ranking: semantic base scores, the rule cascade, and the
//! ranker, tied together by [`DiseasePredictor`].

pub mod predictor;
pub mod rank;
pub mod rules;
pub mod semantic;

pub use predictor::DiseasePredictor;
pub use rank::rank;
pub use rules::{MatchStats, MatchTier, QueryContext, RuleEngine, RuleTables};
pub use semantic::semantic_scores;
