use std::sync::Arc;
use std::time::Duration;

use medsearch_core::config::{IndexSettings, PredictSettings};
use medsearch_core::error::Error;
use medsearch_core::traits::QueryEmbedder;
use medsearch_core::types::{DiseaseRecord, IdfTable, LexicalMode, Query};
use medsearch_embed::FakeEmbedder;
use medsearch_hybrid::{DiseasePredictor, RuleEngine};
use medsearch_index::{write_index, IndexStore};

/// Returns the same vector for every query.
struct FixedEmbedder {
    dim: usize,
    vector: Vec<f32>,
}

impl QueryEmbedder for FixedEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { 128 }
    fn embed_tokens(&self, _tokens: &[String]) -> anyhow::Result<Vec<f32>> { Ok(self.vector.clone()) }
}

struct FailingEmbedder;

impl QueryEmbedder for FailingEmbedder {
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 128 }
    fn embed_tokens(&self, _tokens: &[String]) -> anyhow::Result<Vec<f32>> { Err(anyhow::anyhow!("connection refused")) }
}

struct SlowEmbedder;

impl QueryEmbedder for SlowEmbedder {
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 128 }
    fn embed_tokens(&self, _tokens: &[String]) -> anyhow::Result<Vec<f32>> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }
}

fn record(name: &str, category: &str, symptoms: &[&str], embedding: Vec<f32>) -> DiseaseRecord {
    DiseaseRecord { name: name.into(), category: category.into(), symptoms: symptoms.iter().map(|s| s.to_string()).collect(), embedding }
}

/// Against the query vector e0 the three rows score 0.60, 0.55 and 0.50.
fn three_entry_index() -> Arc<IndexStore> {
    let records = vec![
        record("感冒", "呼吸内科", &["头痛", "发热"], vec![0.6, 0.8, 0.0, 0.0]),
        record("偏头痛", "神经内科", &["头痛"], vec![0.55, 0.0, (1.0f32 - 0.55 * 0.55).sqrt(), 0.0]),
        record("骨折", "骨外科", &["疼痛"], vec![0.5, 0.0, 0.0, (1.0f32 - 0.25).sqrt()]),
    ];
    Arc::new(IndexStore::from_records(records, IdfTable::new()).expect("store"))
}

fn predictor_with(embedder: Arc<dyn QueryEmbedder>) -> DiseasePredictor {
    DiseasePredictor::new(three_entry_index(), embedder, RuleEngine::builtin().expect("rules"), PredictSettings::default())
        .expect("predictor")
}

fn e0_predictor() -> DiseasePredictor { predictor_with(Arc::new(FixedEmbedder { dim: 4, vector: vec![1.0, 0.0, 0.0, 0.0] })) }

#[tokio::test]
async fn three_entry_scenario_orders_and_scores() {
    let predictor = e0_predictor();
    let out = predictor.predict("头痛 发热", 10, 0.0, LexicalMode::Exact).await.expect("predict");
    assert!(!out.is_failure());
    assert_eq!(out.query, vec!["头痛", "发热"]);
    let names: Vec<&str> = out.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["感冒", "偏头痛", "骨折"]);

    // full match x1.40, common boost x1.35
    assert!((out.results[0].score - 0.6 * 1.40 * 1.35).abs() < 1e-4, "{}", out.results[0].score);
    // ratio 2/3 -> x1.08, very common so no x0.88, boost x1.20
    assert!((out.results[1].score - 0.55 * 1.08 * 1.20).abs() < 1e-4, "{}", out.results[1].score);
    // no overlap x0.60, non-core x0.88, specialist x0.45
    assert!((out.results[2].score - 0.5 * 0.60 * 0.88 * 0.45).abs() < 1e-4, "{}", out.results[2].score);

    assert!((out.results[0].semantic_score - 0.6).abs() < 1e-6);
    assert!((out.results[0].lexical_score - 1.0).abs() < 1e-6);
    assert!((out.results[1].lexical_score - 0.5).abs() < 1e-6);
    assert_eq!(out.results[2].lexical_score, 0.0);
}

#[tokio::test]
async fn min_score_filters_suppressed_entry() {
    let out = e0_predictor().predict("头痛 发热", 10, 0.25, LexicalMode::Wexact).await.expect("predict");
    let names: Vec<&str> = out.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["感冒", "偏头痛"]);
}

#[tokio::test]
async fn raising_min_score_never_adds_results() {
    let predictor = e0_predictor();
    let mut last = usize::MAX;
    for min_score in [-1.0, 0.0, 0.1, 0.12, 0.5, 0.72, 1.0, 1.2, 5.0] {
        let n = predictor.predict("头痛 发热", 10, min_score, LexicalMode::Exact).await.expect("predict").results.len();
        assert!(n <= last, "min_score={min_score} returned {n} after {last}");
        last = n;
    }
    assert_eq!(last, 0);
}

#[tokio::test]
async fn identical_queries_give_identical_output() {
    let predictor = e0_predictor();
    let a = predictor.predict("头痛 发热 咳嗽", 5, 0.0, LexicalMode::Fuzzy).await.expect("predict");
    let b = predictor.predict("头痛 发热 咳嗽", 5, 0.0, LexicalMode::Fuzzy).await.expect("predict");
    assert_eq!(serde_json::to_string(&a).expect("json"), serde_json::to_string(&b).expect("json"));
}

#[tokio::test]
async fn top_k_truncates() {
    let out = e0_predictor().predict("头痛 发热", 1, 0.0, LexicalMode::None).await.expect("predict");
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].name, "感冒");
    assert_eq!(out.results[0].lexical_score, 0.0);
}

#[tokio::test]
async fn blank_query_is_empty_without_calling_the_encoder() {
    let predictor = predictor_with(Arc::new(FailingEmbedder));
    for raw in ["", "   ", "[SYM] [SEP]"] {
        let out = predictor.predict(raw, 5, 0.25, LexicalMode::Wexact).await.expect("predict");
        assert!(out.results.is_empty());
        assert!(!out.is_failure());
    }
}

#[tokio::test]
async fn field_markers_are_not_tokens() {
    let out = e0_predictor().predict("[SYM] 头痛 [SEP] 发热", 5, 0.0, LexicalMode::Exact).await.expect("predict");
    assert_eq!(out.query, vec!["头痛", "发热"]);
    assert_eq!(out.results[0].name, "感冒");
}

#[tokio::test]
async fn encoder_failure_is_embedding_unavailable() {
    let err = predictor_with(Arc::new(FailingEmbedder)).predict("头痛", 5, 0.25, LexicalMode::Wexact).await.err().expect("error");
    assert!(matches!(err, Error::EmbeddingUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn encoder_timeout_is_embedding_unavailable() {
    let settings = PredictSettings { embed_timeout_ms: 20, ..PredictSettings::default() };
    let predictor =
        DiseasePredictor::new(three_entry_index(), Arc::new(SlowEmbedder), RuleEngine::builtin().expect("rules"), settings).expect("predictor");
    let err = predictor.predict("头痛", 5, 0.25, LexicalMode::Wexact).await.err().expect("error");
    assert!(matches!(err, Error::EmbeddingUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn zero_vector_is_embedding_unavailable() {
    let predictor = predictor_with(Arc::new(FixedEmbedder { dim: 4, vector: vec![0.0; 4] }));
    let err = predictor.predict("头痛", 5, 0.25, LexicalMode::Wexact).await.err().expect("error");
    assert!(matches!(err, Error::EmbeddingUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn scoring_failure_is_reported_not_raised() {
    // Advertises the index dimension but answers with a shorter vector.
    let predictor = predictor_with(Arc::new(FixedEmbedder { dim: 4, vector: vec![1.0, 0.0, 0.0] }));
    let out = predictor.predict("头痛 发热", 5, 0.0, LexicalMode::Exact).await.expect("fail-open");
    assert!(out.is_failure());
    assert!(out.results.is_empty());
    assert!(out.failure.as_deref().unwrap_or_default().contains("Dimension mismatch"));
}

#[tokio::test]
async fn bad_requests_are_rejected() {
    let predictor = e0_predictor();
    let err = predictor.predict("头痛", 0, 0.25, LexicalMode::Exact).await.err().expect("error");
    assert!(matches!(err, Error::InvalidRequest(_)));
    let err = predictor.predict("头痛", 5, f32::NAN, LexicalMode::Exact).await.err().expect("error");
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[test]
fn encoder_input_limit_is_exposed() {
    assert_eq!(e0_predictor().encoder_max_len(), 128);
}

#[test]
fn encoder_dimension_must_match_index() {
    let res = DiseasePredictor::new(
        three_entry_index(),
        Arc::new(FixedEmbedder { dim: 3, vector: vec![1.0, 0.0, 0.0] }),
        RuleEngine::builtin().expect("rules"),
        PredictSettings::default(),
    );
    assert!(matches!(res.err(), Some(Error::DimensionMismatch { expected: 4, actual: 3 })));
}

#[test]
fn equal_scores_keep_index_order() {
    let v = vec![0.0, 1.0];
    let records = vec![
        record("甲病", "内科", &["乏力"], v.clone()),
        record("乙病", "内科", &["乏力"], v.clone()),
        record("丙病", "内科", &["乏力"], v.clone()),
    ];
    let store = Arc::new(IndexStore::from_records(records, IdfTable::new()).expect("store"));
    let predictor = DiseasePredictor::new(
        store,
        Arc::new(FixedEmbedder { dim: 2, vector: v.clone() }),
        RuleEngine::builtin().expect("rules"),
        PredictSettings::default(),
    )
    .expect("predictor");
    let query = Query::new("乏力", v);
    let out = predictor.score_query(&query, 5, 0.0, LexicalMode::Exact).expect("score");
    let names: Vec<&str> = out.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["甲病", "乙病", "丙病"]);
}

#[test]
fn candidates_cover_every_entry_in_index_order() {
    let predictor = e0_predictor();
    let query = Query::new("头痛 发热", vec![1.0, 0.0, 0.0, 0.0]);
    let candidates = predictor.score_candidates(&query, LexicalMode::Exact).expect("candidates");
    let ids: Vec<usize> = candidates.iter().map(|c| c.entry.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(candidates.iter().all(|c| (0.0..=1.0).contains(&c.lexical_score)));
}

#[tokio::test]
async fn hashing_encoder_over_a_written_bundle() {
    let encoder = FakeEmbedder::new(64);
    let toks = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let diseases: [(&str, &str, &[&str]); 4] = [
        ("感冒", "呼吸内科", &["头痛", "发热", "鼻塞"]),
        ("急性胃肠炎", "消化内科", &["腹痛", "呕吐", "腹泻"]),
        ("冠心病", "心内科", &["胸痛", "呼吸困难"]),
        ("缺铁性贫血", "血液科", &["乏力", "头晕"]),
    ];
    let records: Vec<DiseaseRecord> = diseases
        .iter()
        .map(|(name, cat, symptoms)| record(name, cat, symptoms, encoder.embed_tokens(&toks(*symptoms)).expect("embed")))
        .collect();

    let tmp = tempfile::TempDir::new().expect("tmp");
    let path = tmp.path().join("index");
    let settings = IndexSettings::default();
    write_index(&path, &settings, &records, &IdfTable::new()).await.expect("write");
    let store = Arc::new(IndexStore::load(&path, &settings).await.expect("load"));

    let predictor =
        DiseasePredictor::new(store, Arc::new(FakeEmbedder::new(64)), RuleEngine::builtin().expect("rules"), PredictSettings::default())
            .expect("predictor");
    let out = predictor.predict("腹痛 呕吐", 3, 0.0, LexicalMode::Wexact).await.expect("predict");
    assert_eq!(out.results[0].name, "急性胃肠炎");
    assert_eq!(out.results[0].symptoms, vec!["腹痛", "呕吐", "腹泻"]);
}
