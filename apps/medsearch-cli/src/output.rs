//! Terminal and JSON rendering of predictions and index statistics.

use medsearch_core::types::Prediction;
use medsearch_index::IndexStore;

const RULE_WIDTH: usize = 60;

/// Human-readable ranking, one block per disease.
pub fn format_human(prediction: &Prediction) -> String {
    let mut out = format!("🔍 查询: {}\n{}\n", prediction.query.join(" "), "=".repeat(RULE_WIDTH));
    if let Some(failure) = &prediction.failure {
        out.push_str(&format!("❌ 查询失败: {failure}"));
        return out;
    }
    if prediction.results.is_empty() {
        out.push_str("⚠️  未找到达到阈值的结果");
        return out;
    }
    for (i, r) in prediction.results.iter().enumerate() {
        out.push_str(&format!("{:>2}. {}  [{}]  相似度: {:.4}\n", i + 1, r.name, r.category, r.score));
        if !r.symptoms.is_empty() {
            out.push_str(&format!("    症状: {}\n", r.symptoms.join("、")));
        }
    }
    out.trim_end().to_string()
}

/// Pretty JSON for a single prediction.
pub fn format_json(prediction: &Prediction) -> anyhow::Result<String> { Ok(serde_json::to_string_pretty(prediction)?) }

/// One JSON object per line, for batch output.
pub fn format_json_line(prediction: &Prediction) -> anyhow::Result<String> { Ok(serde_json::to_string(prediction)?) }

pub fn format_stats(store: &IndexStore, bounds: (f32, f32), rules_version: u32) -> String {
    let (lo, hi) = bounds;
    [
        "📊 索引统计".to_string(),
        "=".repeat(RULE_WIDTH),
        format!("entries:              {}", store.len()),
        format!("dimension:            {}", store.dim()),
        format!("idf terms:            {}", store.idf().len()),
        format!("malformed symptoms:   {}", store.malformed_count()),
        format!("max norm deviation:   {:.6}", store.max_norm_deviation()),
        format!("rules version:        {rules_version}"),
        format!("multiplier range:     {lo:.5} .. {hi:.5}"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use medsearch_core::types::{DiseaseRecord, IdfTable, PredictionRecord};

    fn prediction(results: Vec<PredictionRecord>) -> Prediction {
        Prediction { query: vec!["头痛".into(), "发热".into()], results, failure: None }
    }

    fn cold() -> PredictionRecord {
        PredictionRecord {
            name: "感冒".into(),
            category: "呼吸内科".into(),
            score: 1.134,
            semantic_score: 0.6,
            lexical_score: 1.0,
            symptoms: vec!["头痛".into(), "发热".into()],
        }
    }

    #[test]
    fn human_lists_results_with_symptoms() {
        let text = format_human(&prediction(vec![cold()]));
        assert!(text.starts_with("🔍 查询: 头痛 发热\n"));
        assert!(text.contains(" 1. 感冒  [呼吸内科]  相似度: 1.1340"), "{text}");
        assert!(text.ends_with("    症状: 头痛、发热"), "{text}");
    }

    #[test]
    fn human_reports_empty_and_failed() {
        assert!(format_human(&prediction(vec![])).ends_with("⚠️  未找到达到阈值的结果"));
        let failed = Prediction::failed(vec!["头痛".into()], "boom");
        assert!(format_human(&failed).ends_with("❌ 查询失败: boom"));
    }

    #[test]
    fn json_uses_snake_case_keys() {
        let line = format_json_line(&prediction(vec![cold()])).expect("json");
        assert!(!line.contains('\n'));
        for key in ["\"name\"", "\"category\"", "\"score\"", "\"semantic_score\"", "\"lexical_score\"", "\"symptoms\""] {
            assert!(line.contains(key), "{key} missing from {line}");
        }
        assert!(!line.contains("failure"));
    }

    #[test]
    fn stats_summarise_store() {
        let records = vec![DiseaseRecord { name: "感冒".into(), category: "呼吸内科".into(), symptoms: vec!["发热".into()], embedding: vec![1.0, 0.0] }];
        let store = IndexStore::from_records(records, IdfTable::from_pairs([("发热", 1.0)])).expect("store");
        let text = format_stats(&store, (0.08316, 2.025), 1);
        assert!(text.contains("entries:              1"));
        assert!(text.contains("dimension:            2"));
        assert!(text.contains("idf terms:            1"));
        assert!(text.contains("0.08316 .. 2.02500"));
    }
}
