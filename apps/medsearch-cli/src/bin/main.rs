use std::env;
use std::fs;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use medsearch_cli::args::{batch_input, parse_query_options, QueryOptions};
use medsearch_cli::output::{format_human, format_json, format_json_line, format_stats};
use medsearch_cli::SELF_TEST_QUERIES;
use medsearch_core::config::{expand_path, Config};
use medsearch_core::types::{tokenize, Prediction};
use medsearch_embed::get_default_embedder;
use medsearch_hybrid::{DiseasePredictor, RuleEngine, RuleTables};
use medsearch_index::IndexStore;

const USAGE: &str = "Usage: medsearch <query|selftest|batch|stats> [args...]
  query <symptoms...> [--topk N] [--min-score X] [--lexical none|exact|wexact|fuzzy] [--json]
  selftest [--topk N] [--min-score X] [--lexical MODE] [--json]
  batch <file> [--topk N] [--min-score X] [--lexical MODE]
  stats";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

async fn load_store(config: &Config) -> anyhow::Result<IndexStore> {
    let settings = config.index()?;
    let path = settings.resolved_path(&env::current_dir()?);
    Ok(IndexStore::load(&path, &settings).await?)
}

fn load_rules(config: &Config) -> anyhow::Result<RuleEngine> {
    Ok(match config.rules()?.path {
        Some(path) => RuleEngine::new(RuleTables::from_toml_file(&expand_path(path))?),
        None => RuleEngine::builtin()?,
    })
}

async fn build_predictor(config: &Config) -> anyhow::Result<DiseasePredictor> {
    let store = Arc::new(load_store(config).await?);
    let embedder = get_default_embedder(&config.model()?)?;
    Ok(DiseasePredictor::new(store, embedder, load_rules(config)?, config.predict()?)?)
}

async fn run_query(predictor: &DiseasePredictor, text: &str, opts: &QueryOptions) -> anyhow::Result<()> {
    let prediction = predictor.predict(text, opts.top_k, opts.min_score, opts.mode).await?;
    if opts.json { println!("{}", format_json(&prediction)?); } else { println!("{}\n", format_human(&prediction)); }
    Ok(())
}

async fn run_batch(predictor: &DiseasePredictor, input: &std::path::Path, opts: &QueryOptions) -> anyhow::Result<()> {
    let content = fs::read_to_string(input).map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input.display(), e))?;
    let queries: Vec<&str> = content.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let pb = ProgressBar::new(queries.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{msg} [{bar:40}] {pos}/{len}")?);
    pb.set_message("Queries");
    let mut failed = 0usize;
    for query in queries {
        let prediction = match predictor.predict(query, opts.top_k, opts.min_score, opts.mode).await {
            Ok(p) => p,
            Err(e) => {
                warn!(query, error = %e, "query failed");
                Prediction::failed(tokenize(query), e.to_string())
            }
        };
        if prediction.is_failure() { failed += 1; }
        pb.suspend(|| println!("{}", format_json_line(&prediction).unwrap_or_else(|_| "{}".to_string())));
        pb.inc(1);
    }
    pb.finish_with_message(format!("Done ({failed} failed)"));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let (cmd, args) = parse_args();
    let rt = tokio::runtime::Runtime::new()?;
    match cmd.as_str() {
        "query" => {
            let (opts, words) = parse_query_options(&args, &config.predict()?)?;
            if words.is_empty() { eprintln!("Usage: medsearch query <symptoms...>"); std::process::exit(1); }
            rt.block_on(async {
                let predictor = build_predictor(&config).await?;
                run_query(&predictor, &words.join(" "), &opts).await
            })?;
        }
        "selftest" => {
            let (opts, _) = parse_query_options(&args, &config.predict()?)?;
            rt.block_on(async {
                let predictor = build_predictor(&config).await?;
                for query in SELF_TEST_QUERIES { run_query(&predictor, query, &opts).await?; }
                anyhow::Ok(())
            })?;
            println!("✅ Self-test finished ({} queries)", SELF_TEST_QUERIES.len());
        }
        "batch" => {
            let (opts, rest) = parse_query_options(&args, &config.predict()?)?;
            let input = batch_input(&rest)?;
            rt.block_on(async {
                let predictor = build_predictor(&config).await?;
                run_batch(&predictor, &input, &opts).await
            })?;
        }
        "stats" => {
            let store = rt.block_on(load_store(&config))?;
            let rules = load_rules(&config)?;
            println!("{}", format_stats(&store, rules.multiplier_bounds(), rules.tables().version));
        }
        _ => { eprintln!("Unknown command: {}\n{USAGE}", cmd); std::process::exit(1); }
    }
    Ok(())
}
