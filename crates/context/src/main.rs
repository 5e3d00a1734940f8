//! RouteQA command line
//!
//! - `routeqa run`: answer a questions CSV through the safeguard pipeline
//! - `routeqa index`: build and persist an index from a JSONL corpus

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use routeqa_common::config::{AppConfig, ObservabilityConfig};
use routeqa_common::embeddings::create_embedder;
use routeqa_common::llm::{ChatClient, LanguageModel};
use routeqa_common::metrics::{self, MODEL_BUCKETS, RETRIEVAL_BUCKETS};
use routeqa_common::VERSION;
use routeqa_context::bootstrap::{build_pipeline, create_components};
use routeqa_context::dataset::{load_corpus, load_questions, sample_records, write_answers};
use routeqa_context::evaluation::evaluate;
use routeqa_context::indexer::{build_index, IndexMode};
use routeqa_context::BatchRunner;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Routed retrieval question answering with safeguard fallbacks
#[derive(Parser, Debug)]
#[command(name = "routeqa", version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: config/default, config/$APP_ENV, config/local)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer every question in a CSV file
    Run {
        /// Questions CSV (default: data.root/data.questions_file)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Answers CSV (default: data.root/data.output_file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build an index from a JSONL corpus
    Index {
        /// JSONL corpus, one {"text": ...} record per line
        #[arg(long)]
        corpus: PathBuf,

        /// Where to write the index
        #[arg(long)]
        out: PathBuf,

        #[arg(long, value_enum, default_value_t = IndexMode::Flat)]
        mode: IndexMode,

        /// Keep only this many records, sampled uniformly
        #[arg(long)]
        sample: Option<usize>,

        /// Sampling seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy()),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?
    .validated()?;

    init_tracing(&config.observability);
    info!("Starting RouteQA v{}", VERSION);

    if config.observability.metrics_port != 0 {
        install_metrics(config.observability.metrics_port)?;
    }

    let result = match cli.command {
        Command::Run { input, output } => run(&config, input, output).await,
        Command::Index {
            corpus,
            out,
            mode,
            sample,
            seed,
        } => index(&config, corpus, out, mode, sample, seed).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "RouteQA failed");
    }
    result
}

fn init_tracing(config: &ObservabilityConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn install_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Suffix("model_call_duration_seconds".into()), MODEL_BUCKETS)?
        .set_buckets_for_metric(Matcher::Suffix("retrieval_duration_seconds".into()), RETRIEVAL_BUCKETS)?
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!("Metrics exposed on {}", addr);
    Ok(())
}

async fn run(config: &AppConfig, input: Option<PathBuf>, output: Option<PathBuf>) -> anyhow::Result<()> {
    let input = input.unwrap_or_else(|| config.questions_path());
    let output = output.unwrap_or_else(|| config.output_path());

    let records = load_questions(&input, &config.data.question_column, &config.data.answer_column)?;
    let pipeline = Arc::new(build_pipeline(config, create_components(config)?)?);

    let questions: Vec<String> = records.iter().map(|r| r.question.clone()).collect();
    let report = BatchRunner::new(pipeline.clone(), &config.pipeline)
        .run(&questions)
        .await?;
    write_answers(&output, &report.answers)?;

    if !report.failures.is_empty() {
        warn!(skipped = report.failures.len(), "Some questions were answered with the placeholder");
    }

    if records.iter().any(|r| r.gold.is_some()) {
        let golds: Vec<Option<String>> = records.into_iter().map(|r| r.gold).collect();
        let evaluation = evaluate(pipeline.matcher(), &report.answers, &golds);
        info!(
            total = evaluation.total,
            correct = evaluation.correct,
            accuracy = evaluation.accuracy,
            "Evaluation"
        );
        for mismatch in &evaluation.mismatches {
            info!(
                question_index = mismatch.index,
                expected = %mismatch.expected,
                predicted = ?mismatch.predicted,
                "Mismatch"
            );
        }
    }

    info!(output = %output.display(), "All done");
    Ok(())
}

async fn index(
    config: &AppConfig,
    corpus: PathBuf,
    out: PathBuf,
    mode: IndexMode,
    sample: Option<usize>,
    seed: u64,
) -> anyhow::Result<()> {
    let mut records = load_corpus(&corpus)?;
    if let Some(n) = sample {
        records = sample_records(records, n, seed);
    }

    let embedder = create_embedder(&config.embedding, config.embedding_api_key())?;
    let model: Option<Arc<dyn LanguageModel>> = if mode == IndexMode::Summary {
        Some(Arc::new(ChatClient::new(&config.llm)?))
    } else {
        None
    };

    let index = build_index(&records, mode, &config.retrieval, embedder.as_ref(), model.as_deref()).await?;
    index.save(&out)?;

    info!(out = %out.display(), entries = index.len(), "Index written");
    Ok(())
}
