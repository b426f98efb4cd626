//! fusedb - hybrid retrieval over a local corpus
//!
//! ```text
//! fusedb health
//! fusedb ingest data/chunks/ --reindex
//! fusedb query "how do I purify stream water" --mode hybrid --top-k 5
//! fusedb stats "how do I purify stream water" --repeat 3
//! ```
//!
//! Chunks are ingested from JSON Lines files, one `ChunkReference` per line.
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use fusedb_core::config::{Config, Settings};
use fusedb_core::types::{ChunkReference, FusedResult, StrategyMode};
use fusedb_embed::get_default_embedder;
use fusedb_hybrid::{HybridRetriever, LocalCorpus};

const INGEST_BATCH: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "fusedb", version, about = "Hybrid lexical, sparse and dense retrieval with rank fusion")]
struct Cli {
    /// Directory holding config.toml and config.<env>.toml
    #[arg(long, global = true, env = "FUSEDB_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report corpus store health
    Health,

    /// Index chunks from a .jsonl file or a directory of them
    Ingest {
        path: PathBuf,

        /// Clear the collection before ingesting
        #[arg(long)]
        reindex: bool,
    },

    /// Rank chunks for a question
    Query {
        question: String,

        /// hybrid | single_strategy
        #[arg(long, short = 'm', default_value = "hybrid")]
        mode: String,

        /// Number of results, defaults to retrieval.default_top_k
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },

    /// Run a query repeatedly and print embedding cache statistics
    Stats {
        question: String,

        #[arg(long, default_value = "2")]
        repeat: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn,fusedb=info",
        1 => "info,fusedb_hybrid=debug,fusedb_vector=debug",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry().with(env_filter).with(fmt::layer().with_writer(std::io::stderr)).init();
}

async fn run(cli: &Cli) -> Result<()> {
    let settings = Config::load_from(&cli.config_dir)?.settings()?;
    let embedder = get_default_embedder(&settings.embedding)?;
    let corpus = Arc::new(LocalCorpus::open(&settings.corpus, embedder.clone()).await?);
    let retriever = HybridRetriever::new(corpus.clone(), embedder, &settings);

    let outcome = match &cli.command {
        Commands::Health => health(&retriever, cli.json).await,
        Commands::Ingest { path, reindex } => ingest(&corpus, path, *reindex, cli.json).await,
        Commands::Query { question, mode, top_k } => query(&retriever, &settings, question, mode, *top_k, cli.json).await,
        Commands::Stats { question, repeat } => stats(&retriever, &settings, question, *repeat, cli.json).await,
    };
    finish(&retriever, outcome).await
}

/// Close the retriever whatever the command returned; the command's own error wins.
async fn finish(retriever: &HybridRetriever, outcome: Result<()>) -> Result<()> {
    let closed = retriever.close().await;
    outcome?;
    closed?;
    Ok(())
}

async fn query(retriever: &HybridRetriever, settings: &Settings, question: &str, mode: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let mode: StrategyMode = mode.parse()?;
    let top_k = bounded_top_k(settings, top_k)?;
    retriever.initialize().await?;
    let results = retriever.search(question, mode, top_k).await?;
    print_results(question, mode, &results, json)
}

async fn stats(retriever: &HybridRetriever, settings: &Settings, question: &str, repeat: usize, json: bool) -> Result<()> {
    retriever.initialize().await?;
    let top_k = settings.retrieval.default_top_k;
    for _ in 0..repeat.max(1) {
        retriever.search(question, StrategyMode::Hybrid, top_k).await?;
    }
    let stats = retriever.cache_stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Embedding cache: {}/{} entries, ttl {}s", stats.size, stats.capacity, stats.ttl_secs);
        println!("Hits: {} of {} lookups ({:.1}%)", stats.hit_count, stats.request_count, stats.hit_rate() * 100.0);
    }
    Ok(())
}

/// Callers bound `top_k`; the retriever only rejects zero.
fn bounded_top_k(settings: &Settings, requested: Option<usize>) -> Result<usize> {
    let top_k = requested.unwrap_or(settings.retrieval.default_top_k);
    let max = settings.retrieval.max_top_k;
    if top_k == 0 || top_k > max {
        bail!("--top-k must be between 1 and {max}");
    }
    Ok(top_k)
}

async fn health(retriever: &HybridRetriever, json: bool) -> Result<()> {
    let level = retriever.health().await;
    if json {
        println!("{}", serde_json::json!({ "status": level }));
    } else {
        println!("Corpus store: {level}");
    }
    if !level.is_usable() {
        bail!("corpus store unavailable");
    }
    Ok(())
}

async fn ingest(corpus: &LocalCorpus, path: &Path, reindex: bool, json: bool) -> Result<()> {
    let files = jsonl_files(path)?;
    if files.is_empty() {
        bail!("no .jsonl files under {}", path.display());
    }
    let mut chunks = Vec::new();
    for file in &files {
        chunks.extend(read_chunks(file)?);
    }
    info!(files = files.len(), chunks = chunks.len(), "read chunk files");
    if reindex {
        corpus.clear().await?;
        info!(collection = corpus.collection(), "collection cleared before ingest");
    }
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
            .map_err(|e| anyhow!("progress template: {e}"))?
            .progress_chars("#>-"),
    );
    let mut indexed = 0usize;
    for batch in chunks.chunks(INGEST_BATCH) {
        indexed += corpus.ingest(batch).await?;
        pb.set_position(indexed as u64);
    }
    pb.finish_and_clear();
    if json {
        println!("{}", serde_json::json!({ "files": files.len(), "chunks": indexed, "documents": corpus.num_docs() }));
    } else {
        println!("Indexed {indexed} chunks from {} files ({} chunks in collection)", files.len(), corpus.num_docs());
    }
    Ok(())
}

fn jsonl_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "jsonl") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn read_chunks(file: &Path) -> Result<Vec<ChunkReference>> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let mut chunks = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChunkReference>(line) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => warn!(file = %file.display(), line = n + 1, error = %e, "skipping malformed chunk"),
        }
    }
    Ok(chunks)
}

fn print_results(question: &str, mode: StrategyMode, results: &[FusedResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    println!("Query: {question} ({mode} mode)");
    if results.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }
    for (i, r) in results.iter().enumerate() {
        let seen: Vec<String> = r.hits.iter().map(|h| format!("{}#{}", h.strategy, h.rank)).collect();
        println!("\n  {}. score={:.4}  id={}  [{}]", i + 1, r.fusion_score, r.chunk.chunk_id, seen.join(" "));
        println!("     {}  {}", r.chunk.source_title, r.chunk.source_link);
        let snippet: String = r.chunk.content.chars().take(160).collect();
        println!("     {snippet}");
    }
    Ok(())
}
