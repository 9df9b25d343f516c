//! paperdigest - daily arXiv + IACR ePrint digest
//!
//! Fetches new papers, filters them by keyword policy, keeps a rolling window
//! of unique records, and attaches bilingual LLM summaries.
//!
//! ## Usage
//!
//! ```bash
//! DASHSCOPE_API_KEY=... paperdigest run --config paperdigest.toml
//! paperdigest quarantine list
//! paperdigest check-policy --keywords keywords.txt
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use paperdigest::config::{PipelineConfig, CONFIG_FILE_NAME};
use paperdigest::filter::KeywordPolicy;
use paperdigest::llm::LlmSummarizer;
use paperdigest::pipeline::{self, RunReport};
use paperdigest::quarantine::QuarantineStore;
use paperdigest::sources::{self, ArxivAdapter, IacrAdapter, SourceAdapter, SourceOutcome};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Daily research digest with keyword filtering and bilingual summaries
#[derive(Parser)]
#[command(name = "paperdigest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, filter, merge, summarize and persist
    Run {
        /// Override data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Override keyword policy file
        #[arg(long)]
        keywords: Option<PathBuf>,

        /// Override retention horizon in days
        #[arg(long)]
        days_back: Option<u32>,

        /// Override summarization attempts per record
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Override seconds between summarization calls
        #[arg(long)]
        rate_limit_delay: Option<f64>,

        /// Override model identifier
        #[arg(long)]
        model: Option<String>,

        /// Skip the arXiv source
        #[arg(long)]
        no_arxiv: bool,

        /// Skip the IACR ePrint source
        #[arg(long)]
        no_iacr: bool,

        /// Also write the run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Inspect or clear the quarantine document
    Quarantine {
        #[command(subcommand)]
        action: QuarantineAction,
    },

    /// Parse the keyword policy and print its rules
    CheckPolicy {
        /// Override keyword policy file
        #[arg(long)]
        keywords: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum QuarantineAction {
    /// List quarantined records
    List,
    /// Remove every quarantined record
    Clear,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let mut config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            data_dir,
            keywords,
            days_back,
            max_attempts,
            rate_limit_delay,
            model,
            no_arxiv,
            no_iacr,
            report,
        } => {
            if let Some(dir) = data_dir {
                config.pipeline.data_dir = dir;
            }
            if let Some(path) = keywords {
                config.pipeline.keywords_file = path;
            }
            if let Some(days) = days_back {
                config.pipeline.days_back = days;
            }
            if let Some(n) = max_attempts {
                config.pipeline.max_attempts = n;
            }
            if let Some(delay) = rate_limit_delay {
                config.pipeline.rate_limit_delay = delay;
            }
            if let Some(m) = model {
                config.llm.model = m;
            }
            if no_arxiv {
                config.sources.arxiv_enabled = false;
            }
            if no_iacr {
                config.sources.iacr_enabled = false;
            }
            run_pipeline(config, report).await
        }
        Commands::Quarantine { action } => handle_quarantine(&config, action),
        Commands::CheckPolicy { keywords } => {
            let path = keywords.unwrap_or(config.pipeline.keywords_file);
            check_policy(&path)
        }
    }
}

// ============================================================================
// Pipeline Run
// ============================================================================

async fn run_pipeline(config: PipelineConfig, report_path: Option<PathBuf>) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let (policy, warnings) = KeywordPolicy::load(&config.pipeline.keywords_file);
    for w in &warnings {
        warn!(warning = %w, "Keyword policy problem, filter fails open where rules are missing");
    }
    info!(rules = policy.rules().len(), "Keyword policy ready");

    let llm_config = config.llm_config().context("Summarizer not configured")?;
    let summarizer = LlmSummarizer::new(llm_config)?;

    let client = sources::http_client(config.sources.timeout_secs)?;
    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
    if config.sources.arxiv_enabled {
        adapters.push(Box::new(ArxivAdapter::new(
            client.clone(),
            config.sources.arxiv_max_results,
        )));
    }
    if config.sources.iacr_enabled {
        adapters.push(Box::new(IacrAdapter::new(client)));
    }

    let report = pipeline::run(&config, &policy, &adapters, &summarizer, Utc::now())
        .await
        .context("Pipeline run failed, previous documents left untouched")?;

    let usage = summarizer.usage();
    info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "Token usage"
    );

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    print_report(&config, &report);
    Ok(())
}

fn print_report(config: &PipelineConfig, report: &RunReport) {
    println!();
    println!("=== paperdigest run ===");
    for outcome in &report.sources {
        match outcome {
            SourceOutcome::Fetched { source, count } => println!("  {:<6} fetched {}", source, count),
            SourceOutcome::Failed { source, error } => println!("  {:<6} FAILED: {}", source, error),
        }
    }
    println!("Matched keywords:   {} / {}", report.matched, report.fetched);
    println!("New / updated:      {} / {}", report.inserted, report.updated);
    println!("Evicted:            {}", report.evicted);
    println!(
        "Summaries:          {} ok, {} quarantined, {} released",
        report.enrichment.succeeded, report.enrichment.quarantined, report.enrichment.released
    );
    println!(
        "Errors by kind:     {} transport, {} auth/quota, {} malformed",
        report.enrichment.transport_errors,
        report.enrichment.auth_errors,
        report.enrichment.malformed_errors
    );
    if report.enrichment.credentials_suspect() {
        println!("WARNING: summarization was rejected for auth/quota reasons; check {}", config.llm.api_key_env);
    }
    println!("Window:             {} records -> {}", report.window_size, config.papers_path().display());
    println!("Quarantine:         {} records -> {}", report.quarantine_size, config.failed_path().display());
}

// ============================================================================
// Quarantine Management
// ============================================================================

fn handle_quarantine(config: &PipelineConfig, action: QuarantineAction) -> Result<()> {
    let path = config.failed_path();
    let mut quarantine = QuarantineStore::load(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    match action {
        QuarantineAction::List => {
            if quarantine.is_empty() {
                println!("Quarantine is empty.");
            }
            for entry in quarantine.entries() {
                println!(
                    "{}  [{:?}, {} attempts, {}]  {}",
                    entry.record.id,
                    entry.error_kind,
                    entry.attempts,
                    entry.quarantined_at.format("%Y-%m-%d %H:%M"),
                    entry.record.short_title()
                );
                println!("    {}", entry.last_error);
            }
        }
        QuarantineAction::Clear => {
            let removed = quarantine.clear();
            quarantine.persist(&path, Utc::now())?;
            println!("Cleared {} quarantined records.", removed);
        }
    }
    Ok(())
}

// ============================================================================
// Policy Check
// ============================================================================

fn check_policy(path: &std::path::Path) -> Result<()> {
    let (policy, warnings) = KeywordPolicy::load(path);
    for w in &warnings {
        println!("warning: {}", w);
    }
    if policy.is_empty() {
        println!("Policy is empty: every record will pass the filter.");
        return Ok(());
    }
    println!("{} rules (terms ANDed, rules ORed):", policy.rules().len());
    for (idx, rule) in policy.rules().iter().enumerate() {
        println!("  {:>3}. {}", idx + 1, rule.terms().join(" AND "));
    }
    Ok(())
}
