//! # paperdigest
//!
//! Daily research digest pipeline: arXiv + IACR ePrint ingestion, keyword
//! filtering, a rolling window of unique records, and bilingual LLM summaries.
//!
//! ## Modules
//!
//! - [`sources`] - Source adapters (arXiv Atom API, IACR ePrint RSS)
//! - [`filter`] - Keyword policy (AND within a rule, OR across rules)
//! - [`window`] - Rolling window store with merge and eviction
//! - [`quarantine`] - Records that exhausted their enrichment attempts
//! - [`enricher`] - Rate-limited summarization with retry
//! - [`llm`] - OpenAI-compatible summarization client
//! - [`pipeline`] - One end-to-end run
//! - [`config`] - TOML configuration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use paperdigest::{config::PipelineConfig, filter::KeywordPolicy, llm::LlmSummarizer, pipeline, sources};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load("paperdigest.toml".as_ref())?;
//!     let (policy, _warnings) = KeywordPolicy::load(&config.pipeline.keywords_file);
//!     let client = sources::http_client(config.sources.timeout_secs)?;
//!     let adapters: Vec<Box<dyn sources::SourceAdapter>> = vec![
//!         Box::new(sources::ArxivAdapter::new(client.clone(), 200)),
//!         Box::new(sources::IacrAdapter::new(client)),
//!     ];
//!     let summarizer = LlmSummarizer::new(config.llm_config()?)?;
//!     let report = pipeline::run(&config, &policy, &adapters, &summarizer, chrono::Utc::now()).await?;
//!     println!("{} records in window", report.window_size);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod enricher;
pub mod error;
pub mod filter;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod quarantine;
pub mod record;
pub mod sources;
pub mod store;
pub mod window;

pub use error::{PipelineError, Result};
