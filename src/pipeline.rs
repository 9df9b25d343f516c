//! One pipeline run.
//!
//! fetch (per-source soft failures) -> keyword filter -> merge into window ->
//! evict -> enrich -> persist quarantine -> persist window.
//!
//! Only persistence can fail a run. Until the final swap the previously
//! persisted documents stay authoritative.

use crate::config::PipelineConfig;
use crate::enricher::{Enricher, EnrichmentReport, Summarizer};
use crate::error::Result;
use crate::filter::KeywordPolicy;
use crate::quarantine::QuarantineStore;
use crate::sources::{fetch_all, SourceAdapter, SourceOutcome};
use crate::window::WindowStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Everything a run did, for logs and the CLI summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceOutcome>,
    pub fetched: usize,
    pub matched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub evicted: usize,
    pub enrichment: EnrichmentReport,
    pub window_size: usize,
    pub quarantine_size: usize,
}

impl RunReport {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.is_failed()).count()
    }
}

/// Execute one run against the documents under `config.pipeline.data_dir`.
pub async fn run(
    config: &PipelineConfig,
    policy: &KeywordPolicy,
    sources: &[Box<dyn SourceAdapter>],
    summarizer: &dyn Summarizer,
    now: DateTime<Utc>,
) -> Result<RunReport> {
    let papers_path = config.papers_path();
    let failed_path = config.failed_path();

    let mut window = WindowStore::load(&papers_path)?;
    let mut quarantine = QuarantineStore::load(&failed_path)?;

    let (candidates, outcomes) = fetch_all(sources, &config.sources.categories).await;
    let fetched = candidates.len();
    if outcomes.iter().all(|o| o.is_failed()) && !outcomes.is_empty() {
        warn!("Every source failed, continuing with stored window only");
    }

    let matched_records = policy.filter(candidates);
    let matched = matched_records.len();

    let merge = window.merge(matched_records);
    let evicted = window.evict(config.pipeline.days_back, now.date_naive()).len();

    let enrichment = Enricher::new(summarizer, config.enricher_settings())
        .run(&mut window, &mut quarantine, now)
        .await;

    persist_documents(&window, &quarantine, &papers_path, &failed_path, now)?;

    let report = RunReport {
        sources: outcomes,
        fetched,
        matched,
        inserted: merge.inserted,
        updated: merge.updated,
        evicted,
        enrichment,
        window_size: window.len(),
        quarantine_size: quarantine.len(),
    };

    info!(
        fetched = report.fetched,
        matched = report.matched,
        inserted = report.inserted,
        evicted = report.evicted,
        window = report.window_size,
        quarantine = report.quarantine_size,
        failed_sources = report.failed_sources(),
        "Run complete"
    );
    Ok(report)
}

/// Quarantine goes first. A record moved out of the window this run then
/// always lands in at least one document; if the window swap never happens
/// the stale copy is swept into quarantine again on the next run.
fn persist_documents(
    window: &WindowStore,
    quarantine: &QuarantineStore,
    papers_path: &Path,
    failed_path: &Path,
    now: DateTime<Utc>,
) -> Result<()> {
    quarantine.persist(failed_path, now)?;
    window.persist(papers_path, now)
}
