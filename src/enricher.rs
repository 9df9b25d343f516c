//! Bilingual summary enrichment.
//!
//! Walks the window in document order, calls the [`Summarizer`] for every
//! record that still needs a summary, and drives the per-record state machine:
//!
//! - success with both summaries non-empty: `Done`
//! - any failure: `Failed`, `enrichment_attempts += 1`
//! - attempts reach `max_attempts`: record moves from the window to quarantine
//!
//! Calls are strictly sequential and each one waits `rate_limit_delay` first,
//! including the very first call of a run.

use crate::quarantine::{QuarantineEntry, QuarantineStore};
use crate::record::{EnrichmentStatus, NormalizedRecord};
use crate::window::WindowStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Upper bound for the exponential retry backoff
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Input to one summarization call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRequest {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub model: String,
}

/// Output of a successful summarization call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BilingualSummary {
    pub summary_en: String,
    pub summary_native: String,
}

impl BilingualSummary {
    /// Trim both fields and reject empty ones.
    pub fn validated(self) -> Result<Self, EnrichmentError> {
        let summary_en = self.summary_en.trim().to_string();
        let summary_native = self.summary_native.trim().to_string();
        if summary_en.is_empty() {
            return Err(EnrichmentError::Malformed("empty summary_en".to_string()));
        }
        if summary_native.is_empty() {
            return Err(EnrichmentError::Malformed("empty summary_native".to_string()));
        }
        Ok(Self {
            summary_en,
            summary_native,
        })
    }
}

/// Failure category recorded with quarantined records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Auth,
    Malformed,
}

/// Why a summarization call failed.
///
/// All variants count as one failed attempt. `Auth` is kept apart so run
/// reports can tell broken credentials from temporary rate limiting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnrichmentError {
    /// Network error, timeout, 429 or 5xx
    #[error("transport: {0}")]
    Transport(String),

    /// Invalid key, exhausted quota, account verification required
    #[error("auth/quota: {0}")]
    Auth(String),

    /// Response could not be parsed or a summary was empty
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl EnrichmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnrichmentError::Transport(_) => ErrorKind::Transport,
            EnrichmentError::Auth(_) => ErrorKind::Auth,
            EnrichmentError::Malformed(_) => ErrorKind::Malformed,
        }
    }
}

/// External summarization service.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<BilingualSummary, EnrichmentError>;
}

/// Enforces a minimum pause before every outbound call.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    calls: u64,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay, calls: 0 }
    }

    /// Sleep the full delay. No credit is given for idle time, so the first
    /// call after fetching/merging is paced like every other call.
    pub async fn wait(&mut self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls += 1;
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

/// Enricher tuning, taken from the pipeline config
#[derive(Debug, Clone)]
pub struct EnricherSettings {
    pub model: String,
    pub max_attempts: u32,
    pub rate_limit_delay: Duration,
    pub retry_delay: Duration,
}

/// Run-level enrichment outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    /// Records selected for enrichment
    pub selected: usize,
    pub succeeded: usize,
    /// Records moved to quarantine this run
    pub quarantined: usize,
    /// Quarantine entries removed because their id succeeded
    pub released: usize,
    pub calls: u64,
    pub transport_errors: usize,
    pub auth_errors: usize,
    pub malformed_errors: usize,
}

impl EnrichmentReport {
    fn record_error(&mut self, err: &EnrichmentError) {
        match err.kind() {
            ErrorKind::Transport => self.transport_errors += 1,
            ErrorKind::Auth => self.auth_errors += 1,
            ErrorKind::Malformed => self.malformed_errors += 1,
        }
    }

    /// True when at least one call was rejected for credential/quota reasons
    pub fn credentials_suspect(&self) -> bool {
        self.auth_errors > 0
    }
}

pub struct Enricher<'a> {
    summarizer: &'a dyn Summarizer,
    settings: EnricherSettings,
    limiter: RateLimiter,
}

impl<'a> Enricher<'a> {
    pub fn new(summarizer: &'a dyn Summarizer, settings: EnricherSettings) -> Self {
        let limiter = RateLimiter::new(settings.rate_limit_delay);
        Self {
            summarizer,
            settings,
            limiter,
        }
    }

    /// Enrich every eligible window record, quarantining exhausted ones.
    pub async fn run(
        &mut self,
        window: &mut WindowStore,
        quarantine: &mut QuarantineStore,
        now: DateTime<Utc>,
    ) -> EnrichmentReport {
        let queue = window.enrichment_queue(self.settings.max_attempts);
        let mut report = EnrichmentReport {
            selected: queue.len(),
            ..Default::default()
        };

        info!(
            selected = queue.len(),
            model = %self.settings.model,
            max_attempts = self.settings.max_attempts,
            "Starting enrichment"
        );

        for (idx, id) in queue.iter().enumerate() {
            let Some(record) = window.get_mut(id) else {
                continue;
            };
            debug!(idx, total = queue.len(), id = %id, title = %record.short_title(), "Enriching record");

            match self.enrich_record(record, &mut report).await {
                Ok(()) => {
                    report.succeeded += 1;
                    if quarantine.remove(id).is_some() {
                        report.released += 1;
                        info!(id = %id, "Released record from quarantine after success");
                    }
                }
                Err(last) => {
                    if let Some(record) = window.remove(id) {
                        quarantine_record(quarantine, record, &last, now);
                        report.quarantined += 1;
                    }
                }
            }
        }

        report.quarantined += self.sweep_exhausted(window, quarantine, now);
        report.calls = self.limiter.calls();

        if report.credentials_suspect() {
            error!(
                auth_errors = report.auth_errors,
                "Summarization rejected for auth/quota reasons, check API key and account status"
            );
        }
        info!(
            succeeded = report.succeeded,
            quarantined = report.quarantined,
            transport_errors = report.transport_errors,
            malformed_errors = report.malformed_errors,
            calls = report.calls,
            "Enrichment complete"
        );
        report
    }

    /// Retry one record until it succeeds or its attempt budget is spent.
    /// An `Err` always means the budget is exhausted.
    async fn enrich_record(
        &mut self,
        record: &mut NormalizedRecord,
        report: &mut EnrichmentReport,
    ) -> Result<(), EnrichmentError> {
        let request = SummaryRequest {
            title: record.title.clone(),
            abstract_text: record.abstract_text.clone(),
            model: self.settings.model.clone(),
        };
        let mut backoff = self.settings.retry_delay.min(MAX_RETRY_BACKOFF);
        let mut last_error = EnrichmentError::Transport("not attempted".to_string());

        while record.enrichment_attempts < self.settings.max_attempts {
            self.limiter.wait().await;

            let outcome = self
                .summarizer
                .summarize(&request)
                .await
                .and_then(BilingualSummary::validated);

            match outcome {
                Ok(summary) => {
                    record.summary_en = Some(summary.summary_en);
                    record.summary_native = Some(summary.summary_native);
                    record.enrichment_status = EnrichmentStatus::Done;
                    debug!(id = %record.id, "Summary stored");
                    return Ok(());
                }
                Err(e) => {
                    record.enrichment_status = EnrichmentStatus::Failed;
                    record.enrichment_attempts += 1;
                    report.record_error(&e);
                    warn!(
                        id = %record.id,
                        attempt = record.enrichment_attempts,
                        max_attempts = self.settings.max_attempts,
                        kind = ?e.kind(),
                        error = %e,
                        "Summarization attempt failed"
                    );
                    last_error = e;

                    if record.enrichment_attempts < self.settings.max_attempts && !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2).min(MAX_RETRY_BACKOFF);
                    }
                }
            }
        }

        Err(last_error)
    }

    /// Move `Failed` records that are already out of attempts (e.g. loaded
    /// from an older document) into quarantine.
    fn sweep_exhausted(
        &self,
        window: &mut WindowStore,
        quarantine: &mut QuarantineStore,
        now: DateTime<Utc>,
    ) -> usize {
        let exhausted: Vec<String> = window
            .records()
            .into_iter()
            .filter(|r| {
                r.enrichment_status == EnrichmentStatus::Failed
                    && r.enrichment_attempts >= self.settings.max_attempts
            })
            .map(|r| r.id.clone())
            .collect();

        let mut moved = 0;
        for id in exhausted {
            if let Some(record) = window.remove(&id) {
                let err = quarantine
                    .get(&id)
                    .map(|e| match e.error_kind {
                        ErrorKind::Auth => EnrichmentError::Auth(e.last_error.clone()),
                        ErrorKind::Malformed => EnrichmentError::Malformed(e.last_error.clone()),
                        ErrorKind::Transport => EnrichmentError::Transport(e.last_error.clone()),
                    })
                    .unwrap_or_else(|| EnrichmentError::Transport("attempts exhausted".to_string()));
                quarantine_record(quarantine, record, &err, now);
                moved += 1;
            }
        }
        moved
    }
}

fn quarantine_record(
    quarantine: &mut QuarantineStore,
    record: NormalizedRecord,
    last: &EnrichmentError,
    now: DateTime<Utc>,
) {
    warn!(
        id = %record.id,
        attempts = record.enrichment_attempts,
        error = %last,
        "Enrichment attempts exhausted, quarantining record"
    );
    quarantine.upsert(QuarantineEntry {
        attempts: record.enrichment_attempts,
        last_error: last.to_string(),
        error_kind: last.kind(),
        record,
        quarantined_at: now,
    });
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Summarizer returning scripted outcomes, then a default.
    pub struct ScriptedSummarizer {
        script: Mutex<VecDeque<Result<BilingualSummary, EnrichmentError>>>,
        fallback: Result<BilingualSummary, EnrichmentError>,
        pub requests: Mutex<Vec<SummaryRequest>>,
    }

    impl ScriptedSummarizer {
        pub fn always(outcome: Result<BilingualSummary, EnrichmentError>) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: outcome,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn scripted(
            script: Vec<Result<BilingualSummary, EnrichmentError>>,
            fallback: Result<BilingualSummary, EnrichmentError>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl Summarizer for ScriptedSummarizer {
        async fn summarize(&self, request: &SummaryRequest) -> Result<BilingualSummary, EnrichmentError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    pub fn ok_summary() -> Result<BilingualSummary, EnrichmentError> {
        Ok(BilingualSummary {
            summary_en: "An English summary.".to_string(),
            summary_native: "中文摘要。".to_string(),
        })
    }

    pub fn settings(max_attempts: u32) -> EnricherSettings {
        EnricherSettings {
            model: "test-model".to_string(),
            max_attempts,
            rate_limit_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
        }
    }
}
