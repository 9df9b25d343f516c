//! Source adapters: fetch raw candidates and normalize them.
//!
//! Adapters are pure producers. They never filter or deduplicate, and they
//! never retry: a failed fetch is reported as a soft, per-source failure and
//! the next scheduled run picks the records up again.

pub mod arxiv;
pub mod iacr;

pub use arxiv::ArxivAdapter;
pub use iacr::IacrAdapter;

use crate::error::{PipelineError, Result};
use crate::record::{NormalizedRecord, Source};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// User agent sent to both archives
pub const USER_AGENT: &str = concat!(
    "paperdigest/",
    env!("CARGO_PKG_VERSION"),
    " (daily research digest)"
);

/// A producer of normalized records.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Fetch and normalize the latest records. Errors are surfaced to the
    /// caller, which downgrades them to a soft failure.
    async fn fetch(&self, categories: &[String]) -> Result<Vec<NormalizedRecord>>;
}

/// Per-source result of one fetch phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Fetched { source: Source, count: usize },
    Failed { source: Source, error: String },
}

impl SourceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SourceOutcome::Failed { .. })
    }
}

/// Fetch from every adapter in order, isolating failures per source.
pub async fn fetch_all(
    adapters: &[Box<dyn SourceAdapter>],
    categories: &[String],
) -> (Vec<NormalizedRecord>, Vec<SourceOutcome>) {
    let mut records = Vec::new();
    let mut outcomes = Vec::with_capacity(adapters.len());

    for adapter in adapters {
        let source = adapter.source();
        match adapter.fetch(categories).await {
            Ok(fetched) => {
                info!(%source, count = fetched.len(), "Fetched records");
                outcomes.push(SourceOutcome::Fetched {
                    source,
                    count: fetched.len(),
                });
                records.extend(fetched);
            }
            Err(e) => {
                warn!(%source, error = %e, "Source fetch failed, continuing with other sources");
                outcomes.push(SourceOutcome::Failed {
                    source,
                    error: e.to_string(),
                });
            }
        }
    }

    (records, outcomes)
}

/// Build the HTTP client shared by adapters
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// GET a feed body, mapping non-success statuses to `Api` errors.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<String> {
    debug!(url, ?query, "Fetching feed");
    let response = client.get(url).query(query).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Api {
            code: status.as_u16() as i32,
            message: format!("{} returned {}", url, status),
        });
    }
    Ok(response.text().await?)
}

/// Collapse runs of whitespace into single spaces
pub(crate) fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip HTML tags and collapse whitespace.
///
/// Block-level tags become a space so paragraphs do not run together; inline
/// tags are removed outright so `<b>lattice</b>-based` stays one word.
pub(crate) fn strip_html_tags(text: &str) -> String {
    static BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();

    let block = BLOCK.get_or_init(|| {
        Regex::new(r"(?i)</?(p|br|div|li|ul|ol|h[1-6]|tr|td|th|table|blockquote|pre|hr)\b[^>]*>").ok()
    });
    let spaced = match block {
        Some(re) => re.replace_all(text, " ").to_string(),
        None => text.to_string(),
    };
    let stripped = match TAGS.get_or_init(|| Regex::new(r"<[^>]+>").ok()) {
        Some(re) => re.replace_all(&spaced, "").to_string(),
        None => spaced,
    };
    normalize_ws(&stripped)
}
