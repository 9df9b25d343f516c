//! Canonical record schema shared by every pipeline stage.
//!
//! Key names are part of the persisted document format consumed by the
//! front end, so fields are never renamed without a migration.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Origin of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// arXiv preprint API
    Arxiv,
    /// IACR Cryptology ePrint archive
    Iacr,
}

impl Source {
    /// Prefix used to qualify record ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Source::Arxiv => "arxiv",
            Source::Iacr => "iacr",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.id_prefix())
    }
}

/// Enrichment state machine.
///
/// `Pending -> Done` on success, `Pending | Failed -> Failed` on error.
/// A `Failed` record that reaches the attempt limit leaves the window for
/// the quarantine store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

/// A research record after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Source-qualified id, e.g. `arxiv:2401.01234` or `iacr:2024/123`
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub source: Source,
    /// Publication day (YYYY-MM-DD)
    pub published_at: NaiveDate,
    pub url: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub summary_en: Option<String>,
    #[serde(default)]
    pub summary_native: Option<String>,
    #[serde(default)]
    pub enrichment_status: EnrichmentStatus,
    #[serde(default)]
    pub enrichment_attempts: u32,
}

impl NormalizedRecord {
    /// New record straight out of a source adapter: pending, zero attempts.
    pub fn new(
        source: Source,
        native_id: &str,
        title: String,
        abstract_text: String,
        published_at: NaiveDate,
        url: String,
    ) -> Self {
        Self {
            id: format!("{}:{}", source.id_prefix(), native_id),
            title,
            abstract_text,
            source,
            published_at,
            url,
            authors: Vec::new(),
            categories: Vec::new(),
            summary_en: None,
            summary_native: None,
            enrichment_status: EnrichmentStatus::Pending,
            enrichment_attempts: 0,
        }
    }

    /// Title and abstract joined, the text keyword rules are matched against.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }

    /// Whether the enricher should pick this record up.
    pub fn needs_enrichment(&self, max_attempts: u32) -> bool {
        self.enrichment_status != EnrichmentStatus::Done && self.enrichment_attempts < max_attempts
    }

    /// Short title for log lines
    pub fn short_title(&self) -> String {
        self.title.chars().take(60).collect()
    }
}

/// Document order: newest first, ties broken by id ascending.
pub fn window_order(a: &NormalizedRecord, b: &NormalizedRecord) -> Ordering {
    b.published_at
        .cmp(&a.published_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid fixture date")
    }

    pub fn record(id: &str, published: &str) -> NormalizedRecord {
        let (source, native) = match id.split_once(':') {
            Some(("iacr", rest)) => (Source::Iacr, rest),
            Some((_, rest)) => (Source::Arxiv, rest),
            None => (Source::Arxiv, id),
        };
        NormalizedRecord::new(
            source,
            native,
            format!("Title of {}", id),
            format!("Abstract of {}", id),
            day(published),
            format!("https://example.org/{}", native),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_new_record_is_pending() {
        let r = record("arxiv:2401.01234", "2024-01-03");
        assert_eq!(r.id, "arxiv:2401.01234");
        assert_eq!(r.enrichment_status, EnrichmentStatus::Pending);
        assert_eq!(r.enrichment_attempts, 0);
        assert!(r.needs_enrichment(3));
    }

    #[test]
    fn test_serialized_key_names() {
        let r = record("iacr:2024/001", "2024-01-03");
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["abstract"], "Abstract of iacr:2024/001");
        assert_eq!(value["source"], "iacr");
        assert_eq!(value["published_at"], "2024-01-03");
        assert_eq!(value["enrichment_status"], "pending");
        assert!(value["summary_en"].is_null());
    }

    #[test]
    fn test_window_order() {
        let mut records = vec![
            record("arxiv:b", "2024-01-02"),
            record("arxiv:c", "2024-01-03"),
            record("arxiv:a", "2024-01-02"),
        ];
        records.sort_by(window_order);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["arxiv:c", "arxiv:a", "arxiv:b"]);
    }
}
