//! Rolling window of live records.
//!
//! Records are keyed by id in a `BTreeMap`. Merging never produces duplicate
//! ids and never regresses a completed enrichment; eviction drops records that
//! fell behind the retention horizon.

use crate::error::Result;
use crate::record::{window_order, EnrichmentStatus, NormalizedRecord};
use crate::store;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Persisted window document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowDocument {
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub records: Vec<NormalizedRecord>,
}

/// Counts from one merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
}

/// Combine a stored record with a freshly fetched one carrying the same id.
///
/// - stored `Done`: fresh metadata, stored summaries/status/attempts
/// - stored `Pending`/`Failed`: fresh record, stored attempt count
pub fn merge_record(existing: &NormalizedRecord, fresh: NormalizedRecord) -> NormalizedRecord {
    match existing.enrichment_status {
        EnrichmentStatus::Done => NormalizedRecord {
            summary_en: existing.summary_en.clone(),
            summary_native: existing.summary_native.clone(),
            enrichment_status: EnrichmentStatus::Done,
            enrichment_attempts: existing.enrichment_attempts,
            ..fresh
        },
        EnrichmentStatus::Pending | EnrichmentStatus::Failed => NormalizedRecord {
            enrichment_attempts: existing.enrichment_attempts,
            ..fresh
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct WindowStore {
    records: BTreeMap<String, NormalizedRecord>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the window from its persisted document (empty if absent).
    pub fn load(path: &Path) -> Result<Self> {
        let doc: WindowDocument = store::load_or_default(path)?;
        let mut window = Self::new();
        for record in doc.records {
            window.records.insert(record.id.clone(), record);
        }
        info!(path = %path.display(), records = window.len(), "Loaded window");
        Ok(window)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&NormalizedRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut NormalizedRecord> {
        self.records.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<NormalizedRecord> {
        self.records.remove(id)
    }

    /// Merge fetched candidates into the window.
    pub fn merge<I>(&mut self, candidates: I) -> MergeStats
    where
        I: IntoIterator<Item = NormalizedRecord>,
    {
        let mut stats = MergeStats::default();
        for candidate in candidates {
            match self.records.get(&candidate.id) {
                Some(existing) => {
                    let merged = merge_record(existing, candidate);
                    self.records.insert(merged.id.clone(), merged);
                    stats.updated += 1;
                }
                None => {
                    self.records.insert(candidate.id.clone(), candidate);
                    stats.inserted += 1;
                }
            }
        }
        info!(
            inserted = stats.inserted,
            updated = stats.updated,
            total = self.records.len(),
            "Merged candidates into window"
        );
        stats
    }

    /// Keep only records with `now - days_back <= published_at <= now`.
    ///
    /// The boundary day itself is retained. Records dated after `now` are
    /// dropped as well.
    pub fn evict(&mut self, days_back: u32, now: NaiveDate) -> Vec<NormalizedRecord> {
        let cutoff = now
            .checked_sub_days(Days::new(u64::from(days_back)))
            .unwrap_or(NaiveDate::MIN);
        let stale: Vec<String> = self
            .records
            .values()
            .filter(|r| r.published_at < cutoff || r.published_at > now)
            .map(|r| r.id.clone())
            .collect();

        let removed: Vec<NormalizedRecord> = stale
            .iter()
            .filter_map(|id| self.records.remove(id))
            .collect();

        if !removed.is_empty() {
            info!(removed = removed.len(), %cutoff, %now, "Evicted records outside window");
        } else {
            debug!(%cutoff, "Nothing to evict");
        }
        removed
    }

    /// Records in document order: `published_at` desc, then id asc.
    pub fn records(&self) -> Vec<&NormalizedRecord> {
        let mut out: Vec<&NormalizedRecord> = self.records.values().collect();
        out.sort_by(|a, b| window_order(a, b));
        out
    }

    /// Ids of records the enricher should process, in document order.
    pub fn enrichment_queue(&self, max_attempts: u32) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.needs_enrichment(max_attempts))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn to_document(&self, generated_at: DateTime<Utc>) -> WindowDocument {
        let records: Vec<NormalizedRecord> = self.records().into_iter().cloned().collect();
        WindowDocument {
            generated_at: Some(generated_at),
            total_count: records.len(),
            records,
        }
    }

    /// Atomically replace the persisted window.
    pub fn persist(&self, path: &Path, generated_at: DateTime<Utc>) -> Result<()> {
        store::write_atomic(path, &self.to_document(generated_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::{day, record};
    use tempfile::TempDir;

    fn done(id: &str, published: &str) -> NormalizedRecord {
        let mut r = record(id, published);
        r.summary_en = Some("english".to_string());
        r.summary_native = Some("中文".to_string());
        r.enrichment_status = EnrichmentStatus::Done;
        r.enrichment_attempts = 1;
        r
    }

    #[test]
    fn test_merge_record_keeps_done_summary() {
        let existing = done("arxiv:1", "2024-01-01");
        let mut fresh = record("arxiv:1", "2024-01-02");
        fresh.title = "Revised title".to_string();

        let merged = merge_record(&existing, fresh);
        assert_eq!(merged.title, "Revised title");
        assert_eq!(merged.published_at, day("2024-01-02"));
        assert_eq!(merged.summary_en.as_deref(), Some("english"));
        assert_eq!(merged.summary_native.as_deref(), Some("中文"));
        assert_eq!(merged.enrichment_status, EnrichmentStatus::Done);
    }

    #[test]
    fn test_merge_record_failed_keeps_attempts() {
        let mut existing = record("arxiv:1", "2024-01-01");
        existing.enrichment_status = EnrichmentStatus::Failed;
        existing.enrichment_attempts = 2;
        let mut fresh = record("arxiv:1", "2024-01-01");
        fresh.abstract_text = "updated".to_string();

        let merged = merge_record(&existing, fresh);
        assert_eq!(merged.abstract_text, "updated");
        assert_eq!(merged.enrichment_status, EnrichmentStatus::Pending);
        assert_eq!(merged.enrichment_attempts, 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let candidates = vec![
            record("arxiv:1", "2024-01-01"),
            record("iacr:2024/7", "2024-01-02"),
        ];
        let mut once = WindowStore::new();
        once.merge(candidates.clone());
        let mut twice = once.clone();
        let stats = twice.merge(candidates);

        assert_eq!(stats, MergeStats { inserted: 0, updated: 2 });
        assert_eq!(once.records(), twice.records());
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn test_merge_never_duplicates_within_batch() {
        let mut w = WindowStore::new();
        let stats = w.merge(vec![
            record("arxiv:1", "2024-01-01"),
            record("arxiv:1", "2024-01-01"),
        ]);
        assert_eq!(w.len(), 1);
        assert_eq!(stats, MergeStats { inserted: 1, updated: 1 });
    }

    #[test]
    fn test_evict_boundary_inclusive_and_idempotent() {
        let now = day("2024-01-10");
        let mut w = WindowStore::new();
        w.merge(vec![
            record("arxiv:old", "2024-01-02"),      // now - 8
            record("arxiv:boundary", "2024-01-03"), // now - 7
            record("arxiv:today", "2024-01-10"),
        ]);

        let removed = w.evict(7, now);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "arxiv:old");
        assert!(w.get("arxiv:boundary").is_some());
        assert!(w.get("arxiv:today").is_some());

        assert!(w.evict(7, now).is_empty());
    }

    #[test]
    fn test_window_holds_only_retained_range() {
        let now = day("2024-03-01");
        let mut w = WindowStore::new();
        let dates = [
            "2024-02-20",
            "2024-02-22",
            "2024-02-23",
            "2024-02-28",
            "2024-03-01",
            "2024-03-03",
        ];
        w.merge(
            dates
                .iter()
                .enumerate()
                .map(|(i, d)| record(&format!("arxiv:{}", i), d)),
        );
        let removed = w.evict(7, now);
        let cutoff = day("2024-02-23");
        for r in w.records() {
            assert!(r.published_at >= cutoff && r.published_at <= now);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(removed.len(), 3);
        assert!(w.get("arxiv:5").is_none(), "record dated after now must leave the window");
    }

    #[test]
    fn test_evict_future_dated_record() {
        let mut w = WindowStore::new();
        w.merge(vec![record("arxiv:future", "2024-01-12"), record("arxiv:now", "2024-01-10")]);
        let removed = w.evict(7, day("2024-01-10"));
        assert_eq!(removed.len(), 1);
        assert!(w.get("arxiv:future").is_none());
        assert!(w.get("arxiv:now").is_some());
    }

    #[test]
    fn test_evict_huge_horizon_keeps_past_records() {
        let mut w = WindowStore::new();
        w.merge(vec![record("arxiv:ancient", "1999-01-01")]);
        assert!(w.evict(u32::MAX, day("2024-01-10")).is_empty());
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_enrichment_queue_order_and_selection() {
        let mut w = WindowStore::new();
        let mut exhausted = record("arxiv:x", "2024-01-05");
        exhausted.enrichment_status = EnrichmentStatus::Failed;
        exhausted.enrichment_attempts = 3;
        w.merge(vec![
            record("arxiv:b", "2024-01-04"),
            done("arxiv:c", "2024-01-05"),
            record("arxiv:a", "2024-01-04"),
            record("arxiv:z", "2024-01-06"),
            exhausted,
        ]);
        assert_eq!(w.enrichment_queue(3), vec!["arxiv:z", "arxiv:a", "arxiv:b"]);
    }

    #[test]
    fn test_persist_and_load_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("papers.json");
        let mut w = WindowStore::new();
        w.merge(vec![done("arxiv:1", "2024-01-01"), record("iacr:2024/2", "2024-01-02")]);
        w.persist(&path, Utc::now())?;

        let loaded = WindowStore::load(&path)?;
        assert_eq!(loaded.records(), w.records());

        let doc: WindowDocument = store::load_or_default(&path)?;
        assert_eq!(doc.total_count, 2);
        assert_eq!(doc.records[0].id, "iacr:2024/2");
        Ok(())
    }
}
