//! Records that exhausted their enrichment attempts.
//!
//! Not subject to the window's retention horizon. Entries leave only when the
//! same id is later enriched successfully, or when an operator clears them.

use crate::enricher::ErrorKind;
use crate::error::Result;
use crate::record::NormalizedRecord;
use crate::store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub record: NormalizedRecord,
    pub last_error: String,
    pub error_kind: ErrorKind,
    pub attempts: u32,
    pub quarantined_at: DateTime<Utc>,
}

/// Persisted quarantine document, entries ordered by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarantineDocument {
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub entries: Vec<QuarantineEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct QuarantineStore {
    entries: BTreeMap<String, QuarantineEntry>,
}

impl QuarantineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let doc: QuarantineDocument = store::load_or_default(path)?;
        let entries = doc
            .entries
            .into_iter()
            .map(|e| (e.record.id.clone(), e))
            .collect::<BTreeMap<_, _>>();
        info!(path = %path.display(), entries = entries.len(), "Loaded quarantine");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&QuarantineEntry> {
        self.entries.get(id)
    }

    /// Insert or overwrite by record id
    pub fn upsert(&mut self, entry: QuarantineEntry) {
        self.entries.insert(entry.record.id.clone(), entry);
    }

    pub fn remove(&mut self, id: &str) -> Option<QuarantineEntry> {
        self.entries.remove(id)
    }

    /// Drop every entry, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    /// Entries ordered by id
    pub fn entries(&self) -> impl Iterator<Item = &QuarantineEntry> {
        self.entries.values()
    }

    pub fn to_document(&self, generated_at: DateTime<Utc>) -> QuarantineDocument {
        let entries: Vec<QuarantineEntry> = self.entries.values().cloned().collect();
        QuarantineDocument {
            generated_at: Some(generated_at),
            count: entries.len(),
            entries,
        }
    }

    pub fn persist(&self, path: &Path, generated_at: DateTime<Utc>) -> Result<()> {
        store::write_atomic(path, &self.to_document(generated_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::record;
    use tempfile::TempDir;

    fn entry(id: &str, error: &str) -> QuarantineEntry {
        QuarantineEntry {
            record: record(id, "2024-01-01"),
            last_error: error.to_string(),
            error_kind: ErrorKind::Transport,
            attempts: 3,
            quarantined_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_overwrites_by_id() {
        let mut q = QuarantineStore::new();
        q.upsert(entry("arxiv:1", "first"));
        q.upsert(entry("arxiv:1", "second"));
        assert_eq!(q.len(), 1);
        assert_eq!(q.get("arxiv:1").map(|e| e.last_error.as_str()), Some("second"));
    }

    #[test]
    fn test_document_ordered_by_id() {
        let mut q = QuarantineStore::new();
        q.upsert(entry("iacr:2024/1", "e"));
        q.upsert(entry("arxiv:2", "e"));
        q.upsert(entry("arxiv:10", "e"));
        let doc = q.to_document(Utc::now());
        let ids: Vec<&str> = doc.entries.iter().map(|e| e.record.id.as_str()).collect();
        assert_eq!(ids, vec!["arxiv:10", "arxiv:2", "iacr:2024/1"]);
        assert_eq!(doc.count, 3);
    }

    #[test]
    fn test_persist_load_and_clear() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("failed.json");
        let mut q = QuarantineStore::new();
        q.upsert(entry("arxiv:1", "boom"));
        q.persist(&path, Utc::now())?;

        let mut loaded = QuarantineStore::load(&path)?;
        assert!(loaded.get("arxiv:1").is_some());
        assert_eq!(loaded.clear(), 1);
        assert!(loaded.is_empty());
        Ok(())
    }
}
