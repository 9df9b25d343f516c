//! Keyword policy and the AND/OR record filter.
//!
//! Policy file format, one rule per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! large language model, security
//! zero-knowledge
//! ```
//!
//! Terms on a line are ANDed, lines are ORed. Matching is a case-insensitive
//! substring test against `title + abstract`.

use crate::record::NormalizedRecord;
use std::path::Path;
use tracing::{debug, info, warn};

/// A single rule: every term must be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    terms: Vec<String>,
}

impl KeywordRule {
    /// Build a rule from raw terms. Returns `None` when no non-empty term remains.
    pub fn new<I, S>(terms: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        (!terms.is_empty()).then_some(Self { terms })
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// `haystack` must already be lowercased.
    fn matches_lowercase(&self, haystack: &str) -> bool {
        self.terms.iter().all(|t| haystack.contains(t.as_str()))
    }
}

/// Problem found while reading a policy. Never fatal: the filter fails open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyWarning {
    /// Policy file does not exist
    Missing(String),
    /// Policy file could not be read
    Unreadable(String),
    /// Line had no usable terms
    EmptyRule { line: usize, text: String },
}

impl std::fmt::Display for PolicyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyWarning::Missing(path) => write!(f, "policy file not found: {}", path),
            PolicyWarning::Unreadable(msg) => write!(f, "policy file unreadable: {}", msg),
            PolicyWarning::EmptyRule { line, text } => {
                write!(f, "line {}: no terms in rule {:?}", line, text)
            }
        }
    }
}

/// Compiled rule set. Empty means accept everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordPolicy {
    rules: Vec<KeywordRule>,
}

impl KeywordPolicy {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// Policy that accepts every record
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse the line-oriented policy text.
    pub fn parse(text: &str) -> (Self, Vec<PolicyWarning>) {
        let mut rules = Vec::new();
        let mut warnings = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match KeywordRule::new(line.split(',')) {
                Some(rule) => rules.push(rule),
                None => warnings.push(PolicyWarning::EmptyRule {
                    line: idx + 1,
                    text: line.to_string(),
                }),
            }
        }

        (Self { rules }, warnings)
    }

    /// Load a policy file. A missing or unreadable file yields an empty
    /// (accept-all) policy plus a warning rather than an error.
    pub fn load(path: &Path) -> (Self, Vec<PolicyWarning>) {
        if !path.exists() {
            return (
                Self::accept_all(),
                vec![PolicyWarning::Missing(path.display().to_string())],
            );
        }
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let (policy, warnings) = Self::parse(&text);
                debug!(path = %path.display(), rules = policy.rules.len(), "Loaded keyword policy");
                (policy, warnings)
            }
            Err(e) => (
                Self::accept_all(),
                vec![PolicyWarning::Unreadable(format!("{}: {}", path.display(), e))],
            ),
        }
    }

    /// OR across rules, AND within a rule.
    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let haystack = record.searchable_text().to_lowercase();
        self.rules.iter().any(|r| r.matches_lowercase(&haystack))
    }

    /// Keep only matching records, preserving input order.
    pub fn filter(&self, records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
        let total = records.len();
        if self.rules.is_empty() {
            warn!(total, "Keyword policy is empty, accepting all records");
            return records;
        }
        let kept: Vec<NormalizedRecord> = records.into_iter().filter(|r| self.matches(r)).collect();
        info!(kept = kept.len(), total, rules = self.rules.len(), "Keyword filter applied");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::record;
    use crate::record::EnrichmentStatus;

    fn with_text(title: &str, abstract_text: &str) -> NormalizedRecord {
        let mut r = record("arxiv:1", "2024-01-01");
        r.title = title.to_string();
        r.abstract_text = abstract_text.to_string();
        r
    }

    fn policy(rules: &[&[&str]]) -> KeywordPolicy {
        KeywordPolicy::new(
            rules
                .iter()
                .filter_map(|terms| KeywordRule::new(terms.iter()))
                .collect(),
        )
    }

    #[test]
    fn test_and_within_or_across() {
        let p = policy(&[&["a", "b"], &["c"]]);
        assert!(p.matches(&with_text("a", "b")));
        assert!(p.matches(&with_text("x", "c")));
        assert!(!p.matches(&with_text("a", "x")));
        assert!(!p.matches(&with_text("b only", "nothing")));
        assert!(p.matches(&with_text("a c", "")));
    }

    #[test]
    fn test_empty_policy_accepts_everything() {
        let p = KeywordPolicy::accept_all();
        assert!(p.is_empty());
        assert!(p.matches(&with_text("", "")));
        let input = vec![with_text("x", "y"), with_text("z", "w")];
        assert_eq!(p.filter(input).len(), 2);
    }

    #[test]
    fn test_case_insensitive_substring() {
        let p = policy(&[&["LLM", "Security"]]);
        assert!(p.matches(&with_text("LLMs for network SECURITY", "")));
        assert!(p.matches(&with_text("Secure", "an llm-based insecurity study")));
    }

    #[test]
    fn test_filter_does_not_touch_status() {
        let p = policy(&[&["title"]]);
        let mut r = record("arxiv:9", "2024-01-01");
        r.enrichment_status = EnrichmentStatus::Failed;
        r.enrichment_attempts = 2;
        let out = p.filter(vec![r.clone()]);
        assert_eq!(out, vec![r]);
    }

    #[test]
    fn test_parse_policy_text() {
        let text = "# header\n\nlarge language model, security\n  zero-knowledge  \n , ,\n";
        let (p, warnings) = KeywordPolicy::parse(text);
        assert_eq!(p.rules().len(), 2);
        assert_eq!(p.rules()[0].terms(), ["large language model", "security"]);
        assert_eq!(p.rules()[1].terms(), ["zero-knowledge"]);
        assert_eq!(
            warnings,
            vec![PolicyWarning::EmptyRule { line: 5, text: ", ,".to_string() }]
        );
    }

    #[test]
    fn test_missing_file_fails_open() {
        let (p, warnings) = KeywordPolicy::load(Path::new("/nonexistent/keywords.txt"));
        assert!(p.is_empty());
        assert!(matches!(warnings.as_slice(), [PolicyWarning::Missing(_)]));
    }
}
