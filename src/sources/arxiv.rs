//! arXiv API adapter.
//!
//! Queries the Atom export API for the newest submissions in the configured
//! categories, sorted by submission date.
//!
//! API Notes:
//! - `search_query=cat:cs.CR OR cat:cs.AI`
//! - Errors come back as a 200 feed with a single entry whose id points at
//!   `/api/errors`
//! - Ids carry a version suffix (`v2`) that is dropped so the id is stable

use super::{fetch_text, normalize_ws, SourceAdapter};
use crate::error::{PipelineError, Result};
use crate::record::{NormalizedRecord, Source};
use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info, warn};

/// arXiv Atom API endpoint
pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

/// One `<entry>` as it appears in the feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArxivEntry {
    pub id_url: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
}

pub struct ArxivAdapter {
    client: reqwest::Client,
    base_url: String,
    max_results: usize,
}

impl ArxivAdapter {
    pub fn new(client: reqwest::Client, max_results: usize) -> Self {
        Self {
            client,
            base_url: ARXIV_API_URL.to_string(),
            max_results,
        }
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn source(&self) -> Source {
        Source::Arxiv
    }

    async fn fetch(&self, categories: &[String]) -> Result<Vec<NormalizedRecord>> {
        let Some(search_query) = build_search_query(categories) else {
            warn!("No arXiv categories configured, skipping arXiv");
            return Ok(Vec::new());
        };

        info!(query = %search_query, max_results = self.max_results, "Starting arXiv query");

        let query = [
            ("search_query", search_query),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
            ("start", "0".to_string()),
            ("max_results", self.max_results.to_string()),
        ];
        let body = fetch_text(&self.client, &self.base_url, &query).await?;
        let entries = parse_feed(&body)?;
        let total = entries.len();

        let records: Vec<NormalizedRecord> = entries.into_iter().filter_map(normalize).collect();
        if records.len() < total {
            debug!(dropped = total - records.len(), "Dropped incomplete arXiv entries");
        }
        Ok(records)
    }
}

/// `cat:a OR cat:b`, or `None` when no category is usable
pub fn build_search_query(categories: &[String]) -> Option<String> {
    let cats: Vec<String> = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| format!("cat:{}", c))
        .collect();
    (!cats.is_empty()).then(|| cats.join(" OR "))
}

/// `http://arxiv.org/abs/2401.01234v2` -> `2401.01234`
pub fn arxiv_id_from_url(url: &str) -> Option<String> {
    let u = url.trim();
    let i = u.rfind("/abs/")?;
    let tail = u[i + "/abs/".len()..].trim_matches('/');
    let id = strip_version(tail);
    (!id.is_empty()).then(|| id.to_string())
}

fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos)
            if pos > 0
                && pos + 1 < id.len()
                && id[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &id[..pos]
        }
        _ => id,
    }
}

/// Map a feed entry into the canonical schema.
pub fn normalize(entry: ArxivEntry) -> Option<NormalizedRecord> {
    let native_id = arxiv_id_from_url(&entry.id_url)?;
    let title = normalize_ws(&entry.title);
    if title.is_empty() {
        return None;
    }
    let published_at = NaiveDate::parse_from_str(entry.published.get(..10)?, "%Y-%m-%d").ok()?;

    let mut record = NormalizedRecord::new(
        Source::Arxiv,
        &native_id,
        title,
        normalize_ws(&entry.summary),
        published_at,
        format!("https://arxiv.org/abs/{}", native_id),
    );
    record.authors = entry.authors;
    record.categories = entry.categories;
    Some(record)
}

fn term_attribute(e: &BytesStart) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"term")
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

/// Parse an Atom feed body into entries.
pub fn parse_feed(body: &str) -> Result<Vec<ArxivEntry>> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut entries = Vec::new();
    let mut cur = ArxivEntry::default();
    let mut in_entry = false;
    let mut in_author = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    cur = ArxivEntry::default();
                    in_entry = true;
                }
                b"author" if in_entry => in_author = true,
                b"category" if in_entry => cur.categories.extend(term_attribute(&e)),
                _ => text.clear(),
            },
            Ok(Event::Empty(e)) => {
                if in_entry && e.local_name().as_ref() == b"category" {
                    cur.categories.extend(term_attribute(&e));
                }
            }
            Ok(Event::Text(t)) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| PipelineError::Parse(format!("arXiv feed text: {}", e)))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(c)) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Ok(Event::End(e)) => {
                if in_entry {
                    match e.local_name().as_ref() {
                        b"id" => cur.id_url = text.trim().to_string(),
                        b"title" => cur.title = normalize_ws(&text),
                        b"summary" => cur.summary = normalize_ws(&text),
                        b"published" => cur.published = text.trim().to_string(),
                        b"name" if in_author => {
                            let name = normalize_ws(&text);
                            if !name.is_empty() {
                                cur.authors.push(name);
                            }
                        }
                        b"author" => in_author = false,
                        b"entry" => {
                            in_entry = false;
                            if cur.id_url.contains("/api/errors") {
                                return Err(PipelineError::Api {
                                    code: 400,
                                    message: format!("arXiv API error: {}", cur.summary),
                                });
                            }
                            entries.push(std::mem::take(&mut cur));
                        }
                        _ => {}
                    }
                }
                text.clear();
            }
            Err(e) => {
                return Err(PipelineError::Parse(format!(
                    "arXiv feed at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EnrichmentStatus;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/2401.01234v2</id>
    <updated>2024-01-04T10:00:00Z</updated>
    <published>2024-01-03T18:59:59Z</published>
    <title>Jailbreaking Large Language
      Models via Prompt Injection</title>
    <summary>  We study prompt injection &amp; defenses
      for LLM agents.  </summary>
    <author><name>Alice Example</name></author>
    <author><name>Bob Example</name><arxiv:affiliation>Uni</arxiv:affiliation></author>
    <link href="http://arxiv.org/abs/2401.01234v2" rel="alternate" type="text/html"/>
    <arxiv:primary_category term="cs.CR" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CR" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/cs/9901001v1</id>
    <published>not-a-date</published>
    <title>Old style</title>
    <summary>x</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 2);
        let e = &entries[0];
        assert_eq!(e.id_url, "http://arxiv.org/abs/2401.01234v2");
        assert_eq!(e.title, "Jailbreaking Large Language Models via Prompt Injection");
        assert_eq!(e.summary, "We study prompt injection & defenses for LLM agents.");
        assert_eq!(e.authors, vec!["Alice Example", "Bob Example"]);
        assert_eq!(e.categories, vec!["cs.CR", "cs.AI"]);
    }

    #[test]
    fn test_normalize_entry() {
        let mut entries = parse_feed(FEED).unwrap().into_iter();
        let record = entries.next().and_then(normalize).unwrap();
        assert_eq!(record.id, "arxiv:2401.01234");
        assert_eq!(record.source, Source::Arxiv);
        assert_eq!(record.published_at.to_string(), "2024-01-03");
        assert_eq!(record.url, "https://arxiv.org/abs/2401.01234");
        assert_eq!(record.enrichment_status, EnrichmentStatus::Pending);
        assert_eq!(record.enrichment_attempts, 0);

        // unparseable date is dropped
        assert!(entries.next().and_then(normalize).is_none());
    }

    #[test]
    fn test_arxiv_id_from_url() {
        assert_eq!(arxiv_id_from_url("http://arxiv.org/abs/2401.01234v12").as_deref(), Some("2401.01234"));
        assert_eq!(arxiv_id_from_url("http://arxiv.org/abs/cs/9901001v1").as_deref(), Some("cs/9901001"));
        assert_eq!(arxiv_id_from_url("http://arxiv.org/abs/2401.01234").as_deref(), Some("2401.01234"));
        assert_eq!(arxiv_id_from_url("http://example.org/"), None);
    }

    #[test]
    fn test_build_search_query() {
        let cats = vec!["cs.CR".to_string(), " ".to_string(), "cs.AI".to_string()];
        assert_eq!(build_search_query(&cats).as_deref(), Some("cat:cs.CR OR cat:cs.AI"));
        assert_eq!(build_search_query(&[]), None);
    }

    #[test]
    fn test_api_error_feed() {
        let body = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>http://arxiv.org/api/errors#incorrect_id_format</id>
            <title>Error</title><summary>incorrect id format</summary></entry></feed>"#;
        assert!(matches!(parse_feed(body), Err(PipelineError::Api { .. })));
    }
}
