//! OpenAI-compatible chat completions client used for summarization.
//!
//! Works against any `/chat/completions` endpoint (DashScope compatible mode,
//! ModelScope, OpenAI). HTTP failures are classified into the enrichment error
//! categories so auth/quota problems can be told apart from rate limiting.

use crate::enricher::{BilingualSummary, EnrichmentError, Summarizer, SummaryRequest};
use crate::error::{PipelineError, Result};
use crate::prompts::summary::{build_system_prompt, build_user_prompt};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Body fragments that mark a rejection as credential/quota related
const AUTH_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "unauthorized",
    "invalid token",
    "authentication",
    "quota",
    "arrearage",
    "insufficient balance",
    "real-name",
    "real name",
    "实名",
    "verification",
];

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    /// Language of the second summary, e.g. "Chinese"
    pub native_language: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Token usage tracking
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Accumulated token usage with atomic counters
struct AtomicTokenUsage {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
}

impl AtomicTokenUsage {
    fn new() -> Self {
        Self {
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
        }
    }

    fn add(&self, usage: &ApiUsage) {
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(usage.completion_tokens, Ordering::Relaxed);
        self.total_tokens.fetch_add(usage.total_tokens, Ordering::Relaxed);
    }

    fn get(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Summarizer backed by a chat completions endpoint
pub struct LlmSummarizer {
    client: reqwest::Client,
    config: LlmConfig,
    system_prompt: String,
    usage: AtomicTokenUsage,
}

impl LlmSummarizer {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("paperdigest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let system_prompt = build_system_prompt(&config.native_language);
        Ok(Self {
            client,
            config,
            system_prompt,
            usage: AtomicTokenUsage::new(),
        })
    }

    /// Tokens consumed so far by this client
    pub fn usage(&self) -> TokenUsage {
        self.usage.get()
    }

    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> std::result::Result<BilingualSummary, EnrichmentError> {
        let request_body = serde_json::json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": build_user_prompt(&request.title, &request.abstract_text)}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        debug!(model = %request.model, "Sending summarization request");

        let response = self
            .client
            .post(self.api_url())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &error_text));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Malformed(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(usage) = &api_response.usage {
            self.usage.add(usage);
        }

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        parse_summary(&content)
    }
}

/// Map a non-success HTTP status plus body to an enrichment error category.
///
/// 401 is always auth. 403 is ambiguous (some providers use it for rate
/// limiting) and is auth only when the body says so.
pub fn classify_failure(status: StatusCode, body: &str) -> EnrichmentError {
    let preview: String = body.chars().take(300).collect();
    let message = format!("LLM API error: {} - {}", status, preview);
    let lower = body.to_lowercase();
    let mentions_auth = AUTH_MARKERS.iter().any(|m| lower.contains(m));

    match status {
        StatusCode::UNAUTHORIZED => EnrichmentError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => EnrichmentError::Transport(message),
        s if s.is_server_error() => EnrichmentError::Transport(message),
        _ if mentions_auth => EnrichmentError::Auth(message),
        _ => EnrichmentError::Transport(message),
    }
}

/// Parse model output into a summary pair
fn parse_summary(content: &str) -> std::result::Result<BilingualSummary, EnrichmentError> {
    let json_str = extract_json(content);
    serde_json::from_str::<BilingualSummary>(&json_str).map_err(|e| {
        let preview: String = content.chars().take(200).collect();
        info!(error = %e, content_preview = %preview, "LLM output parse failed");
        EnrichmentError::Malformed(format!("Parse error: {}", e))
    })
}

/// Extract JSON from LLM response (handles markdown code blocks)
fn extract_json(content: &str) -> String {
    let trimmed = content.trim();

    // Check for markdown code block
    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() >= 2 {
            let start = if lines[0].starts_with("```") { 1 } else { 0 };
            let end = if lines.last().map(|l| l.trim()) == Some("```") {
                lines.len() - 1
            } else {
                lines.len()
            };
            return lines[start..end].join("\n");
        }
    }

    // Try to find JSON object in the text
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}
