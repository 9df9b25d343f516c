//! Pipeline configuration.
//!
//! Loaded from `paperdigest.toml`; CLI flags override file values, which
//! override defaults. The result is an immutable [`PipelineConfig`] built once
//! per run. The enrichment API key is never stored in the file: the file names
//! the environment variable that holds it.

use crate::enricher::EnricherSettings;
use crate::error::{PipelineError, Result};
use crate::llm::LlmConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "paperdigest.toml";

/// Window document file name inside `data_dir`
pub const PAPERS_FILE: &str = "papers.json";

/// Quarantine document file name inside `data_dir`
pub const FAILED_FILE: &str = "failed.json";

/// Longest retention horizon accepted, in days
pub const MAX_DAYS_BACK: u32 = 3650;

/// Longest pause accepted for `rate_limit_delay` and `retry_delay`, in seconds
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Top-level config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub sources: SourcesSection,

    #[serde(default)]
    pub llm: LlmSection,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Retention horizon in days
    #[serde(default = "default_days_back")]
    pub days_back: u32,

    /// Summarization attempts per record before quarantine
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds to wait before every summarization call
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: f64,

    /// Initial backoff in seconds between retries of the same record
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Directory holding `papers.json` and `failed.json`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keyword policy file
    #[serde(default = "default_keywords_file")]
    pub keywords_file: PathBuf,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            days_back: default_days_back(),
            max_attempts: default_max_attempts(),
            rate_limit_delay: default_rate_limit_delay(),
            retry_delay: default_retry_delay(),
            data_dir: default_data_dir(),
            keywords_file: default_keywords_file(),
        }
    }
}

fn default_days_back() -> u32 {
    7
}
fn default_max_attempts() -> u32 {
    3
}
fn default_rate_limit_delay() -> f64 {
    1.0
}
fn default_retry_delay() -> f64 {
    5.0
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_keywords_file() -> PathBuf {
    PathBuf::from("keywords.txt")
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesSection {
    /// arXiv categories, e.g. `cs.CR`
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    #[serde(default = "default_true")]
    pub arxiv_enabled: bool,

    #[serde(default = "default_arxiv_max_results")]
    pub arxiv_max_results: usize,

    #[serde(default = "default_true")]
    pub iacr_enabled: bool,

    /// Per-request timeout for source fetches
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            arxiv_enabled: true,
            arxiv_max_results: default_arxiv_max_results(),
            iacr_enabled: true,
            timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_categories() -> Vec<String> {
    ["cs.CR", "cs.AI", "cs.CL", "cs.LG"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}
fn default_true() -> bool {
    true
}
fn default_arxiv_max_results() -> usize {
    200
}
fn default_fetch_timeout() -> u64 {
    30
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier passed through to the API
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Language of the second summary
    #[serde(default = "default_native_language")]
    pub native_language: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            native_language: default_native_language(),
            timeout_secs: default_llm_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".into()
}
fn default_model() -> String {
    "qwen-plus".into()
}
fn default_api_key_env() -> String {
    "DASHSCOPE_API_KEY".into()
}
fn default_native_language() -> String {
    "Chinese".into()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    800
}
fn default_temperature() -> f32 {
    0.3
}

impl PipelineConfig {
    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PipelineError::Config(format!("Invalid config: {}", e)))
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.max_attempts == 0 {
            return Err(PipelineError::Validation("max_attempts must be at least 1".into()));
        }
        if p.days_back > MAX_DAYS_BACK {
            return Err(PipelineError::Validation(format!(
                "days_back must be at most {}, got {}",
                MAX_DAYS_BACK, p.days_back
            )));
        }
        for (name, value) in [("rate_limit_delay", p.rate_limit_delay), ("retry_delay", p.retry_delay)] {
            if !(0.0..=MAX_DELAY_SECS).contains(&value) {
                return Err(PipelineError::Validation(format!(
                    "{} must be between 0 and {} seconds, got {}",
                    name, MAX_DELAY_SECS, value
                )));
            }
        }
        if self.llm.model.trim().is_empty() {
            return Err(PipelineError::Validation("llm.model must not be empty".into()));
        }
        if self.sources.arxiv_max_results == 0 {
            return Err(PipelineError::Validation("arxiv_max_results must be at least 1".into()));
        }
        Ok(())
    }

    pub fn papers_path(&self) -> PathBuf {
        self.pipeline.data_dir.join(PAPERS_FILE)
    }

    pub fn failed_path(&self) -> PathBuf {
        self.pipeline.data_dir.join(FAILED_FILE)
    }

    pub fn enricher_settings(&self) -> EnricherSettings {
        EnricherSettings {
            model: self.llm.model.clone(),
            max_attempts: self.pipeline.max_attempts,
            rate_limit_delay: delay(self.pipeline.rate_limit_delay),
            retry_delay: delay(self.pipeline.retry_delay),
        }
    }

    /// Build the LLM client config, reading the key from the environment.
    pub fn llm_config(&self) -> Result<LlmConfig> {
        let api_key = std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Config(format!("API key not set: export {}", self.llm.api_key_env))
            })?;
        Ok(LlmConfig {
            base_url: self.llm.base_url.clone(),
            api_key,
            native_language: self.llm.native_language.clone(),
            timeout_secs: self.llm.timeout_secs,
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
        })
    }
}

/// Seconds to `Duration`, clamped to `[0, MAX_DELAY_SECS]`. NaN becomes zero.
fn delay(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_DELAY_SECS)).unwrap_or_default()
}
