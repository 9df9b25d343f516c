//! Custom error types for paperdigest.
//!
//! Library code returns `Result<T, PipelineError>`; only the binary reaches
//! for `anyhow`. Enrichment failures have their own categorised type in
//! [`crate::enricher::EnrichmentError`] because they are recorded per record
//! rather than propagated.

use thiserror::Error;

/// Main error type for paperdigest operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Feed or payload parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// External API returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The final document swap could not complete; the previous document is
    /// still the authoritative state.
    #[error("Persistence error writing {path}: {message}")]
    Persistence {
        /// Target document path
        path: String,
        /// Underlying cause
        message: String,
    },
}

/// Result type alias using `PipelineError`
pub type Result<T> = std::result::Result<T, PipelineError>;

