//! Error kinds that callers branch on.
//!
//! Plumbing errors use `anyhow`. The two external services whose failures
//! change the flow of an interactive session get typed errors instead:
//! GitHub (bad token vs. bad repository vs. transient) and the completion
//! model (whose failures must never be mistaken for an answer).

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("GitHub rejected the access token (check {0})")]
    Unauthorized(String),

    #[error("repository or branch not found: {0}")]
    NotFound(String),

    #[error("GitHub API rate limit exceeded")]
    RateLimited,

    #[error("GitHub API error {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("GitHub request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key not set: export {0}")]
    MissingApiKey(String),

    #[error("completion service rejected the API key")]
    Unauthorized,

    #[error("completion service rate limit exceeded")]
    RateLimited,

    #[error("completion service error {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("completion request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Map a non-success HTTP status to the matching error kind.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::Unauthorized,
            429 => LlmError::RateLimited,
            _ => LlmError::Http { status, message },
        }
    }
}
