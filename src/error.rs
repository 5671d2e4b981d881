//! Domain error model.
//!
//! Callers branch on the variant, not on message text: "expected absence"
//! (repository unknown), precondition failures (analysis not finished), and
//! infrastructure failures are distinct kinds. Hosting-API failures carry
//! their classification (not-found / rate-limited / network / timeout) so
//! the session's terminal error message can name the cause.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LensError>;

#[derive(Error, Debug)]
pub enum LensError {
    /// Malformed or unsupported repository URL. Rejected synchronously;
    /// never creates a session.
    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),

    /// The hosting API reported the repository does not exist.
    #[error("repository not found on host: {0}")]
    HostNotFound(String),

    /// The hosting API rejected the request due to rate limiting.
    #[error("hosting API rate limit exceeded; set GITHUB_TOKEN to raise the limit")]
    HostRateLimited,

    /// Transport-level failure talking to an external collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// An external call exceeded its bounded timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Caller-supplied input rejected before any work started.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No analysis session exists for the requested repository id.
    #[error("no analysis found for repository {0}")]
    NotFound(String),

    /// The current session is still `processing`; results are not yet
    /// servable.
    #[error("analysis still processing for repository {0}")]
    Processing(String),

    /// The current session terminated in `failed`.
    #[error("analysis failed: {0}")]
    Failed(String),

    /// The generative service returned something unusable. Absorbed by the
    /// fallback path during analysis; surfaced only from direct model use.
    #[error("model response rejected: {0}")]
    BadModelResponse(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

impl LensError {
    /// Message recorded on a session's `failed` transition.
    pub fn classified_message(&self) -> String {
        match self {
            LensError::HostNotFound(_) => format!("not_found: {self}"),
            LensError::HostRateLimited => format!("rate_limited: {self}"),
            LensError::Timeout(_) => format!("timeout: {self}"),
            LensError::Network(_) => format!("network: {self}"),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for LensError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LensError::Timeout(err.to_string())
        } else {
            LensError::Network(err.to_string())
        }
    }
}
