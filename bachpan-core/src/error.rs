use std::fmt;
use std::time::Duration;

/// Errors surfaced by the matching engine to its callers.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    /// Empty or malformed request payload. Not retried.
    InvalidInput(String),
    /// The embedder could not process the query image.
    EmbeddingFailed(String),
    /// The reference set is not built yet (or its first build failed).
    NotReady,
    /// The catalog yielded zero usable reference entries.
    BuildFailed(String),
    /// Another initialize/rebuild/append is still running.
    BuildInProgress,
    /// The request exceeded its deadline.
    TimedOut(Duration),
    /// Unexpected failure (e.g. a panicked worker or staging I/O).
    Internal(String),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "{msg}"),
            Self::EmbeddingFailed(msg) => write!(f, "embedding failed: {msg}"),
            Self::NotReady => write!(f, "reference set is not ready; retry later"),
            Self::BuildFailed(msg) => write!(f, "reference set build failed: {msg}"),
            Self::BuildInProgress => write!(f, "a reference set build is already running"),
            Self::TimedOut(after) => {
                write!(f, "request timed out after {:.1}s", after.as_secs_f64())
            }
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for MatchError {}
