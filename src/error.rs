use std::path::PathBuf;

/// Failures surfaced by the retrieval engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetrievalError {
    #[error("vector dimensions don't match: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("embedding provider failed: {reason}")]
    ProviderFailure { reason: String },

    #[error(transparent)]
    CorpusLoad(#[from] CorpusLoadError),

    #[error("corpus unavailable: {reason}")]
    CorpusUnavailable { reason: String },

    #[error("none of the {attempted} ranked passages could be hydrated")]
    HydrationFailure { attempted: usize },

    #[error("cache capacity must be positive, got {capacity}")]
    InvalidCacheCapacity { capacity: usize },
}

/// Reasons a persisted corpus snapshot cannot be turned into an index.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CorpusLoadError {
    #[error("snapshot not found at {0:?}")]
    Missing(PathBuf),

    #[error("snapshot at {0:?} contains no records")]
    Empty(PathBuf),

    #[error("snapshot at {path:?} is not valid: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid record #{index}: {reason}")]
    Invalid { index: usize, reason: String },

    #[error("failed to read snapshot at {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
