//! Error types for the KATO pattern-matching core.

/// Result type alias for KATO operations.
pub type Result<T> = std::result::Result<T, KatoError>;

/// Main error type for the KATO system.
///
/// Variants correspond to the error kinds in the error-handling design:
/// validation failures, session lookup failures, storage outages, deadline
/// overruns, invariant violations, and retriable write races.
#[derive(Debug, thiserror::Error)]
pub enum KatoError {
    /// Malformed input: wrong vector dimensionality, non-numeric emotives,
    /// an empty observation with no symbols and no vectors.
    #[error("validation error: {0}")]
    Validation(String),

    /// The session id is not known to the session store.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session existed but its TTL has elapsed.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// A pattern name is not known to the pattern store.
    #[error("pattern not found: {0}")]
    PatternNotFound(String),

    /// An underlying store returned a non-retriable error, or retries were
    /// exhausted. Never downgraded to an empty result - the caller must see
    /// the outage.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A predict call exceeded its deployment-configured deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// A store returned state that violates a data-model invariant (e.g.
    /// frequency 0 for a pattern known to exist). Fatal; must surface.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A concurrent writer race that the per-session lock did not prevent.
    /// Treated as retriable by the orchestrator up to a small bound.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wrapped anyhow errors, used only at adapter boundaries.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KatoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound(session_id.into())
    }

    pub fn session_expired(session_id: impl Into<String>) -> Self {
        Self::SessionExpired(session_id.into())
    }

    pub fn pattern_not_found(name: impl Into<String>) -> Self {
        Self::PatternNotFound(name.into())
    }

    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Whether the orchestrator may retry the operation that produced this
    /// error. Only `Conflict` is retriable; every other kind propagates.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_) | Self::SessionExpired(_) | Self::PatternNotFound(_)
        )
    }
}
