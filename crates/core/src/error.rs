//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Every variant
/// is surfaced to the caller; none of them is retried automatically except
/// `Conflict`, which callers resolve by reloading the aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input: negative money, mismatched currency or ids, empty
    /// invoice lists, illegal reminder-level jumps.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A legal request that the current state does not permit (status
    /// transition not allowed, escalating twice, ...).
    #[error("business rule violated: {0}")]
    BusinessRule(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested aggregate or entity was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stale version / optimistic concurrency failure.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn business_rule(msg: impl Into<String>) -> Self {
        Self::BusinessRule(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Whether the caller may reload and retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
