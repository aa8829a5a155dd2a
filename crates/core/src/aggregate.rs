//! Aggregate root traits and optimistic concurrency.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Incremented on every state change; repositories compare it against an
    /// [`ExpectedVersion`] before accepting a write.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (single-writer flows that own the aggregate).
    Any,
    /// The aggregate must not exist yet.
    NoAggregate,
    /// Require the aggregate to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// `actual` is `None` when nothing has been stored yet.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::NoAggregate, None) => true,
            (ExpectedVersion::NoAggregate, Some(_)) => false,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            (ExpectedVersion::Exact(v), None) => v == 0,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` validates and returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates must not perform IO. Because all checks happen in `handle`, a
/// rejected command never leaves a half-applied aggregate behind.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event (+1 version per event).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_version_matches_only_same_value() {
        assert!(ExpectedVersion::Exact(3).matches(Some(3)));
        assert!(!ExpectedVersion::Exact(3).matches(Some(4)));
        assert!(ExpectedVersion::Exact(0).matches(None));
    }

    #[test]
    fn no_aggregate_rejects_existing_state() {
        assert!(ExpectedVersion::NoAggregate.matches(None));
        let err = ExpectedVersion::NoAggregate.check(Some(1)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn any_always_matches() {
        assert!(ExpectedVersion::Any.matches(None));
        assert!(ExpectedVersion::Any.matches(Some(42)));
    }
}
