//! Escalation evaluation for payment campaigns.
//!
//! Independent checks over a campaign snapshot produce a set of reasons; a fixed
//! table maps reasons to follow-up actions. Pure and deterministic.

pub mod reason;
pub mod service;

pub use reason::{EscalationAction, EscalationReason};
pub use service::{EscalationContext, EscalationDecision, EscalationService, EscalationThresholds};
