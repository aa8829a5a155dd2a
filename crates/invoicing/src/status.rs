//! Invoice status, priority and reminder-level enums with their transition rules.

use serde::{Deserialize, Serialize};

use arrears_core::{DomainError, DomainResult};

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Overdue,
    PartiallyPaid,
    Paid,
    Disputed,
    InDefault,
    Cancelled,
}

impl InvoiceStatus {
    /// The transition table. Every status change goes through
    /// [`InvoiceStatus::ensure_transition`].
    pub fn allowed_transitions(self) -> &'static [InvoiceStatus] {
        use InvoiceStatus::*;
        match self {
            Pending => &[Overdue, PartiallyPaid, Paid, Disputed, Cancelled],
            Overdue => &[PartiallyPaid, Paid, Disputed, InDefault, Cancelled],
            PartiallyPaid => &[Overdue, Paid, Disputed, InDefault],
            Disputed => &[Pending, Overdue, PartiallyPaid, Paid, Cancelled],
            InDefault => &[PartiallyPaid, Paid, Cancelled],
            Paid | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn ensure_transition(self, next: InvoiceStatus) -> DomainResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::business_rule(format!(
                "invoice status transition {self:?} -> {next:?} is not allowed"
            )))
        }
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Statuses that still carry an open balance collections can act on.
    pub fn is_collectible(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Pending
                | InvoiceStatus::Overdue
                | InvoiceStatus::PartiallyPaid
                | InvoiceStatus::InDefault
        )
    }
}

/// Collection priority assigned by the prioritization service.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoicePriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Stage of the automated reminder sequence.
///
/// Ordered: `First < Second < Third < Escalated`. Progression is one step at a
/// time; `Escalated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderLevel {
    First,
    Second,
    Third,
    Escalated,
}

impl ReminderLevel {
    pub fn next(self) -> Option<ReminderLevel> {
        match self {
            ReminderLevel::First => Some(ReminderLevel::Second),
            ReminderLevel::Second => Some(ReminderLevel::Third),
            ReminderLevel::Third => Some(ReminderLevel::Escalated),
            ReminderLevel::Escalated => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Whether `self` may come right after `previous` in one campaign.
    ///
    /// The first reminder of a sequence must be `First`.
    pub fn follows(self, previous: Option<ReminderLevel>) -> bool {
        match previous {
            None => self == ReminderLevel::First,
            Some(prev) => prev.next() == Some(self),
        }
    }

    /// 1-based position in the sequence.
    pub fn ordinal(self) -> u32 {
        match self {
            ReminderLevel::First => 1,
            ReminderLevel::Second => 2,
            ReminderLevel::Third => 3,
            ReminderLevel::Escalated => 4,
        }
    }
}
