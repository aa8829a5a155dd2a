use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arrears_core::{AggregateRoot, Currency, DomainError, DomainResult, Money};
use arrears_customers::CustomerId;

use crate::status::{InvoicePriority, InvoiceStatus, ReminderLevel};

arrears_core::uuid_id!(
    /// Invoice identifier.
    InvoiceId,
    "InvoiceId"
);

/// How a payment reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Card,
    Ach,
    Check,
    DirectDebit,
    Cash,
    Other,
}

/// Billed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl InvoiceLine {
    pub fn total(&self) -> DomainResult<Money> {
        self.unit_price
            .multiply(rust_decimal::Decimal::from(self.quantity))
    }
}

/// One entry of the invoice's payment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub balance_after: Money,
}

/// Input for [`Invoice::issue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub invoice_number: String,
    pub amount: Money,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub lines: Vec<InvoiceLine>,
}

/// An invoice as seen by collections.
///
/// Invariants, checked after every mutation:
/// - `current_balance <= original_amount`
/// - `status == Paid` exactly when `current_balance` is zero
///
/// Every mutating method validates first and mutates last, so an `Err` leaves
/// the invoice untouched. Each successful mutation bumps `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    customer_id: CustomerId,
    invoice_number: String,
    original_amount: Money,
    current_balance: Money,
    issue_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    status: InvoiceStatus,
    lines: Vec<InvoiceLine>,
    payments: Vec<InvoicePayment>,
    reminder_count: u32,
    current_reminder_level: Option<ReminderLevel>,
    last_reminder_at: Option<DateTime<Utc>>,
    escalated_at: Option<DateTime<Utc>>,
    dispute_reason: Option<String>,
    risk_score: Option<f64>,
    priority: InvoicePriority,
    version: u64,
}

impl Invoice {
    /// Create a pending invoice.
    pub fn issue(new: NewInvoice) -> DomainResult<Self> {
        if !new.amount.is_positive() {
            return Err(DomainError::validation("invoice amount must be positive"));
        }
        if new.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number must not be empty"));
        }
        if new.due_date < new.issue_date {
            return Err(DomainError::validation("due date must not precede issue date"));
        }
        if !new.lines.is_empty() {
            let mut total = Money::zero(new.amount.currency());
            for line in &new.lines {
                if line.quantity == 0 {
                    return Err(DomainError::validation(
                        "invoice line quantity must be positive",
                    ));
                }
                total = total.checked_add(&line.total()?)?;
            }
            if total != new.amount {
                return Err(DomainError::validation(format!(
                    "invoice lines total {total} does not match invoice amount {}",
                    new.amount
                )));
            }
        }

        Ok(Self {
            id: new.id,
            customer_id: new.customer_id,
            invoice_number: new.invoice_number,
            original_amount: new.amount,
            current_balance: new.amount,
            issue_date: new.issue_date,
            due_date: new.due_date,
            status: InvoiceStatus::Pending,
            lines: new.lines,
            payments: Vec::new(),
            reminder_count: 0,
            current_reminder_level: None,
            last_reminder_at: None,
            escalated_at: None,
            dispute_reason: None,
            risk_score: None,
            priority: InvoicePriority::default(),
            version: 1,
        })
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn original_amount(&self) -> Money {
        self.original_amount
    }

    pub fn current_balance(&self) -> Money {
        self.current_balance
    }

    pub fn currency(&self) -> Currency {
        self.original_amount.currency()
    }

    pub fn issue_date(&self) -> DateTime<Utc> {
        self.issue_date
    }

    pub fn due_date(&self) -> DateTime<Utc> {
        self.due_date
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn payments(&self) -> &[InvoicePayment] {
        &self.payments
    }

    pub fn reminder_count(&self) -> u32 {
        self.reminder_count
    }

    pub fn current_reminder_level(&self) -> Option<ReminderLevel> {
        self.current_reminder_level
    }

    pub fn last_reminder_at(&self) -> Option<DateTime<Utc>> {
        self.last_reminder_at
    }

    pub fn escalated_at(&self) -> Option<DateTime<Utc>> {
        self.escalated_at
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated_at.is_some()
    }

    pub fn dispute_reason(&self) -> Option<&str> {
        self.dispute_reason.as_deref()
    }

    pub fn risk_score(&self) -> Option<f64> {
        self.risk_score
    }

    pub fn priority(&self) -> InvoicePriority {
        self.priority
    }

    pub fn total_paid(&self) -> Money {
        // original >= balance is an invariant.
        self.original_amount
            .checked_sub(&self.current_balance)
            .unwrap_or_else(|_| Money::zero(self.currency()))
    }

    /// Whole days past the due date; zero when not yet due.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.due_date).num_days().max(0)
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        now > self.due_date
    }

    /// Invariant: payments are only accepted on collectible, unpaid invoices.
    pub fn can_accept_payment(&self) -> bool {
        (self.status.is_collectible() || self.status == InvoiceStatus::Disputed)
            && self.current_balance.is_positive()
    }

    /// Third reminder went out, 21+ days overdue and not escalated yet.
    pub fn requires_escalation(&self, now: DateTime<Utc>) -> bool {
        self.current_reminder_level == Some(ReminderLevel::Third)
            && self.days_overdue(now) >= 21
            && !self.is_escalated()
    }

    /// Move to `next`, validated against the transition table.
    ///
    /// `Paid` is only reachable through a payment that clears the balance.
    pub fn transition_to(&mut self, next: InvoiceStatus) -> DomainResult<()> {
        if next == InvoiceStatus::Paid {
            return Err(DomainError::business_rule(
                "an invoice becomes paid only by recording payments",
            ));
        }
        self.status.ensure_transition(next)?;
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Flag a past-due invoice as overdue. Returns `false` when nothing changed.
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> DomainResult<bool> {
        if self.status == InvoiceStatus::Overdue {
            return Ok(false);
        }
        if !self.is_past_due(now) {
            return Err(DomainError::business_rule(format!(
                "invoice {} is not past its due date",
                self.invoice_number
            )));
        }
        if !matches!(
            self.status,
            InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid
        ) {
            return Ok(false);
        }
        self.transition_to(InvoiceStatus::Overdue)?;
        Ok(true)
    }

    /// Apply a payment against the open balance.
    ///
    /// Returns the resulting status (`Paid` or `PartiallyPaid`).
    pub fn record_payment(
        &mut self,
        amount: Money,
        method: PaymentMethod,
        reference: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> DomainResult<InvoiceStatus> {
        if !amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        amount.ensure_same_currency(&self.current_balance)?;
        if !self.can_accept_payment() {
            return Err(DomainError::business_rule(format!(
                "invoice {} cannot accept payments in status {:?}",
                self.invoice_number, self.status
            )));
        }
        let new_balance = self.current_balance.checked_sub(&amount).map_err(|_| {
            DomainError::business_rule(format!(
                "payment {amount} exceeds outstanding balance {}",
                self.current_balance
            ))
        })?;

        let next = if new_balance.is_zero() {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        };
        if next != self.status {
            self.status.ensure_transition(next)?;
        }

        self.current_balance = new_balance;
        self.status = next;
        self.payments.push(InvoicePayment {
            amount,
            method,
            reference,
            paid_at,
            balance_after: new_balance,
        });
        self.touch();
        Ok(next)
    }

    /// Record that a reminder at `level` went out.
    pub fn record_reminder_sent(
        &mut self,
        level: ReminderLevel,
        sent_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.is_collectible() {
            return Err(DomainError::business_rule(format!(
                "cannot remind on invoice in status {:?}",
                self.status
            )));
        }
        if let Some(current) = self.current_reminder_level {
            if level < current {
                return Err(DomainError::business_rule(format!(
                    "reminder level cannot move back from {current:?} to {level:?}"
                )));
            }
        }
        self.reminder_count += 1;
        self.current_reminder_level = Some(level);
        self.last_reminder_at = Some(sent_at);
        self.touch();
        Ok(())
    }

    /// Hand the invoice over to escalated collection.
    ///
    /// Overdue and partially paid invoices move to `InDefault`; the reminder
    /// level becomes `Escalated` and priority `Critical`.
    pub fn escalate(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.is_escalated() {
            return Err(DomainError::business_rule(format!(
                "invoice {} is already escalated",
                self.invoice_number
            )));
        }
        if !self.current_balance.is_positive() || self.status.is_terminal() {
            return Err(DomainError::business_rule(format!(
                "cannot escalate invoice in status {:?}",
                self.status
            )));
        }
        if self.status.can_transition_to(InvoiceStatus::InDefault) {
            self.status = InvoiceStatus::InDefault;
        }
        self.current_reminder_level = Some(ReminderLevel::Escalated);
        self.escalated_at = Some(at);
        self.priority = InvoicePriority::Critical;
        self.touch();
        Ok(())
    }

    pub fn dispute(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation("dispute reason must not be empty"));
        }
        self.transition_to(InvoiceStatus::Disputed)?;
        self.dispute_reason = Some(reason);
        Ok(())
    }

    /// Close a dispute; the invoice returns to overdue or pending depending on
    /// its due date.
    pub fn resolve_dispute(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != InvoiceStatus::Disputed {
            return Err(DomainError::business_rule("invoice is not disputed"));
        }
        let next = if self.is_past_due(now) {
            InvoiceStatus::Overdue
        } else {
            InvoiceStatus::Pending
        };
        self.transition_to(next)?;
        self.dispute_reason = None;
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.transition_to(InvoiceStatus::Cancelled)
    }

    /// Store the outcome of a prioritization run.
    pub fn assess(&mut self, risk_score: f64, priority: InvoicePriority) -> DomainResult<()> {
        if !(0.0..=1.0).contains(&risk_score) {
            return Err(DomainError::validation(format!(
                "risk score must be within [0, 1], got {risk_score}"
            )));
        }
        self.risk_score = Some(risk_score);
        self.priority = priority;
        self.touch();
        Ok(())
    }

    /// Verify the balance/status invariants.
    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.current_balance.compare(&self.original_amount)?.is_gt() {
            return Err(DomainError::business_rule(
                "current balance exceeds original amount",
            ));
        }
        let paid = self.status == InvoiceStatus::Paid;
        if paid != self.current_balance.is_zero() {
            return Err(DomainError::business_rule(
                "paid status and zero balance must coincide",
            ));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
