use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arrears_core::{DomainError, DomainResult};
use arrears_customers::CustomerId;
use arrears_invoicing::{InvoiceId, ReminderLevel};

arrears_core::uuid_id!(
    /// Payment reminder identifier. Delivery is idempotent by this id.
    ReminderId,
    "ReminderId"
);

/// Default delivery attempts per reminder before the campaign moves on.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    Scheduled,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Replied,
    Failed,
    Bounced,
}

impl ReminderStatus {
    pub fn allowed_transitions(self) -> &'static [ReminderStatus] {
        use ReminderStatus::*;
        match self {
            Scheduled => &[Sent, Failed],
            Sent => &[Delivered, Opened, Clicked, Replied, Failed, Bounced],
            Delivered => &[Opened, Clicked, Replied],
            Opened => &[Clicked, Replied],
            Clicked => &[Replied],
            // Retry, or another failed attempt.
            Failed => &[Sent, Failed],
            Replied | Bounced => &[],
        }
    }

    pub fn can_transition_to(self, next: ReminderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// The customer saw the reminder.
    pub fn is_engaged(self) -> bool {
        matches!(
            self,
            ReminderStatus::Opened | ReminderStatus::Clicked | ReminderStatus::Replied
        )
    }
}

/// Delivery and engagement signals reported by the reminder channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engagement {
    Delivered,
    Opened,
    Clicked,
    Bounced,
}

impl Engagement {
    fn status(self) -> ReminderStatus {
        match self {
            Engagement::Delivered => ReminderStatus::Delivered,
            Engagement::Opened => ReminderStatus::Opened,
            Engagement::Clicked => ReminderStatus::Clicked,
            Engagement::Bounced => ReminderStatus::Bounced,
        }
    }
}

/// Wording register of a reminder email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderTone {
    Friendly,
    Firm,
    Urgent,
    Final,
}

impl ReminderTone {
    pub fn for_level(level: ReminderLevel) -> Self {
        match level {
            ReminderLevel::First => ReminderTone::Friendly,
            ReminderLevel::Second => ReminderTone::Firm,
            ReminderLevel::Third => ReminderTone::Urgent,
            ReminderLevel::Escalated => ReminderTone::Final,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReminder {
    id: ReminderId,
    invoice_id: InvoiceId,
    customer_id: CustomerId,
    level: ReminderLevel,
    tone: ReminderTone,
    status: ReminderStatus,
    scheduled_for: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    replied_at: Option<DateTime<Utc>>,
    retry_count: u32,
    max_retries: u32,
    last_failure: Option<String>,
}

impl PaymentReminder {
    pub fn new(
        id: ReminderId,
        invoice_id: InvoiceId,
        customer_id: CustomerId,
        level: ReminderLevel,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            invoice_id,
            customer_id,
            level,
            tone: ReminderTone::for_level(level),
            status: ReminderStatus::Scheduled,
            scheduled_for,
            sent_at: None,
            opened_at: None,
            replied_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            last_failure: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn id(&self) -> ReminderId {
        self.id
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn level(&self) -> ReminderLevel {
        self.level
    }

    pub fn tone(&self) -> ReminderTone {
        self.tone
    }

    pub fn status(&self) -> ReminderStatus {
        self.status
    }

    pub fn scheduled_for(&self) -> DateTime<Utc> {
        self.scheduled_for
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn replied_at(&self) -> Option<DateTime<Utc>> {
        self.replied_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Scheduled, or failed with attempts left.
    pub fn is_sendable(&self) -> bool {
        match self.status {
            ReminderStatus::Scheduled => true,
            ReminderStatus::Failed => !self.retries_exhausted(),
            _ => false,
        }
    }

    pub fn was_opened(&self) -> bool {
        self.opened_at.is_some() || self.status.is_engaged()
    }

    pub(crate) fn mark_sent(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_sendable() {
            return Err(DomainError::business_rule(format!(
                "reminder {} cannot be sent in status {:?} (retries {}/{})",
                self.id, self.status, self.retry_count, self.max_retries
            )));
        }
        self.status = ReminderStatus::Sent;
        self.sent_at = Some(at);
        Ok(())
    }

    /// Record a failed delivery attempt; returns whether retries are exhausted.
    pub(crate) fn mark_failed(&mut self, reason: &str) -> DomainResult<bool> {
        self.ensure_transition(ReminderStatus::Failed)?;
        self.status = ReminderStatus::Failed;
        self.retry_count += 1;
        self.last_failure = Some(reason.to_string());
        Ok(self.retries_exhausted())
    }

    pub(crate) fn record_engagement(
        &mut self,
        engagement: Engagement,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let next = engagement.status();
        self.ensure_transition(next)?;
        self.status = next;
        if next.is_engaged() && self.opened_at.is_none() {
            self.opened_at = Some(at);
        }
        Ok(())
    }

    pub(crate) fn mark_replied(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_transition(ReminderStatus::Replied)?;
        self.status = ReminderStatus::Replied;
        self.replied_at = Some(at);
        if self.opened_at.is_none() {
            self.opened_at = Some(at);
        }
        Ok(())
    }

    fn ensure_transition(&self, next: ReminderStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::business_rule(format!(
                "reminder status transition {:?} -> {next:?} is not allowed",
                self.status
            )));
        }
        Ok(())
    }
}
