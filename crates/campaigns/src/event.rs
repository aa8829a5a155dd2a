use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arrears_alternatives::{AlternativePaymentOption, OptionId};
use arrears_core::Money;
use arrears_events::Event;
use arrears_invoicing::{Invoice, InvoiceId, InvoiceStatus, PaymentMethod, ReminderLevel};

use crate::campaign::{CampaignId, CampaignSettings};
use crate::reminder::{Engagement, PaymentReminder, ReminderId};

/// Event: CampaignStarted. Carries the invoice snapshot the campaign owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignStarted {
    pub campaign_id: CampaignId,
    pub invoice: Invoice,
    pub settings: CampaignSettings,
    pub next_reminder_date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReminderScheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderScheduled {
    pub campaign_id: CampaignId,
    pub reminder: PaymentReminder,
    /// Set when scheduling also moves the campaign's next reminder date.
    pub next_reminder_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReminderSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSent {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub invoice_id: InvoiceId,
    pub level: ReminderLevel,
    /// First successful send of this reminder (counts toward the invoice).
    pub first_send: bool,
    pub next_reminder_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReminderFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderFailed {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub reason: String,
    pub retry_count: u32,
    pub retries_exhausted: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReminderEngagementRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderEngagementRecorded {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub engagement: Engagement,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerResponded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerResponded {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub campaign_id: CampaignId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub remaining_balance: Money,
    pub invoice_status: InvoiceStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CampaignPaused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignPaused {
    pub campaign_id: CampaignId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CampaignResumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignResumed {
    pub campaign_id: CampaignId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CampaignCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCompleted {
    pub campaign_id: CampaignId,
    pub total_collected: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CampaignEscalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignEscalated {
    pub campaign_id: CampaignId,
    pub invoice_id: InvoiceId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CollectionsCaseRecorded.
///
/// Emitted once the collections system has a case for an escalated campaign,
/// and again when a later data transfer succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionsCaseRecorded {
    pub campaign_id: CampaignId,
    pub case_id: String,
    pub data_transferred: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CampaignCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCancelled {
    pub campaign_id: CampaignId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CollectionNoteAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNoteAdded {
    pub campaign_id: CampaignId,
    pub note: String,
    pub author: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AlternativeOptionOffered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeOptionOffered {
    pub campaign_id: CampaignId,
    pub option: AlternativePaymentOption,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AlternativeOptionResponded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeOptionResponded {
    pub campaign_id: CampaignId,
    pub option_id: OptionId,
    pub accepted: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AlternativeOptionsExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeOptionsExpired {
    pub campaign_id: CampaignId,
    pub option_ids: Vec<OptionId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CampaignEvent {
    CampaignStarted(CampaignStarted),
    ReminderScheduled(ReminderScheduled),
    ReminderSent(ReminderSent),
    ReminderFailed(ReminderFailed),
    ReminderEngagementRecorded(ReminderEngagementRecorded),
    CustomerResponded(CustomerResponded),
    PaymentRecorded(PaymentRecorded),
    CampaignPaused(CampaignPaused),
    CampaignResumed(CampaignResumed),
    CampaignCompleted(CampaignCompleted),
    CampaignEscalated(CampaignEscalated),
    CollectionsCaseRecorded(CollectionsCaseRecorded),
    CampaignCancelled(CampaignCancelled),
    CollectionNoteAdded(CollectionNoteAdded),
    AlternativeOptionOffered(AlternativeOptionOffered),
    AlternativeOptionResponded(AlternativeOptionResponded),
    AlternativeOptionsExpired(AlternativeOptionsExpired),
}

impl CampaignEvent {
    pub fn campaign_id(&self) -> CampaignId {
        match self {
            CampaignEvent::CampaignStarted(e) => e.campaign_id,
            CampaignEvent::ReminderScheduled(e) => e.campaign_id,
            CampaignEvent::ReminderSent(e) => e.campaign_id,
            CampaignEvent::ReminderFailed(e) => e.campaign_id,
            CampaignEvent::ReminderEngagementRecorded(e) => e.campaign_id,
            CampaignEvent::CustomerResponded(e) => e.campaign_id,
            CampaignEvent::PaymentRecorded(e) => e.campaign_id,
            CampaignEvent::CampaignPaused(e) => e.campaign_id,
            CampaignEvent::CampaignResumed(e) => e.campaign_id,
            CampaignEvent::CampaignCompleted(e) => e.campaign_id,
            CampaignEvent::CampaignEscalated(e) => e.campaign_id,
            CampaignEvent::CollectionsCaseRecorded(e) => e.campaign_id,
            CampaignEvent::CampaignCancelled(e) => e.campaign_id,
            CampaignEvent::CollectionNoteAdded(e) => e.campaign_id,
            CampaignEvent::AlternativeOptionOffered(e) => e.campaign_id,
            CampaignEvent::AlternativeOptionResponded(e) => e.campaign_id,
            CampaignEvent::AlternativeOptionsExpired(e) => e.campaign_id,
        }
    }
}

impl Event for CampaignEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CampaignEvent::CampaignStarted(_) => "collections.campaign.started",
            CampaignEvent::ReminderScheduled(_) => "collections.campaign.reminder_scheduled",
            CampaignEvent::ReminderSent(_) => "collections.campaign.reminder_sent",
            CampaignEvent::ReminderFailed(_) => "collections.campaign.reminder_failed",
            CampaignEvent::ReminderEngagementRecorded(_) => {
                "collections.campaign.reminder_engagement_recorded"
            }
            CampaignEvent::CustomerResponded(_) => "collections.campaign.customer_responded",
            CampaignEvent::PaymentRecorded(_) => "collections.campaign.payment_recorded",
            CampaignEvent::CampaignPaused(_) => "collections.campaign.paused",
            CampaignEvent::CampaignResumed(_) => "collections.campaign.resumed",
            CampaignEvent::CampaignCompleted(_) => "collections.campaign.completed",
            CampaignEvent::CampaignEscalated(_) => "collections.campaign.escalated",
            CampaignEvent::CollectionsCaseRecorded(_) => "collections.campaign.case_recorded",
            CampaignEvent::CampaignCancelled(_) => "collections.campaign.cancelled",
            CampaignEvent::CollectionNoteAdded(_) => "collections.campaign.note_added",
            CampaignEvent::AlternativeOptionOffered(_) => "collections.campaign.option_offered",
            CampaignEvent::AlternativeOptionResponded(_) => {
                "collections.campaign.option_responded"
            }
            CampaignEvent::AlternativeOptionsExpired(_) => "collections.campaign.options_expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CampaignEvent::CampaignStarted(e) => e.occurred_at,
            CampaignEvent::ReminderScheduled(e) => e.occurred_at,
            CampaignEvent::ReminderSent(e) => e.occurred_at,
            CampaignEvent::ReminderFailed(e) => e.occurred_at,
            CampaignEvent::ReminderEngagementRecorded(e) => e.occurred_at,
            CampaignEvent::CustomerResponded(e) => e.occurred_at,
            CampaignEvent::PaymentRecorded(e) => e.occurred_at,
            CampaignEvent::CampaignPaused(e) => e.occurred_at,
            CampaignEvent::CampaignResumed(e) => e.occurred_at,
            CampaignEvent::CampaignCompleted(e) => e.occurred_at,
            CampaignEvent::CampaignEscalated(e) => e.occurred_at,
            CampaignEvent::CollectionsCaseRecorded(e) => e.occurred_at,
            CampaignEvent::CampaignCancelled(e) => e.occurred_at,
            CampaignEvent::CollectionNoteAdded(e) => e.occurred_at,
            CampaignEvent::AlternativeOptionOffered(e) => e.occurred_at,
            CampaignEvent::AlternativeOptionResponded(e) => e.occurred_at,
            CampaignEvent::AlternativeOptionsExpired(e) => e.occurred_at,
        }
    }
}
