use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arrears_alternatives::{AlternativePaymentOption, OptionId};
use arrears_core::{AggregateId, Money};
use arrears_invoicing::{Invoice, PaymentMethod};

use crate::campaign::{CampaignId, CampaignSettings};
use crate::reminder::{Engagement, PaymentReminder, ReminderId};

/// Command: StartCampaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCampaign {
    pub campaign_id: CampaignId,
    pub invoice: Invoice,
    pub settings: CampaignSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ScheduleReminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleReminder {
    pub campaign_id: CampaignId,
    pub reminder: PaymentReminder,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendReminder (`occurred_at` is the send time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReminder {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReminderFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReminderFailed {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReminderEngagement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReminderEngagement {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub engagement: Engagement,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordCustomerResponse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCustomerResponse {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub campaign_id: CampaignId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EscalateCampaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalateCampaign {
    pub campaign_id: CampaignId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordCollectionsCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCollectionsCase {
    pub campaign_id: CampaignId,
    pub case_id: String,
    pub data_transferred: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PauseCampaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseCampaign {
    pub campaign_id: CampaignId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResumeCampaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCampaign {
    pub campaign_id: CampaignId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelCampaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCampaign {
    pub campaign_id: CampaignId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddCollectionNote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCollectionNote {
    pub campaign_id: CampaignId,
    pub note: String,
    pub author: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: OfferAlternativeOption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferAlternativeOption {
    pub campaign_id: CampaignId,
    pub option: AlternativePaymentOption,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RespondToAlternativeOption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondToAlternativeOption {
    pub campaign_id: CampaignId,
    pub option_id: OptionId,
    pub accepted: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireAlternativeOptions (`occurred_at` is the cut-off).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireAlternativeOptions {
    pub campaign_id: CampaignId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CampaignCommand {
    StartCampaign(StartCampaign),
    ScheduleReminder(ScheduleReminder),
    SendReminder(SendReminder),
    MarkReminderFailed(MarkReminderFailed),
    RecordReminderEngagement(RecordReminderEngagement),
    RecordCustomerResponse(RecordCustomerResponse),
    RecordPayment(RecordPayment),
    EscalateCampaign(EscalateCampaign),
    RecordCollectionsCase(RecordCollectionsCase),
    PauseCampaign(PauseCampaign),
    ResumeCampaign(ResumeCampaign),
    CancelCampaign(CancelCampaign),
    AddCollectionNote(AddCollectionNote),
    OfferAlternativeOption(OfferAlternativeOption),
    RespondToAlternativeOption(RespondToAlternativeOption),
    ExpireAlternativeOptions(ExpireAlternativeOptions),
}

impl CampaignCommand {
    pub fn campaign_id(&self) -> CampaignId {
        match self {
            CampaignCommand::StartCampaign(c) => c.campaign_id,
            CampaignCommand::ScheduleReminder(c) => c.campaign_id,
            CampaignCommand::SendReminder(c) => c.campaign_id,
            CampaignCommand::MarkReminderFailed(c) => c.campaign_id,
            CampaignCommand::RecordReminderEngagement(c) => c.campaign_id,
            CampaignCommand::RecordCustomerResponse(c) => c.campaign_id,
            CampaignCommand::RecordPayment(c) => c.campaign_id,
            CampaignCommand::EscalateCampaign(c) => c.campaign_id,
            CampaignCommand::RecordCollectionsCase(c) => c.campaign_id,
            CampaignCommand::PauseCampaign(c) => c.campaign_id,
            CampaignCommand::ResumeCampaign(c) => c.campaign_id,
            CampaignCommand::CancelCampaign(c) => c.campaign_id,
            CampaignCommand::AddCollectionNote(c) => c.campaign_id,
            CampaignCommand::OfferAlternativeOption(c) => c.campaign_id,
            CampaignCommand::RespondToAlternativeOption(c) => c.campaign_id,
            CampaignCommand::ExpireAlternativeOptions(c) => c.campaign_id,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            CampaignCommand::StartCampaign(_) => "start_campaign",
            CampaignCommand::ScheduleReminder(_) => "schedule_reminder",
            CampaignCommand::SendReminder(_) => "send_reminder",
            CampaignCommand::MarkReminderFailed(_) => "mark_reminder_failed",
            CampaignCommand::RecordReminderEngagement(_) => "record_reminder_engagement",
            CampaignCommand::RecordCustomerResponse(_) => "record_customer_response",
            CampaignCommand::RecordPayment(_) => "record_payment",
            CampaignCommand::EscalateCampaign(_) => "escalate_campaign",
            CampaignCommand::RecordCollectionsCase(_) => "record_collections_case",
            CampaignCommand::PauseCampaign(_) => "pause_campaign",
            CampaignCommand::ResumeCampaign(_) => "resume_campaign",
            CampaignCommand::CancelCampaign(_) => "cancel_campaign",
            CampaignCommand::AddCollectionNote(_) => "add_collection_note",
            CampaignCommand::OfferAlternativeOption(_) => "offer_alternative_option",
            CampaignCommand::RespondToAlternativeOption(_) => "respond_to_alternative_option",
            CampaignCommand::ExpireAlternativeOptions(_) => "expire_alternative_options",
        }
    }
}

impl arrears_events::Command for CampaignCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.campaign_id().as_aggregate_id()
    }
}
