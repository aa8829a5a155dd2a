use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use arrears_alternatives::{AlternativePaymentOption, OptionId};
use arrears_core::{Aggregate, AggregateRoot, Currency, DomainError, DomainResult, Money};
use arrears_customers::CustomerId;
use arrears_invoicing::{Invoice, InvoiceId, InvoiceStatus, ReminderLevel};

use crate::command::*;
use crate::event::*;
use crate::reminder::{DEFAULT_MAX_RETRIES, PaymentReminder, ReminderId, ReminderTone};

arrears_core::uuid_id!(
    /// Payment campaign identifier.
    CampaignId,
    "CampaignId"
);

const ALL_ATTEMPTS_FAILED: &str = "all reminder attempts failed";
const CUSTOMER_CONTACT: &str = "customer responded to reminder";

/// Campaign lifecycle. `Escalated`, `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Active,
    Paused,
    Escalated,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    pub fn allowed_transitions(self) -> &'static [CampaignStatus] {
        use CampaignStatus::*;
        match self {
            Active => &[Paused, Escalated, Completed, Cancelled],
            Paused => &[Active],
            Escalated | Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn ensure_transition(self, next: CampaignStatus) -> DomainResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::business_rule(format!(
                "campaign status transition {self:?} -> {next:?} is not allowed"
            )))
        }
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Per-campaign knobs, copied from configuration when the campaign starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    pub days_between_reminders: u32,
    pub auto_escalation_days: u32,
    pub max_retries: u32,
    pub pause_on_customer_contact: bool,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            days_between_reminders: 7,
            auto_escalation_days: 21,
            max_retries: DEFAULT_MAX_RETRIES,
            pause_on_customer_contact: true,
        }
    }
}

impl CampaignSettings {
    pub fn validate(&self) -> DomainResult<()> {
        if self.days_between_reminders == 0 {
            return Err(DomainError::validation(
                "days_between_reminders must be at least 1",
            ));
        }
        if self.max_retries == 0 {
            return Err(DomainError::validation("max_retries must be at least 1"));
        }
        Ok(())
    }

    fn reminder_interval(&self) -> Duration {
        Duration::days(i64::from(self.days_between_reminders))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNote {
    pub note: String,
    pub author: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Aggregate root: PaymentCampaign.
///
/// Owns the invoice it collects on; reminders and payments mutate that
/// invoice only through campaign events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCampaign {
    id: CampaignId,
    invoice: Option<Invoice>,
    status: CampaignStatus,
    settings: CampaignSettings,
    reminders: Vec<PaymentReminder>,
    alternative_options: Vec<AlternativePaymentOption>,
    escalation_triggered: bool,
    escalated_at: Option<DateTime<Utc>>,
    escalation_reason: Option<String>,
    collections_case_id: Option<String>,
    case_data_transferred: bool,
    pause_reason: Option<String>,
    cancellation_reason: Option<String>,
    next_reminder_date: Option<DateTime<Utc>>,
    contact_attempts: u32,
    total_collected: Money,
    collection_notes: Vec<CollectionNote>,
    started_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    version: u64,
}

impl PaymentCampaign {
    /// Create an empty, not-yet-started aggregate instance for rehydration.
    pub fn empty(id: CampaignId) -> Self {
        Self {
            id,
            invoice: None,
            status: CampaignStatus::Active,
            settings: CampaignSettings::default(),
            reminders: Vec::new(),
            alternative_options: Vec::new(),
            escalation_triggered: false,
            escalated_at: None,
            escalation_reason: None,
            collections_case_id: None,
            case_data_transferred: false,
            pause_reason: None,
            cancellation_reason: None,
            next_reminder_date: None,
            contact_attempts: 0,
            total_collected: Money::zero(Currency::usd()),
            collection_notes: Vec::new(),
            started_at: None,
            closed_at: None,
            version: 0,
        }
    }

    pub fn campaign_id(&self) -> CampaignId {
        self.id
    }

    pub fn is_started(&self) -> bool {
        self.invoice.is_some()
    }

    pub fn invoice(&self) -> Option<&Invoice> {
        self.invoice.as_ref()
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice.as_ref().map(Invoice::invoice_id)
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.invoice.as_ref().map(Invoice::customer_id)
    }

    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    pub fn settings(&self) -> &CampaignSettings {
        &self.settings
    }

    pub fn reminders(&self) -> &[PaymentReminder] {
        &self.reminders
    }

    pub fn reminder(&self, id: ReminderId) -> Option<&PaymentReminder> {
        self.reminders.iter().find(|r| r.id() == id)
    }

    pub fn alternative_options(&self) -> &[AlternativePaymentOption] {
        &self.alternative_options
    }

    pub fn escalation_triggered(&self) -> bool {
        self.escalation_triggered
    }

    pub fn escalated_at(&self) -> Option<DateTime<Utc>> {
        self.escalated_at
    }

    pub fn escalation_reason(&self) -> Option<&str> {
        self.escalation_reason.as_deref()
    }

    pub fn collections_case_id(&self) -> Option<&str> {
        self.collections_case_id.as_deref()
    }

    pub fn case_data_transferred(&self) -> bool {
        self.case_data_transferred
    }

    /// Escalated, but collections has no case or no data for it yet.
    pub fn awaits_collections_case(&self) -> bool {
        self.status == CampaignStatus::Escalated
            && (self.collections_case_id.is_none() || !self.case_data_transferred)
    }

    pub fn pause_reason(&self) -> Option<&str> {
        self.pause_reason.as_deref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn next_reminder_date(&self) -> Option<DateTime<Utc>> {
        self.next_reminder_date
    }

    pub fn contact_attempts(&self) -> u32 {
        self.contact_attempts
    }

    pub fn total_collected(&self) -> Money {
        self.total_collected
    }

    pub fn collection_notes(&self) -> &[CollectionNote] {
        &self.collection_notes
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Highest reminder level actually sent for the invoice.
    pub fn current_reminder_level(&self) -> Option<ReminderLevel> {
        self.invoice
            .as_ref()
            .and_then(Invoice::current_reminder_level)
    }

    /// Level of the next reminder to schedule; `None` once `Escalated` exists.
    pub fn next_reminder_level(&self) -> Option<ReminderLevel> {
        match self.reminders.last() {
            None => Some(ReminderLevel::First),
            Some(last) => last.level().next(),
        }
    }

    /// The latest reminder when it still waits for a (re)send.
    pub fn pending_reminder(&self) -> Option<&PaymentReminder> {
        self.reminders.last().filter(|r| r.is_sendable())
    }

    pub fn last_sent_reminder(&self) -> Option<&PaymentReminder> {
        self.reminders.iter().rev().find(|r| r.sent_at().is_some())
    }

    pub fn reminders_sent(&self) -> u32 {
        self.reminders
            .iter()
            .filter(|r| r.sent_at().is_some())
            .count() as u32
    }

    pub fn reminders_opened(&self) -> u32 {
        self.reminders.iter().filter(|r| r.was_opened()).count() as u32
    }

    pub fn days_active(&self, now: DateTime<Utc>) -> i64 {
        self.started_at
            .map(|started| now.signed_duration_since(started).num_days().max(0))
            .unwrap_or(0)
    }

    pub fn is_ready_for_next_reminder(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active
            && self.next_reminder_date.is_some_and(|due| now >= due)
    }

    pub fn should_auto_escalate(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active
            && !self.escalation_triggered
            && self.days_active(now) >= i64::from(self.settings.auto_escalation_days)
            && self.current_reminder_level() == Some(ReminderLevel::Third)
    }

    /// Tone for the reminder that goes out next.
    pub fn reminder_tone(&self) -> ReminderTone {
        let level = self
            .pending_reminder()
            .map(PaymentReminder::level)
            .or_else(|| self.next_reminder_level())
            .unwrap_or(ReminderLevel::Escalated);
        ReminderTone::for_level(level)
    }
}

impl AggregateRoot for PaymentCampaign {
    type Id = CampaignId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for PaymentCampaign {
    type Command = CampaignCommand;
    type Event = CampaignEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CampaignEvent::CampaignStarted(e) => {
                self.id = e.campaign_id;
                self.total_collected = Money::zero(e.invoice.currency());
                self.invoice = Some(e.invoice.clone());
                self.settings = e.settings;
                self.status = CampaignStatus::Active;
                self.next_reminder_date = Some(e.next_reminder_date);
                self.started_at = Some(e.occurred_at);
            }
            CampaignEvent::ReminderScheduled(e) => {
                self.reminders.push(e.reminder.clone());
                if let Some(next) = e.next_reminder_date {
                    self.next_reminder_date = Some(next);
                }
            }
            CampaignEvent::ReminderSent(e) => {
                if let Some(reminder) = self.reminder_mut(e.reminder_id) {
                    replay(reminder.mark_sent(e.occurred_at));
                }
                if e.first_send {
                    if let Some(invoice) = self.invoice.as_mut() {
                        replay(invoice.record_reminder_sent(e.level, e.occurred_at));
                    }
                }
                self.contact_attempts += 1;
                self.next_reminder_date = e.next_reminder_date;
            }
            CampaignEvent::ReminderFailed(e) => {
                if let Some(reminder) = self.reminder_mut(e.reminder_id) {
                    replay(reminder.mark_failed(&e.reason));
                }
            }
            CampaignEvent::ReminderEngagementRecorded(e) => {
                if let Some(reminder) = self.reminder_mut(e.reminder_id) {
                    replay(reminder.record_engagement(e.engagement, e.occurred_at));
                }
            }
            CampaignEvent::CustomerResponded(e) => {
                if let Some(reminder) = self.reminder_mut(e.reminder_id) {
                    replay(reminder.mark_replied(e.occurred_at));
                }
            }
            CampaignEvent::PaymentRecorded(e) => {
                if let Some(invoice) = self.invoice.as_mut() {
                    replay(invoice.record_payment(
                        e.amount,
                        e.method,
                        e.reference.clone(),
                        e.occurred_at,
                    ));
                }
                if let Ok(total) = self.total_collected.checked_add(&e.amount) {
                    self.total_collected = total;
                }
            }
            CampaignEvent::CampaignPaused(e) => {
                self.status = CampaignStatus::Paused;
                self.pause_reason = Some(e.reason.clone());
            }
            CampaignEvent::CampaignResumed(_) => {
                self.status = CampaignStatus::Active;
                self.pause_reason = None;
            }
            CampaignEvent::CampaignCompleted(e) => {
                self.status = CampaignStatus::Completed;
                self.next_reminder_date = None;
                self.closed_at = Some(e.occurred_at);
            }
            CampaignEvent::CampaignEscalated(e) => {
                if let Some(invoice) = self.invoice.as_mut() {
                    replay(invoice.escalate(e.occurred_at));
                }
                self.status = CampaignStatus::Escalated;
                self.escalation_triggered = true;
                self.escalated_at = Some(e.occurred_at);
                self.escalation_reason = Some(e.reason.clone());
                self.next_reminder_date = None;
                self.closed_at = Some(e.occurred_at);
            }
            CampaignEvent::CollectionsCaseRecorded(e) => {
                self.collections_case_id = Some(e.case_id.clone());
                self.case_data_transferred = e.data_transferred;
            }
            CampaignEvent::CampaignCancelled(e) => {
                self.status = CampaignStatus::Cancelled;
                self.cancellation_reason = Some(e.reason.clone());
                self.next_reminder_date = None;
                self.closed_at = Some(e.occurred_at);
            }
            CampaignEvent::CollectionNoteAdded(e) => {
                self.collection_notes.push(CollectionNote {
                    note: e.note.clone(),
                    author: e.author.clone(),
                    added_at: e.occurred_at,
                });
            }
            CampaignEvent::AlternativeOptionOffered(e) => {
                self.alternative_options.push(e.option.clone());
            }
            CampaignEvent::AlternativeOptionResponded(e) => {
                if let Some(option) = self.option_mut(e.option_id) {
                    if e.accepted {
                        replay(option.accept(e.occurred_at));
                    } else {
                        replay(option.decline(e.occurred_at));
                    }
                }
            }
            CampaignEvent::AlternativeOptionsExpired(e) => {
                for id in &e.option_ids {
                    if let Some(option) = self.option_mut(*id) {
                        option.expire_if_due(e.occurred_at);
                    }
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.ensure_campaign_id(command.campaign_id())?;
        match command {
            CampaignCommand::StartCampaign(cmd) => self.handle_start(cmd),
            CampaignCommand::ScheduleReminder(cmd) => self.handle_schedule_reminder(cmd),
            CampaignCommand::SendReminder(cmd) => self.handle_send_reminder(cmd),
            CampaignCommand::MarkReminderFailed(cmd) => self.handle_mark_failed(cmd),
            CampaignCommand::RecordReminderEngagement(cmd) => self.handle_engagement(cmd),
            CampaignCommand::RecordCustomerResponse(cmd) => self.handle_customer_response(cmd),
            CampaignCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            CampaignCommand::EscalateCampaign(cmd) => self.handle_escalate(cmd),
            CampaignCommand::RecordCollectionsCase(cmd) => self.handle_record_case(cmd),
            CampaignCommand::PauseCampaign(cmd) => self.handle_pause(cmd),
            CampaignCommand::ResumeCampaign(cmd) => self.handle_resume(cmd),
            CampaignCommand::CancelCampaign(cmd) => self.handle_cancel(cmd),
            CampaignCommand::AddCollectionNote(cmd) => self.handle_add_note(cmd),
            CampaignCommand::OfferAlternativeOption(cmd) => self.handle_offer_option(cmd),
            CampaignCommand::RespondToAlternativeOption(cmd) => self.handle_respond_option(cmd),
            CampaignCommand::ExpireAlternativeOptions(cmd) => self.handle_expire_options(cmd),
        }
    }
}

/// Events were validated in `handle` before they were emitted, so replaying
/// them onto state does not fail.
fn replay<T>(result: DomainResult<T>) {
    debug_assert!(
        result.is_ok(),
        "replaying a validated campaign event failed: {:?}",
        result.err()
    );
}

impl PaymentCampaign {
    fn reminder_mut(&mut self, id: ReminderId) -> Option<&mut PaymentReminder> {
        self.reminders.iter_mut().find(|r| r.id() == id)
    }

    fn option_mut(&mut self, id: OptionId) -> Option<&mut AlternativePaymentOption> {
        self.alternative_options.iter_mut().find(|o| o.id == id)
    }

    fn ensure_campaign_id(&self, campaign_id: CampaignId) -> DomainResult<()> {
        if self.id != campaign_id {
            return Err(DomainError::validation("campaign_id mismatch"));
        }
        Ok(())
    }

    /// The owned invoice of a started, non-terminal campaign.
    fn mutable_invoice(&self) -> DomainResult<&Invoice> {
        let invoice = self
            .invoice
            .as_ref()
            .ok_or_else(|| DomainError::not_found(format!("campaign {}", self.id)))?;
        if self.status.is_terminal() {
            return Err(DomainError::business_rule(format!(
                "campaign {} is {:?} and can no longer change",
                self.id, self.status
            )));
        }
        Ok(invoice)
    }

    fn find_reminder(&self, id: ReminderId) -> DomainResult<&PaymentReminder> {
        self.reminder(id)
            .ok_or_else(|| DomainError::not_found(format!("reminder {id}")))
    }

    /// A paused campaign passes through `Active` before leaving for a
    /// terminal status.
    fn resume_if_paused(&self, at: DateTime<Utc>) -> Vec<CampaignEvent> {
        if self.status == CampaignStatus::Paused {
            vec![CampaignEvent::CampaignResumed(CampaignResumed {
                campaign_id: self.id,
                occurred_at: at,
            })]
        } else {
            Vec::new()
        }
    }

    fn escalation_events(
        &self,
        invoice: &Invoice,
        reason: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<Vec<CampaignEvent>> {
        let mut escalated = invoice.clone();
        escalated.escalate(at)?;

        let mut events = self.resume_if_paused(at);
        events.push(CampaignEvent::CampaignEscalated(CampaignEscalated {
            campaign_id: self.id,
            invoice_id: invoice.invoice_id(),
            reason: reason.to_string(),
            occurred_at: at,
        }));
        Ok(events)
    }

    fn handle_start(&self, cmd: &StartCampaign) -> DomainResult<Vec<CampaignEvent>> {
        if self.is_started() {
            return Err(DomainError::conflict("campaign already exists"));
        }
        cmd.settings.validate()?;

        let invoice = &cmd.invoice;
        let overdue = match invoice.status() {
            InvoiceStatus::Overdue => true,
            InvoiceStatus::PartiallyPaid => invoice.is_past_due(cmd.occurred_at),
            _ => false,
        };
        if !overdue {
            return Err(DomainError::business_rule(format!(
                "invoice {} is {:?}; campaigns start on overdue invoices only",
                invoice.invoice_number(),
                invoice.status()
            )));
        }
        if !invoice.current_balance().is_positive() {
            return Err(DomainError::business_rule(format!(
                "invoice {} has no open balance",
                invoice.invoice_number()
            )));
        }

        Ok(vec![CampaignEvent::CampaignStarted(CampaignStarted {
            campaign_id: cmd.campaign_id,
            invoice: invoice.clone(),
            settings: cmd.settings,
            next_reminder_date: cmd.occurred_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_schedule_reminder(
        &self,
        cmd: &ScheduleReminder,
    ) -> DomainResult<Vec<CampaignEvent>> {
        let invoice = self.mutable_invoice()?;
        if self.status != CampaignStatus::Active {
            return Err(DomainError::validation(format!(
                "cannot schedule reminders while campaign is {:?}",
                self.status
            )));
        }

        let reminder = &cmd.reminder;
        if reminder.invoice_id() != invoice.invoice_id() {
            return Err(DomainError::validation("reminder invoice_id mismatch"));
        }
        if reminder.customer_id() != invoice.customer_id() {
            return Err(DomainError::validation("reminder customer_id mismatch"));
        }
        if reminder.status() != crate::reminder::ReminderStatus::Scheduled {
            return Err(DomainError::validation("only new reminders can be scheduled"));
        }
        if self.reminder(reminder.id()).is_some() {
            return Err(DomainError::validation(format!(
                "reminder {} is already part of this campaign",
                reminder.id()
            )));
        }
        let previous = self.reminders.last().map(PaymentReminder::level);
        if !reminder.level().follows(previous) {
            return Err(DomainError::validation(format!(
                "reminder level {:?} cannot follow {:?}",
                reminder.level(),
                previous
            )));
        }

        Ok(vec![CampaignEvent::ReminderScheduled(ReminderScheduled {
            campaign_id: self.id,
            reminder: reminder.clone().with_max_retries(self.settings.max_retries),
            next_reminder_date: None,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send_reminder(&self, cmd: &SendReminder) -> DomainResult<Vec<CampaignEvent>> {
        let invoice = self.mutable_invoice()?;
        if self.status != CampaignStatus::Active {
            return Err(DomainError::business_rule(format!(
                "cannot send reminders while campaign is {:?}",
                self.status
            )));
        }

        let mut reminder = self.find_reminder(cmd.reminder_id)?.clone();
        let first_send = reminder.sent_at().is_none();
        reminder.mark_sent(cmd.occurred_at)?;
        if first_send {
            invoice
                .clone()
                .record_reminder_sent(reminder.level(), cmd.occurred_at)?;
        }

        let next_reminder_date = match reminder.level() {
            ReminderLevel::Escalated => None,
            _ => Some(cmd.occurred_at + self.settings.reminder_interval()),
        };

        Ok(vec![CampaignEvent::ReminderSent(ReminderSent {
            campaign_id: self.id,
            reminder_id: reminder.id(),
            invoice_id: invoice.invoice_id(),
            level: reminder.level(),
            first_send,
            next_reminder_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_failed(&self, cmd: &MarkReminderFailed) -> DomainResult<Vec<CampaignEvent>> {
        let invoice = self.mutable_invoice()?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("failure reason must not be empty"));
        }

        let mut reminder = self.find_reminder(cmd.reminder_id)?.clone();
        let exhausted = reminder.mark_failed(&cmd.reason)?;

        let mut events = vec![CampaignEvent::ReminderFailed(ReminderFailed {
            campaign_id: self.id,
            reminder_id: reminder.id(),
            reason: cmd.reason.clone(),
            retry_count: reminder.retry_count(),
            retries_exhausted: exhausted,
            occurred_at: cmd.occurred_at,
        })];

        let is_latest = self.reminders.last().map(PaymentReminder::id) == Some(reminder.id());
        if !exhausted || !is_latest {
            return Ok(events);
        }

        match reminder.level() {
            // Scheduling needs an active campaign; a paused one picks up the
            // next level from delivery once it resumes.
            ReminderLevel::First | ReminderLevel::Second
                if self.status != CampaignStatus::Active => {}
            ReminderLevel::First | ReminderLevel::Second => {
                let next_date = cmd.occurred_at + self.settings.reminder_interval();
                if let Some(next_level) = reminder.level().next() {
                    let next = PaymentReminder::new(
                        ReminderId::new(),
                        invoice.invoice_id(),
                        invoice.customer_id(),
                        next_level,
                        next_date,
                    )
                    .with_max_retries(self.settings.max_retries);
                    events.push(CampaignEvent::ReminderScheduled(ReminderScheduled {
                        campaign_id: self.id,
                        reminder: next,
                        next_reminder_date: Some(next_date),
                        occurred_at: cmd.occurred_at,
                    }));
                }
            }
            ReminderLevel::Third | ReminderLevel::Escalated => {
                if !self.escalation_triggered {
                    events.extend(self.escalation_events(
                        invoice,
                        ALL_ATTEMPTS_FAILED,
                        cmd.occurred_at,
                    )?);
                }
            }
        }
        Ok(events)
    }

    fn handle_engagement(
        &self,
        cmd: &RecordReminderEngagement,
    ) -> DomainResult<Vec<CampaignEvent>> {
        self.mutable_invoice()?;
        let mut reminder = self.find_reminder(cmd.reminder_id)?.clone();
        reminder.record_engagement(cmd.engagement, cmd.occurred_at)?;

        Ok(vec![CampaignEvent::ReminderEngagementRecorded(
            ReminderEngagementRecorded {
                campaign_id: self.id,
                reminder_id: cmd.reminder_id,
                engagement: cmd.engagement,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_customer_response(
        &self,
        cmd: &RecordCustomerResponse,
    ) -> DomainResult<Vec<CampaignEvent>> {
        self.mutable_invoice()?;
        let mut reminder = self.find_reminder(cmd.reminder_id)?.clone();
        reminder.mark_replied(cmd.occurred_at)?;

        let mut events = vec![CampaignEvent::CustomerResponded(CustomerResponded {
            campaign_id: self.id,
            reminder_id: cmd.reminder_id,
            occurred_at: cmd.occurred_at,
        })];
        if self.settings.pause_on_customer_contact && self.status == CampaignStatus::Active {
            events.push(CampaignEvent::CampaignPaused(CampaignPaused {
                campaign_id: self.id,
                reason: CUSTOMER_CONTACT.to_string(),
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> DomainResult<Vec<CampaignEvent>> {
        let invoice = self.mutable_invoice()?;
        let mut paid = invoice.clone();
        let invoice_status =
            paid.record_payment(cmd.amount, cmd.method, cmd.reference.clone(), cmd.occurred_at)?;

        let mut events = vec![CampaignEvent::PaymentRecorded(PaymentRecorded {
            campaign_id: self.id,
            invoice_id: invoice.invoice_id(),
            amount: cmd.amount,
            method: cmd.method,
            reference: cmd.reference.clone(),
            remaining_balance: paid.current_balance(),
            invoice_status,
            occurred_at: cmd.occurred_at,
        })];

        events.extend(self.resume_if_paused(cmd.occurred_at));
        if invoice_status == InvoiceStatus::Paid {
            events.push(CampaignEvent::CampaignCompleted(CampaignCompleted {
                campaign_id: self.id,
                total_collected: self.total_collected.checked_add(&cmd.amount)?,
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_escalate(&self, cmd: &EscalateCampaign) -> DomainResult<Vec<CampaignEvent>> {
        if self.escalation_triggered || self.status == CampaignStatus::Escalated {
            return Err(DomainError::business_rule(format!(
                "campaign {} is already escalated",
                self.id
            )));
        }
        let invoice = self.mutable_invoice()?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("escalation reason must not be empty"));
        }
        self.escalation_events(invoice, &cmd.reason, cmd.occurred_at)
    }

    /// The one write an escalated campaign still accepts.
    fn handle_record_case(&self, cmd: &RecordCollectionsCase) -> DomainResult<Vec<CampaignEvent>> {
        if self.status != CampaignStatus::Escalated {
            return Err(DomainError::business_rule(format!(
                "campaign {} is {:?}; only escalated campaigns have a collections case",
                self.id, self.status
            )));
        }
        if cmd.case_id.trim().is_empty() {
            return Err(DomainError::validation("case id must not be empty"));
        }
        match self.collections_case_id.as_deref() {
            Some(existing) if existing != cmd.case_id => {
                return Err(DomainError::conflict(format!(
                    "campaign {} already has collections case {existing}",
                    self.id
                )));
            }
            Some(_) if self.case_data_transferred || !cmd.data_transferred => {
                return Err(DomainError::business_rule(format!(
                    "collections case {} is already recorded",
                    cmd.case_id
                )));
            }
            _ => {}
        }
        Ok(vec![CampaignEvent::CollectionsCaseRecorded(
            CollectionsCaseRecorded {
                campaign_id: self.id,
                case_id: cmd.case_id.clone(),
                data_transferred: cmd.data_transferred,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_pause(&self, cmd: &PauseCampaign) -> DomainResult<Vec<CampaignEvent>> {
        self.mutable_invoice()?;
        self.status.ensure_transition(CampaignStatus::Paused)?;
        Ok(vec![CampaignEvent::CampaignPaused(CampaignPaused {
            campaign_id: self.id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resume(&self, cmd: &ResumeCampaign) -> DomainResult<Vec<CampaignEvent>> {
        self.mutable_invoice()?;
        if self.status != CampaignStatus::Paused {
            return Err(DomainError::business_rule(format!(
                "campaign {} is not paused",
                self.id
            )));
        }
        Ok(vec![CampaignEvent::CampaignResumed(CampaignResumed {
            campaign_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelCampaign) -> DomainResult<Vec<CampaignEvent>> {
        self.mutable_invoice()?;
        let mut events = self.resume_if_paused(cmd.occurred_at);
        events.push(CampaignEvent::CampaignCancelled(CampaignCancelled {
            campaign_id: self.id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_add_note(&self, cmd: &AddCollectionNote) -> DomainResult<Vec<CampaignEvent>> {
        self.mutable_invoice()?;
        if cmd.note.trim().is_empty() {
            return Err(DomainError::validation("collection note must not be empty"));
        }
        Ok(vec![CampaignEvent::CollectionNoteAdded(CollectionNoteAdded {
            campaign_id: self.id,
            note: cmd.note.clone(),
            author: cmd.author.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_offer_option(
        &self,
        cmd: &OfferAlternativeOption,
    ) -> DomainResult<Vec<CampaignEvent>> {
        let invoice = self.mutable_invoice()?;
        let option = &cmd.option;
        if option.invoice_id != invoice.invoice_id() {
            return Err(DomainError::validation("option invoice_id mismatch"));
        }
        if !option.is_pending() || option.is_past_validity(cmd.occurred_at) {
            return Err(DomainError::validation(
                "only pending, unexpired options can be offered",
            ));
        }
        if self.alternative_options.iter().any(|o| o.id == option.id) {
            return Err(DomainError::validation(format!(
                "option {} was already offered",
                option.id
            )));
        }
        Ok(vec![CampaignEvent::AlternativeOptionOffered(
            AlternativeOptionOffered {
                campaign_id: self.id,
                option: option.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_respond_option(
        &self,
        cmd: &RespondToAlternativeOption,
    ) -> DomainResult<Vec<CampaignEvent>> {
        self.mutable_invoice()?;
        let mut option = self
            .alternative_options
            .iter()
            .find(|o| o.id == cmd.option_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("option {}", cmd.option_id)))?;
        if cmd.accepted {
            option.accept(cmd.occurred_at)?;
        } else {
            option.decline(cmd.occurred_at)?;
        }
        Ok(vec![CampaignEvent::AlternativeOptionResponded(
            AlternativeOptionResponded {
                campaign_id: self.id,
                option_id: cmd.option_id,
                accepted: cmd.accepted,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_expire_options(
        &self,
        cmd: &ExpireAlternativeOptions,
    ) -> DomainResult<Vec<CampaignEvent>> {
        self.mutable_invoice()?;
        let option_ids: Vec<OptionId> = self
            .alternative_options
            .iter()
            .filter(|o| o.is_pending() && o.is_past_validity(cmd.occurred_at))
            .map(|o| o.id)
            .collect();
        if option_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![CampaignEvent::AlternativeOptionsExpired(
            AlternativeOptionsExpired {
                campaign_id: self.id,
                option_ids,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrears_alternatives::{AlternativeOptionType, OptionStatus, OptionTerms};
    use arrears_events::execute;
    use arrears_invoicing::{NewInvoice, PaymentMethod};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::reminder::{Engagement, ReminderStatus};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap()
    }

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::usd()).unwrap()
    }

    fn overdue_invoice(amount: Decimal) -> Invoice {
        let due = test_time() - Duration::days(5);
        let mut invoice = Invoice::issue(NewInvoice {
            id: InvoiceId::new(),
            customer_id: CustomerId::new(),
            invoice_number: "INV-2040".to_string(),
            amount: usd(amount),
            issue_date: due - Duration::days(30),
            due_date: due,
            lines: vec![],
        })
        .unwrap();
        invoice.mark_overdue(test_time()).unwrap();
        invoice
    }

    fn started_campaign(amount: Decimal) -> PaymentCampaign {
        let id = CampaignId::new();
        let mut campaign = PaymentCampaign::empty(id);
        execute(
            &mut campaign,
            &CampaignCommand::StartCampaign(StartCampaign {
                campaign_id: id,
                invoice: overdue_invoice(amount),
                settings: CampaignSettings::default(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        campaign
    }

    fn reminder_for(campaign: &PaymentCampaign, level: ReminderLevel) -> PaymentReminder {
        PaymentReminder::new(
            ReminderId::new(),
            campaign.invoice_id().unwrap(),
            campaign.customer_id().unwrap(),
            level,
            test_time(),
        )
    }

    fn schedule(
        campaign: &mut PaymentCampaign,
        level: ReminderLevel,
    ) -> DomainResult<Vec<CampaignEvent>> {
        let reminder = reminder_for(campaign, level);
        execute(
            campaign,
            &CampaignCommand::ScheduleReminder(ScheduleReminder {
                campaign_id: campaign.campaign_id(),
                reminder,
                occurred_at: test_time(),
            }),
        )
    }

    fn send(campaign: &mut PaymentCampaign, reminder_id: ReminderId, at: DateTime<Utc>) {
        execute(
            campaign,
            &CampaignCommand::SendReminder(SendReminder {
                campaign_id: campaign.campaign_id(),
                reminder_id,
                occurred_at: at,
            }),
        )
        .unwrap();
    }

    fn schedule_and_send(
        campaign: &mut PaymentCampaign,
        level: ReminderLevel,
        at: DateTime<Utc>,
    ) -> ReminderId {
        schedule(campaign, level).unwrap();
        let id = campaign.reminders().last().unwrap().id();
        send(campaign, id, at);
        id
    }

    fn fail(
        campaign: &mut PaymentCampaign,
        reminder_id: ReminderId,
        at: DateTime<Utc>,
    ) -> Vec<CampaignEvent> {
        execute(
            campaign,
            &CampaignCommand::MarkReminderFailed(MarkReminderFailed {
                campaign_id: campaign.campaign_id(),
                reminder_id,
                reason: "smtp 550".to_string(),
                occurred_at: at,
            }),
        )
        .unwrap()
    }

    fn pay(
        campaign: &mut PaymentCampaign,
        amount: Decimal,
    ) -> DomainResult<Vec<CampaignEvent>> {
        execute(
            campaign,
            &CampaignCommand::RecordPayment(RecordPayment {
                campaign_id: campaign.campaign_id(),
                amount: usd(amount),
                method: PaymentMethod::BankTransfer,
                reference: None,
                occurred_at: test_time() + Duration::days(3),
            }),
        )
    }

    #[test]
    fn start_campaign_makes_first_reminder_due_immediately() {
        let campaign = started_campaign(dec!(1500));
        assert_eq!(campaign.status(), CampaignStatus::Active);
        assert_eq!(campaign.version(), 1);
        assert_eq!(campaign.next_reminder_date(), Some(test_time()));
        assert!(campaign.is_ready_for_next_reminder(test_time()));
        assert_eq!(campaign.next_reminder_level(), Some(ReminderLevel::First));
        assert_eq!(campaign.reminder_tone(), ReminderTone::Friendly);
    }

    #[test]
    fn start_rejects_invoice_that_is_not_overdue() {
        let id = CampaignId::new();
        let invoice = Invoice::issue(NewInvoice {
            id: InvoiceId::new(),
            customer_id: CustomerId::new(),
            invoice_number: "INV-1".to_string(),
            amount: usd(dec!(100)),
            issue_date: test_time(),
            due_date: test_time() + Duration::days(30),
            lines: vec![],
        })
        .unwrap();
        let err = PaymentCampaign::empty(id)
            .handle(&CampaignCommand::StartCampaign(StartCampaign {
                campaign_id: id,
                invoice,
                settings: CampaignSettings::default(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::BusinessRule(_)));
    }

    #[test]
    fn starting_twice_conflicts() {
        let campaign = started_campaign(dec!(100));
        let err = campaign
            .handle(&CampaignCommand::StartCampaign(StartCampaign {
                campaign_id: campaign.campaign_id(),
                invoice: overdue_invoice(dec!(100)),
                settings: CampaignSettings::default(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn schedule_reminder_validates_level_sequence_and_ids() {
        let mut campaign = started_campaign(dec!(800));

        let err = schedule(&mut campaign, ReminderLevel::Second).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("cannot follow") => {}
            _ => panic!("Expected validation error, got {err:?}"),
        }

        let stranger = PaymentReminder::new(
            ReminderId::new(),
            InvoiceId::new(),
            campaign.customer_id().unwrap(),
            ReminderLevel::First,
            test_time(),
        );
        let err = campaign
            .handle(&CampaignCommand::ScheduleReminder(ScheduleReminder {
                campaign_id: campaign.campaign_id(),
                reminder: stranger,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("invoice_id")));

        schedule(&mut campaign, ReminderLevel::First).unwrap();
        assert!(schedule(&mut campaign, ReminderLevel::First).is_err());
        assert!(schedule(&mut campaign, ReminderLevel::Second).is_ok());
    }

    #[test]
    fn schedule_reminder_requires_active_campaign() {
        let mut campaign = started_campaign(dec!(800));
        let campaign_id = campaign.campaign_id();
        execute(
            &mut campaign,
            &CampaignCommand::PauseCampaign(PauseCampaign {
                campaign_id: campaign_id,
                reason: "customer on holiday".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        let err = schedule(&mut campaign, ReminderLevel::First).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn sending_reminder_updates_invoice_and_next_date() {
        let mut campaign = started_campaign(dec!(800));
        let sent_at = test_time() + Duration::hours(2);
        schedule_and_send(&mut campaign, ReminderLevel::First, sent_at);

        assert_eq!(campaign.contact_attempts(), 1);
        assert_eq!(campaign.next_reminder_date(), Some(sent_at + Duration::days(7)));
        assert!(!campaign.is_ready_for_next_reminder(sent_at + Duration::days(6)));
        assert!(campaign.is_ready_for_next_reminder(sent_at + Duration::days(7)));
        let invoice = campaign.invoice().unwrap();
        assert_eq!(invoice.reminder_count(), 1);
        assert_eq!(invoice.current_reminder_level(), Some(ReminderLevel::First));
        assert_eq!(campaign.reminder_tone(), ReminderTone::Firm);
    }

    #[test]
    fn escalated_level_reminder_has_no_next_date() {
        let mut campaign = started_campaign(dec!(800));
        for (i, level) in [
            ReminderLevel::First,
            ReminderLevel::Second,
            ReminderLevel::Third,
            ReminderLevel::Escalated,
        ]
        .into_iter()
        .enumerate()
        {
            schedule_and_send(&mut campaign, level, test_time() + Duration::days(7 * i as i64));
        }
        assert_eq!(campaign.next_reminder_date(), None);
        assert_eq!(campaign.next_reminder_level(), None);
    }

    #[test]
    fn exhausted_first_reminder_advances_to_second() {
        let mut campaign = started_campaign(dec!(800));
        schedule(&mut campaign, ReminderLevel::First).unwrap();
        let first = campaign.reminders()[0].id();

        let failed_at = test_time() + Duration::hours(1);
        assert_eq!(fail(&mut campaign, first, failed_at).len(), 1);
        assert_eq!(fail(&mut campaign, first, failed_at).len(), 1);
        let events = fail(&mut campaign, first, failed_at);

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], CampaignEvent::ReminderScheduled(_)));
        assert_eq!(campaign.reminders().len(), 2);
        let second = &campaign.reminders()[1];
        assert_eq!(second.level(), ReminderLevel::Second);
        assert_eq!(second.status(), ReminderStatus::Scheduled);
        assert_eq!(campaign.reminders()[0].retry_count(), 3);
        assert_eq!(
            campaign.next_reminder_date(),
            Some(failed_at + Duration::days(7))
        );
        assert_eq!(campaign.status(), CampaignStatus::Active);
    }

    #[test]
    fn exhausted_reminder_on_paused_campaign_does_not_schedule_next_level() {
        let mut campaign = started_campaign(dec!(800));
        schedule(&mut campaign, ReminderLevel::First).unwrap();
        let first = campaign.reminders()[0].id();
        let campaign_id = campaign.campaign_id();
        execute(
            &mut campaign,
            &CampaignCommand::PauseCampaign(PauseCampaign {
                campaign_id: campaign_id,
                reason: "customer disputes amount".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let failed_at = test_time() + Duration::hours(1);
        fail(&mut campaign, first, failed_at);
        fail(&mut campaign, first, failed_at);
        let events = fail(&mut campaign, first, failed_at);

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CampaignEvent::ReminderFailed(e) if e.retries_exhausted));
        assert_eq!(campaign.reminders().len(), 1);
        assert_eq!(campaign.status(), CampaignStatus::Paused);
        assert_eq!(campaign.next_reminder_level(), Some(ReminderLevel::Second));
    }

    #[test]
    fn exhausted_third_reminder_escalates() {
        let mut campaign = started_campaign(dec!(800));
        schedule_and_send(&mut campaign, ReminderLevel::First, test_time());
        schedule_and_send(&mut campaign, ReminderLevel::Second, test_time() + Duration::days(7));
        schedule(&mut campaign, ReminderLevel::Third).unwrap();
        let third = campaign.reminders()[2].id();

        let at = test_time() + Duration::days(14);
        fail(&mut campaign, third, at);
        fail(&mut campaign, third, at);
        let events = fail(&mut campaign, third, at);

        assert!(matches!(events.last(), Some(CampaignEvent::CampaignEscalated(_))));
        assert_eq!(campaign.status(), CampaignStatus::Escalated);
        assert_eq!(campaign.escalation_reason(), Some("all reminder attempts failed"));
        assert_eq!(
            campaign.invoice().unwrap().status(),
            InvoiceStatus::InDefault
        );
    }

    #[test]
    fn third_level_after_22_days_should_auto_escalate() {
        let mut campaign = started_campaign(dec!(800));
        schedule_and_send(&mut campaign, ReminderLevel::First, test_time());
        schedule_and_send(&mut campaign, ReminderLevel::Second, test_time() + Duration::days(7));
        schedule_and_send(&mut campaign, ReminderLevel::Third, test_time() + Duration::days(14));

        assert!(!campaign.should_auto_escalate(test_time() + Duration::days(20)));
        assert!(campaign.should_auto_escalate(test_time() + Duration::days(22)));
    }

    #[test]
    fn customer_response_pauses_and_full_payment_completes() {
        let mut campaign = started_campaign(dec!(500));
        let first = schedule_and_send(&mut campaign, ReminderLevel::First, test_time());
        let campaign_id = campaign.campaign_id();
        execute(
            &mut campaign,
            &CampaignCommand::RecordCustomerResponse(RecordCustomerResponse {
                campaign_id: campaign_id,
                reminder_id: first,
                occurred_at: test_time() + Duration::days(1),
            }),
        )
        .unwrap();
        assert_eq!(campaign.status(), CampaignStatus::Paused);
        assert!(!campaign.is_ready_for_next_reminder(test_time() + Duration::days(30)));

        let events = pay(&mut campaign, dec!(500)).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], CampaignEvent::CampaignResumed(_)));
        assert!(matches!(events[2], CampaignEvent::CampaignCompleted(_)));
        assert_eq!(campaign.status(), CampaignStatus::Completed);
        assert_eq!(campaign.total_collected(), usd(dec!(500)));
        assert!(campaign.invoice().unwrap().current_balance().is_zero());
    }

    #[test]
    fn partial_payment_resumes_paused_campaign() {
        let mut campaign = started_campaign(dec!(500));
        let campaign_id = campaign.campaign_id();
        execute(
            &mut campaign,
            &CampaignCommand::PauseCampaign(PauseCampaign {
                campaign_id: campaign_id,
                reason: "manual review".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        pay(&mut campaign, dec!(200)).unwrap();
        assert_eq!(campaign.status(), CampaignStatus::Active);
        assert_eq!(
            campaign.invoice().unwrap().status(),
            InvoiceStatus::PartiallyPaid
        );
    }

    #[test]
    fn escalating_twice_is_rejected_and_terminal_campaign_is_read_only() {
        let mut campaign = started_campaign(dec!(500));
        let escalate = CampaignCommand::EscalateCampaign(EscalateCampaign {
            campaign_id: campaign.campaign_id(),
            reason: "customer unreachable".to_string(),
            occurred_at: test_time() + Duration::days(30),
        });
        execute(&mut campaign, &escalate).unwrap();
        assert!(campaign.escalation_triggered());
        assert_eq!(campaign.invoice().unwrap().priority(), arrears_invoicing::InvoicePriority::Critical);

        let err = campaign.handle(&escalate).unwrap_err();
        assert!(matches!(err, DomainError::BusinessRule(msg) if msg.contains("already escalated")));

        let err = campaign
            .handle(&CampaignCommand::AddCollectionNote(AddCollectionNote {
                campaign_id: campaign.campaign_id(),
                note: "left voicemail".to_string(),
                author: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::BusinessRule(_)));
        assert!(pay(&mut campaign, dec!(10)).is_err());
    }

    #[test]
    fn escalated_campaign_records_its_collections_case() {
        let mut campaign = started_campaign(dec!(500));
        let id = campaign.campaign_id();
        let record = |case_id: &str, data_transferred: bool| {
            CampaignCommand::RecordCollectionsCase(RecordCollectionsCase {
                campaign_id: id,
                case_id: case_id.to_string(),
                data_transferred,
                occurred_at: test_time() + Duration::days(30),
            })
        };
        assert!(matches!(
            campaign.handle(&record("CASE-000009", true)),
            Err(DomainError::BusinessRule(_))
        ));

        execute(
            &mut campaign,
            &CampaignCommand::EscalateCampaign(EscalateCampaign {
                campaign_id: id,
                reason: "reminder limit reached".to_string(),
                occurred_at: test_time() + Duration::days(30),
            }),
        )
        .unwrap();
        assert!(campaign.awaits_collections_case());

        execute(&mut campaign, &record("CASE-000009", false)).unwrap();
        assert_eq!(campaign.collections_case_id(), Some("CASE-000009"));
        assert!(campaign.awaits_collections_case());
        assert!(campaign.handle(&record("CASE-000009", false)).is_err());
        assert!(matches!(
            campaign.handle(&record("CASE-000010", true)),
            Err(DomainError::Conflict(_))
        ));

        execute(&mut campaign, &record("CASE-000009", true)).unwrap();
        assert!(campaign.case_data_transferred());
        assert!(!campaign.awaits_collections_case());
        assert!(campaign.handle(&record("CASE-000009", true)).is_err());
    }

    #[test]
    fn rejected_command_leaves_state_untouched() {
        let mut campaign = started_campaign(dec!(500));
        let before = campaign.clone();
        assert!(pay(&mut campaign, dec!(900)).is_err());
        assert_eq!(campaign, before);
    }

    #[test]
    fn engagement_is_tracked_on_the_reminder() {
        let mut campaign = started_campaign(dec!(500));
        let first = schedule_and_send(&mut campaign, ReminderLevel::First, test_time());
        let campaign_id = campaign.campaign_id();
        execute(
            &mut campaign,
            &CampaignCommand::RecordReminderEngagement(RecordReminderEngagement {
                campaign_id: campaign_id,
                reminder_id: first,
                engagement: Engagement::Opened,
                occurred_at: test_time() + Duration::hours(3),
            }),
        )
        .unwrap();
        assert_eq!(campaign.reminders_opened(), 1);
        assert_eq!(
            campaign.reminder(first).unwrap().opened_at(),
            Some(test_time() + Duration::hours(3))
        );
    }

    #[test]
    fn alternative_options_can_be_offered_accepted_and_expired() {
        let mut campaign = started_campaign(dec!(1000));
        let make_option = |days: i64| AlternativePaymentOption {
            id: OptionId::new(),
            invoice_id: campaign.invoice_id().unwrap(),
            option_type: AlternativeOptionType::SettlementDiscount,
            payment_amount: usd(dec!(950)),
            total_amount: usd(dec!(950)),
            discount_amount: usd(dec!(50)),
            terms: OptionTerms::default(),
            approval_required: false,
            status: OptionStatus::Pending,
            effectiveness_score: 0.6,
            offered_at: test_time(),
            valid_until: test_time() + Duration::days(days),
            responded_at: None,
        };
        let accepted = make_option(7);
        let lapsing = make_option(3);

        for option in [accepted.clone(), lapsing.clone()] {
            let campaign_id = campaign.campaign_id();
            execute(
                &mut campaign,
                &CampaignCommand::OfferAlternativeOption(OfferAlternativeOption {
                    campaign_id: campaign_id,
                    option,
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
        }
        let campaign_id = campaign.campaign_id();
        execute(
            &mut campaign,
            &CampaignCommand::RespondToAlternativeOption(RespondToAlternativeOption {
                campaign_id: campaign_id,
                option_id: accepted.id,
                accepted: true,
                occurred_at: test_time() + Duration::days(1),
            }),
        )
        .unwrap();
        let campaign_id = campaign.campaign_id();
        let events = execute(
            &mut campaign,
            &CampaignCommand::ExpireAlternativeOptions(ExpireAlternativeOptions {
                campaign_id: campaign_id,
                occurred_at: test_time() + Duration::days(5),
            }),
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        let statuses: Vec<OptionStatus> = campaign
            .alternative_options()
            .iter()
            .map(|o| o.status)
            .collect();
        assert_eq!(statuses, vec![OptionStatus::Accepted, OptionStatus::Expired]);
    }

    #[test]
    fn collection_notes_are_recorded() {
        let mut campaign = started_campaign(dec!(1000));
        let campaign_id = campaign.campaign_id();
        execute(
            &mut campaign,
            &CampaignCommand::AddCollectionNote(AddCollectionNote {
                campaign_id: campaign_id,
                note: "Customer raised a dispute about line 2".to_string(),
                author: Some("ar-team".to_string()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(campaign.collection_notes().len(), 1);
        assert!(campaign
            .handle(&CampaignCommand::AddCollectionNote(AddCollectionNote {
                campaign_id: campaign.campaign_id(),
                note: "   ".to_string(),
                author: None,
                occurred_at: test_time(),
            }))
            .is_err());
    }

    #[test]
    fn command_for_other_campaign_is_rejected() {
        let campaign = started_campaign(dec!(1000));
        let err = campaign
            .handle(&CampaignCommand::ResumeCampaign(ResumeCampaign {
                campaign_id: CampaignId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    fn level_strategy() -> impl Strategy<Value = ReminderLevel> {
        prop_oneof![
            Just(ReminderLevel::First),
            Just(ReminderLevel::Second),
            Just(ReminderLevel::Third),
            Just(ReminderLevel::Escalated),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever order levels are requested in, the accepted
        /// reminders always read First, Second, Third, Escalated.
        #[test]
        fn accepted_levels_are_strictly_sequential(
            attempts in prop::collection::vec(level_strategy(), 1..16)
        ) {
            let mut campaign = started_campaign(dec!(750));
            for level in attempts {
                let _ = schedule(&mut campaign, level);
            }
            let expected = [
                ReminderLevel::First,
                ReminderLevel::Second,
                ReminderLevel::Third,
                ReminderLevel::Escalated,
            ];
            let accepted: Vec<ReminderLevel> =
                campaign.reminders().iter().map(PaymentReminder::level).collect();
            prop_assert!(accepted.len() <= expected.len());
            prop_assert_eq!(&accepted[..], &expected[..accepted.len()]);
        }
    }
}
