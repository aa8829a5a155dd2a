//! Sends the next due reminder of a campaign.
//!
//! Rendering and delivery are async port calls, each under the configured
//! I/O timeout. A port failure never surfaces as an error to the caller: it
//! becomes a `MarkReminderFailed` command, so the campaign's retry budget
//! decides what happens next.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use arrears_campaigns::{
    CampaignCommand, CampaignId, CampaignStatus, MarkReminderFailed, PaymentCampaign,
    PaymentReminder, ReminderId, ScheduleReminder, SendReminder,
};
use arrears_events::{EventBus, EventEnvelope};
use arrears_invoicing::ReminderLevel;

use crate::command_dispatcher::{CampaignCommandDispatcher, DispatchError};
use crate::ports::{EmailContext, OutboundReminder, PortError, Ports};
use crate::timeout::with_timeout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent {
        reminder_id: ReminderId,
        level: ReminderLevel,
        message_id: String,
    },
    Failed {
        reminder_id: ReminderId,
        reason: String,
        /// The failure used up the last retry of the final level.
        escalated: bool,
    },
    /// Not active, or the next reminder date is still ahead.
    NotDue,
    /// The reminder sequence is exhausted; the escalation review takes over.
    AwaitingEscalation,
}

pub struct ReminderDeliveryService<B> {
    ports: Ports,
    dispatcher: Arc<CampaignCommandDispatcher<B>>,
    io_timeout: Duration,
}

impl<B> ReminderDeliveryService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        ports: Ports,
        dispatcher: Arc<CampaignCommandDispatcher<B>>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            ports,
            dispatcher,
            io_timeout,
        }
    }

    /// Deliver whatever the campaign owes the customer at `now`.
    ///
    /// Resends the latest reminder if it failed with retries left; otherwise
    /// schedules the next level first. The `Escalated` level is never sent
    /// automatically.
    pub async fn deliver_next(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, DispatchError> {
        let campaign = self
            .ports
            .campaigns
            .find_by_id(campaign_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("campaign {campaign_id}")))?;
        if !campaign.is_ready_for_next_reminder(now) {
            return Ok(DeliveryOutcome::NotDue);
        }

        let (campaign, reminder) = match campaign.pending_reminder().cloned() {
            Some(reminder) => (campaign, reminder),
            None => match campaign.next_reminder_level() {
                Some(level) if level != ReminderLevel::Escalated => {
                    self.schedule(&campaign, level, now)?
                }
                _ => {
                    debug!(%campaign_id, "reminder sequence exhausted");
                    return Ok(DeliveryOutcome::AwaitingEscalation);
                }
            },
        };

        match self.render_and_deliver(&campaign, &reminder, now).await {
            Ok(message_id) => {
                self.dispatcher
                    .dispatch(CampaignCommand::SendReminder(SendReminder {
                        campaign_id,
                        reminder_id: reminder.id(),
                        occurred_at: now,
                    }))?;
                info!(%campaign_id, reminder_id = %reminder.id(), level = ?reminder.level(), "reminder sent");
                Ok(DeliveryOutcome::Sent {
                    reminder_id: reminder.id(),
                    level: reminder.level(),
                    message_id,
                })
            }
            Err(err) => {
                warn!(%campaign_id, reminder_id = %reminder.id(), error = %err, "reminder delivery failed");
                let reason = err.to_string();
                let outcome = self.dispatcher.dispatch(CampaignCommand::MarkReminderFailed(
                    MarkReminderFailed {
                        campaign_id,
                        reminder_id: reminder.id(),
                        reason: reason.clone(),
                        occurred_at: now,
                    },
                ))?;
                Ok(DeliveryOutcome::Failed {
                    reminder_id: reminder.id(),
                    reason,
                    escalated: outcome.campaign.status() == CampaignStatus::Escalated,
                })
            }
        }
    }

    fn schedule(
        &self,
        campaign: &PaymentCampaign,
        level: ReminderLevel,
        now: DateTime<Utc>,
    ) -> Result<(PaymentCampaign, PaymentReminder), DispatchError> {
        let (Some(invoice_id), Some(customer_id)) = (campaign.invoice_id(), campaign.customer_id())
        else {
            return Err(DispatchError::NotFound(format!(
                "invoice of campaign {}",
                campaign.campaign_id()
            )));
        };
        let reminder = PaymentReminder::new(ReminderId::new(), invoice_id, customer_id, level, now);
        let outcome = self
            .dispatcher
            .dispatch(CampaignCommand::ScheduleReminder(ScheduleReminder {
                campaign_id: campaign.campaign_id(),
                reminder: reminder.clone(),
                occurred_at: now,
            }))?;
        // The aggregate applies the campaign's retry budget to the stored copy.
        let scheduled = outcome
            .campaign
            .reminder(reminder.id())
            .cloned()
            .unwrap_or(reminder);
        Ok((outcome.campaign, scheduled))
    }

    async fn render_and_deliver(
        &self,
        campaign: &PaymentCampaign,
        reminder: &PaymentReminder,
        now: DateTime<Utc>,
    ) -> Result<String, PortError> {
        let invoice = campaign
            .invoice()
            .ok_or_else(|| PortError::Rejected("campaign has no invoice".to_string()))?;
        let context = EmailContext {
            campaign_id: campaign.campaign_id(),
            reminder_id: reminder.id(),
            customer_id: reminder.customer_id(),
            invoice_id: reminder.invoice_id(),
            invoice_number: invoice.invoice_number().to_string(),
            level: reminder.level(),
            tone: reminder.tone(),
            original_amount: invoice.original_amount(),
            outstanding_balance: invoice.current_balance(),
            due_date: invoice.due_date(),
            days_overdue: invoice.days_overdue(now),
        };

        let email = with_timeout(
            self.io_timeout,
            "email template generator",
            self.ports.templates.render(&context),
        )
        .await?;
        let outbound = OutboundReminder {
            reminder_id: reminder.id(),
            customer_id: reminder.customer_id(),
            invoice_id: reminder.invoice_id(),
            level: reminder.level(),
            email,
        };
        let receipt = with_timeout(
            self.io_timeout,
            "reminder channel",
            self.ports.channel.deliver(&outbound),
        )
        .await?;
        if receipt.duplicate {
            debug!(reminder_id = %reminder.id(), "channel already had this reminder");
        }
        Ok(receipt.message_id)
    }
}
