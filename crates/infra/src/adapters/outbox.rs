use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use arrears_campaigns::{CampaignId, PaymentCampaign, ReminderId};
use arrears_invoicing::InvoiceId;

use crate::ports::{
    CollectionsHandoffService, DeliveryReceipt, Notification, NotificationService,
    OutboundReminder, PortError, ReminderChannel,
};

fn poisoned(port: &str) -> PortError {
    PortError::Unavailable(format!("{port} (lock poisoned)"))
}

/// Reminder channel that keeps every accepted reminder in an outbox.
///
/// Idempotent by reminder id: a redelivery returns the original message id.
#[derive(Debug, Default)]
pub struct OutboxReminderChannel {
    outbox: Mutex<Vec<OutboundReminder>>,
    accepted: Mutex<HashMap<ReminderId, String>>,
}

impl OutboxReminderChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundReminder> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ReminderChannel for OutboxReminderChannel {
    async fn deliver(&self, reminder: &OutboundReminder) -> Result<DeliveryReceipt, PortError> {
        let mut accepted = self.accepted.lock().map_err(|_| poisoned("outbox"))?;
        if let Some(message_id) = accepted.get(&reminder.reminder_id) {
            return Ok(DeliveryReceipt {
                reminder_id: reminder.reminder_id,
                message_id: message_id.clone(),
                duplicate: true,
            });
        }

        let message_id = format!("outbox-{:06}", accepted.len() + 1);
        accepted.insert(reminder.reminder_id, message_id.clone());
        self.outbox
            .lock()
            .map_err(|_| poisoned("outbox"))?
            .push(reminder.clone());

        Ok(DeliveryReceipt {
            reminder_id: reminder.reminder_id,
            message_id,
            duplicate: false,
        })
    }
}

/// A collections case opened by [`InMemoryCollectionsHandoff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffCase {
    pub case_id: String,
    pub campaign_id: CampaignId,
    pub invoice_id: Option<InvoiceId>,
    pub reason: String,
    pub data_transferred: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryCollectionsHandoff {
    cases: Mutex<Vec<HandoffCase>>,
}

impl InMemoryCollectionsHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cases(&self) -> Vec<HandoffCase> {
        self.cases.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl CollectionsHandoffService for InMemoryCollectionsHandoff {
    async fn create_case(
        &self,
        campaign: &PaymentCampaign,
        reason: &str,
    ) -> Result<String, PortError> {
        let mut cases = self.cases.lock().map_err(|_| poisoned("collections handoff"))?;
        let case_id = format!("CASE-{:06}", cases.len() + 1);
        cases.push(HandoffCase {
            case_id: case_id.clone(),
            campaign_id: campaign.campaign_id(),
            invoice_id: campaign.invoice_id(),
            reason: reason.to_string(),
            data_transferred: false,
        });
        Ok(case_id)
    }

    async fn transfer_data(
        &self,
        campaign: &PaymentCampaign,
        case_id: &str,
    ) -> Result<bool, PortError> {
        let mut cases = self.cases.lock().map_err(|_| poisoned("collections handoff"))?;
        let case = cases
            .iter_mut()
            .find(|c| c.case_id == case_id && c.campaign_id == campaign.campaign_id())
            .ok_or_else(|| PortError::Rejected(format!("unknown case {case_id}")))?;
        case.data_transferred = true;
        Ok(true)
    }
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationService;

#[async_trait::async_trait]
impl NotificationService for TracingNotificationService {
    async fn notify(&self, notification: Notification) -> Result<(), PortError> {
        match &notification {
            Notification::CampaignEscalated {
                campaign_id,
                reason,
                case_id,
                ..
            } => info!(%campaign_id, reason = %reason, case_id = ?case_id, "campaign escalated"),
            Notification::ManagerReview {
                campaign_id,
                reasons,
                next_review_at,
                ..
            } => info!(%campaign_id, ?reasons, %next_review_at, "manager review requested"),
        }
        Ok(())
    }
}
