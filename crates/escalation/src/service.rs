use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use arrears_campaigns::{CampaignId, PaymentCampaign};
use arrears_core::{DomainError, DomainResult, Money};
use arrears_customers::CustomerId;
use arrears_invoicing::InvoiceId;

use crate::reason::{EscalationAction, EscalationReason};

const LEGAL_REVIEW_DAYS: i64 = 14;
const COLLECTIONS_REVIEW_DAYS: i64 = 30;
const MANAGER_REVIEW_DAYS: i64 = 3;
const DEFAULT_REVIEW_DAYS: i64 = 7;

/// Limits used by the escalation checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationThresholds {
    pub max_attempts: u32,
    pub non_responsive_days: i64,
    pub high_risk_amount: Decimal,
    pub large_amount: Decimal,
    pub multiple_campaigns: usize,
    pub low_probability: f64,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            non_responsive_days: 14,
            high_risk_amount: Decimal::from(10_000),
            large_amount: Decimal::from(5_000),
            multiple_campaigns: 3,
            low_probability: 0.4,
        }
    }
}

/// Read-only snapshot of a campaign taken for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationContext {
    pub campaign_id: CampaignId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    /// Outstanding balance of the invoice.
    pub total_amount: Money,
    pub reminder_count: u32,
    pub days_active: i64,
    pub days_since_last_reminder: Option<i64>,
    pub last_reminder_opened: bool,
    pub reminders_opened: u32,
    /// Active campaigns of the same customer, this one included.
    pub active_campaigns_for_customer: usize,
    pub collection_notes: Vec<String>,
    pub auto_escalation_due: bool,
    pub as_of: DateTime<Utc>,
}

impl EscalationContext {
    pub fn from_campaign(
        campaign: &PaymentCampaign,
        active_campaigns_for_customer: usize,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let invoice = campaign.invoice().ok_or_else(|| {
            DomainError::not_found(format!("campaign {}", campaign.campaign_id()))
        })?;
        let last_sent = campaign.last_sent_reminder();

        Ok(Self {
            campaign_id: campaign.campaign_id(),
            invoice_id: invoice.invoice_id(),
            customer_id: invoice.customer_id(),
            total_amount: invoice.current_balance(),
            reminder_count: invoice.reminder_count(),
            days_active: campaign.days_active(now),
            days_since_last_reminder: last_sent
                .and_then(|r| r.sent_at())
                .map(|sent| now.signed_duration_since(sent).num_days().max(0)),
            last_reminder_opened: last_sent.is_some_and(|r| r.was_opened()),
            reminders_opened: campaign.reminders_opened(),
            active_campaigns_for_customer,
            collection_notes: campaign
                .collection_notes()
                .iter()
                .map(|n| n.note.clone())
                .collect(),
            auto_escalation_due: campaign.should_auto_escalate(now),
            as_of: now,
        })
    }
}

/// Outcome of [`EscalationService::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub campaign_id: CampaignId,
    pub reasons: Vec<EscalationReason>,
    pub actions: Vec<EscalationAction>,
    pub requires_manual_intervention: bool,
    pub collection_probability: f64,
    pub auto_escalation_due: bool,
    pub evaluated_at: DateTime<Utc>,
    pub next_review_at: DateTime<Utc>,
}

impl EscalationDecision {
    pub fn is_clear(&self) -> bool {
        self.reasons.is_empty() && !self.auto_escalation_due
    }

    pub fn has_reason(&self, reason: EscalationReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn has_action(&self, action: EscalationAction) -> bool {
        self.actions.contains(&action)
    }

    /// Whether the campaign leaves automated reminders for collections.
    pub fn should_hand_off(&self) -> bool {
        self.auto_escalation_due || self.reasons.iter().any(|r| r.is_handoff_reason())
    }

    /// Reason text recorded on the campaign when it is handed off.
    pub fn handoff_reason(&self) -> Option<String> {
        if let Some(reason) = self.reasons.iter().find(|r| r.is_handoff_reason()) {
            return Some(reason.describe().to_string());
        }
        self.auto_escalation_due
            .then(|| "no payment after final reminder".to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EscalationService {
    thresholds: EscalationThresholds,
}

impl EscalationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: EscalationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &EscalationThresholds {
        &self.thresholds
    }

    /// `0.8 - 0.01*days_active - 0.1*reminder_count`, clamped to `[0, 1]`.
    pub fn collection_probability(context: &EscalationContext) -> f64 {
        let estimate = 0.8
            - 0.01 * context.days_active as f64
            - 0.1 * f64::from(context.reminder_count);
        estimate.clamp(0.0, 1.0)
    }

    pub fn evaluate(&self, context: &EscalationContext) -> EscalationDecision {
        let probability = Self::collection_probability(context);
        let reasons: Vec<EscalationReason> = EscalationReason::ALL
            .into_iter()
            .filter(|reason| self.triggered(*reason, context, probability))
            .collect();

        let mut actions: Vec<EscalationAction> = Vec::new();
        for action in reasons.iter().flat_map(|r| r.actions()) {
            if !actions.contains(action) {
                actions.push(*action);
            }
        }

        let requires_manual_intervention = reasons
            .iter()
            .any(|r| r.requires_manual_intervention())
            || actions.iter().any(|a| a.requires_manual_intervention());

        EscalationDecision {
            campaign_id: context.campaign_id,
            next_review_at: context.as_of + Duration::days(review_delay_days(&actions)),
            reasons,
            actions,
            requires_manual_intervention,
            collection_probability: probability,
            auto_escalation_due: context.auto_escalation_due,
            evaluated_at: context.as_of,
        }
    }

    fn triggered(
        &self,
        reason: EscalationReason,
        context: &EscalationContext,
        probability: f64,
    ) -> bool {
        let t = &self.thresholds;
        let amount = context.total_amount.amount();
        match reason {
            EscalationReason::ReminderLimitReached => context.reminder_count >= t.max_attempts,
            EscalationReason::CustomerNonResponsive => {
                context
                    .days_since_last_reminder
                    .is_some_and(|days| days >= t.non_responsive_days)
                    && !context.last_reminder_opened
            }
            EscalationReason::HighRiskCustomer => {
                amount > t.high_risk_amount
                    && context.reminder_count > 1
                    && context.reminders_opened == 0
            }
            EscalationReason::LargeAmountOverdue => amount >= t.large_amount,
            EscalationReason::MultipleInvoicesOverdue => {
                context.active_campaigns_for_customer >= t.multiple_campaigns
            }
            EscalationReason::CollectionProbabilityLow => probability < t.low_probability,
            EscalationReason::PaymentDisputes => context
                .collection_notes
                .iter()
                .any(|note| note.to_lowercase().contains("dispute")),
        }
    }
}

/// First match wins: legal review, collections handoff, manager review.
fn review_delay_days(actions: &[EscalationAction]) -> i64 {
    if actions.contains(&EscalationAction::LegalReview) {
        LEGAL_REVIEW_DAYS
    } else if actions.contains(&EscalationAction::CollectionsHandoff) {
        COLLECTIONS_REVIEW_DAYS
    } else if actions.contains(&EscalationAction::ManagerReview) {
        MANAGER_REVIEW_DAYS
    } else {
        DEFAULT_REVIEW_DAYS
    }
}
