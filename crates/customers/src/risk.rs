use serde::{Deserialize, Serialize};

use arrears_core::{DomainError, DomainResult};

arrears_core::uuid_id!(
    /// Customer (bill-to account) identifier.
    CustomerId,
    "CustomerId"
);

/// Aggregated payment behaviour of a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentHistory {
    pub invoices_paid: u32,
    pub invoices_paid_on_time: u32,
    pub reminders_received: u32,
    pub reminders_responded: u32,
    pub average_days_late: f64,
}

impl PaymentHistory {
    /// Share of paid invoices that were paid by their due date.
    ///
    /// `None` when there is no history to judge by.
    pub fn on_time_payment_rate(&self) -> Option<f64> {
        ratio(self.invoices_paid_on_time, self.invoices_paid)
    }

    /// Share of reminders the customer reacted to.
    pub fn reminder_response_rate(&self) -> Option<f64> {
        ratio(self.reminders_responded, self.reminders_received)
    }
}

fn ratio(part: u32, whole: u32) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some((f64::from(part.min(whole)) / f64::from(whole)).clamp(0.0, 1.0))
}

/// Coarse bucket over `risk_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskTier {
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            RiskTier::VeryHigh
        } else if score >= 0.6 {
            RiskTier::High
        } else if score >= 0.3 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

/// Risk view of a customer as returned by the risk provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRiskProfile {
    pub customer_id: CustomerId,
    /// Probability-like score in [0, 1]; higher is riskier.
    pub risk_score: f64,
    #[serde(default)]
    pub payment_history: PaymentHistory,
    /// Number of the customer's invoices currently overdue (eventually consistent).
    #[serde(default)]
    pub overdue_invoice_count: u32,
}

impl CustomerRiskProfile {
    pub fn new(customer_id: CustomerId, risk_score: f64) -> DomainResult<Self> {
        if !(0.0..=1.0).contains(&risk_score) {
            return Err(DomainError::validation(format!(
                "risk score must be within [0, 1], got {risk_score}"
            )));
        }
        Ok(Self {
            customer_id,
            risk_score,
            payment_history: PaymentHistory::default(),
            overdue_invoice_count: 0,
        })
    }

    /// Profile used when the provider knows nothing about the customer.
    pub fn neutral(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            risk_score: 0.5,
            payment_history: PaymentHistory::default(),
            overdue_invoice_count: 0,
        }
    }

    pub fn with_history(mut self, history: PaymentHistory) -> Self {
        self.payment_history = history;
        self
    }

    pub fn with_overdue_invoices(mut self, count: u32) -> Self {
        self.overdue_invoice_count = count;
        self
    }

    pub fn tier(&self) -> RiskTier {
        RiskTier::from_score(self.risk_score)
    }

    /// Overdue invoices other than the one currently being evaluated.
    pub fn other_overdue_invoices(&self) -> u32 {
        self.overdue_invoice_count.saturating_sub(1)
    }
}
