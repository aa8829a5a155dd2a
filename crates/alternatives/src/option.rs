use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use arrears_core::{DomainError, DomainResult, Money};
use arrears_invoicing::{InvoiceId, PaymentMethod};

arrears_core::uuid_id!(
    /// Alternative payment option identifier.
    OptionId,
    "OptionId"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeOptionType {
    InstallmentPlan,
    SettlementDiscount,
    EarlyPaymentIncentive,
    HardshipPlan,
    PaymentMethodAlternative,
}

impl AlternativeOptionType {
    /// Historical acceptance-and-completion rate for the offer type.
    pub fn base_success_rate(self) -> f64 {
        match self {
            AlternativeOptionType::InstallmentPlan => 0.75,
            AlternativeOptionType::SettlementDiscount => 0.70,
            AlternativeOptionType::EarlyPaymentIncentive => 0.60,
            AlternativeOptionType::HardshipPlan => 0.80,
            AlternativeOptionType::PaymentMethodAlternative => 0.55,
        }
    }
}

/// Option lifecycle: `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// Type-specific terms of an offer. Fields irrelevant to a type are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptionTerms {
    pub description: String,
    pub installments: Option<u32>,
    pub interest_amount: Option<Money>,
    pub setup_fee: Option<Money>,
    pub discount_rate: Option<Decimal>,
    pub pay_within_days: Option<u32>,
    pub payment_method: Option<PaymentMethod>,
}

/// An offer made to the customer for one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativePaymentOption {
    pub id: OptionId,
    pub invoice_id: InvoiceId,
    pub option_type: AlternativeOptionType,
    /// Amount due per payment (per installment for plans).
    pub payment_amount: Money,
    /// Everything the customer pays over the life of the offer.
    pub total_amount: Money,
    pub discount_amount: Money,
    pub terms: OptionTerms,
    pub approval_required: bool,
    pub status: OptionStatus,
    pub effectiveness_score: f64,
    pub offered_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl AlternativePaymentOption {
    pub fn is_pending(&self) -> bool {
        self.status == OptionStatus::Pending
    }

    pub fn is_past_validity(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    pub fn accept(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_open(at)?;
        self.status = OptionStatus::Accepted;
        self.responded_at = Some(at);
        Ok(())
    }

    pub fn decline(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = OptionStatus::Declined;
        self.responded_at = Some(at);
        Ok(())
    }

    /// Mark a pending option whose validity has lapsed. Returns whether it changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_pending() && self.is_past_validity(now) {
            self.status = OptionStatus::Expired;
            true
        } else {
            false
        }
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if !self.is_pending() {
            return Err(DomainError::business_rule(format!(
                "option {} is already {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn ensure_open(&self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_pending()?;
        if self.is_past_validity(at) {
            return Err(DomainError::business_rule(format!(
                "option {} expired at {}",
                self.id, self.valid_until
            )));
        }
        Ok(())
    }
}
