use serde::{Deserialize, Serialize};

use arrears_core::{DomainError, DomainResult, Money};
use arrears_customers::CustomerId;
use arrears_invoicing::PaymentMethod;

use crate::option::AlternativeOptionType;

/// A customer's statement of financial hardship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardshipDeclaration {
    /// Self-assessed severity in `[0, 1]`.
    pub severity: f64,
    pub indicators: Vec<String>,
}

/// Customer preferences and capacity used to tailor offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPaymentProfile {
    pub customer_id: CustomerId,
    pub risk_score: f64,
    #[serde(default)]
    pub monthly_payment_capacity: Option<Money>,
    /// Most preferred first.
    #[serde(default)]
    pub preferred_option_types: Vec<AlternativeOptionType>,
    #[serde(default)]
    pub prefers_online_payment: bool,
    #[serde(default)]
    pub preferred_payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub hardship: Option<HardshipDeclaration>,
}

impl CustomerPaymentProfile {
    pub fn new(customer_id: CustomerId, risk_score: f64) -> DomainResult<Self> {
        if !(0.0..=1.0).contains(&risk_score) {
            return Err(DomainError::validation(format!(
                "risk score must be within [0, 1], got {risk_score}"
            )));
        }
        Ok(Self {
            customer_id,
            risk_score,
            monthly_payment_capacity: None,
            preferred_option_types: Vec::new(),
            prefers_online_payment: false,
            preferred_payment_methods: Vec::new(),
            hardship: None,
        })
    }

    pub fn with_capacity(mut self, capacity: Money) -> Self {
        self.monthly_payment_capacity = Some(capacity);
        self
    }

    pub fn with_preferences(mut self, types: Vec<AlternativeOptionType>) -> Self {
        self.preferred_option_types = types;
        self
    }

    pub fn with_online_payment(mut self, methods: Vec<PaymentMethod>) -> Self {
        self.prefers_online_payment = true;
        self.preferred_payment_methods = methods;
        self
    }

    pub fn with_hardship(mut self, severity: f64, indicators: Vec<String>) -> DomainResult<Self> {
        if !(0.0..=1.0).contains(&severity) {
            return Err(DomainError::validation(format!(
                "hardship severity must be within [0, 1], got {severity}"
            )));
        }
        self.hardship = Some(HardshipDeclaration {
            severity,
            indicators,
        });
        Ok(self)
    }

    /// Hardship counts only when at least one indicator backs it up.
    pub fn active_hardship(&self) -> Option<&HardshipDeclaration> {
        self.hardship
            .as_ref()
            .filter(|h| !h.indicators.is_empty())
    }

    /// 0 for the first preference, 1.. for the rest, `None` when not listed.
    pub fn preference_rank(&self, option_type: AlternativeOptionType) -> Option<usize> {
        self.preferred_option_types
            .iter()
            .position(|t| *t == option_type)
    }
}
