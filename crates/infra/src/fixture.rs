//! JSON fixtures for the in-memory backend.
//!
//! ```json
//! {
//!   "invoices": [{ "id": "...", "customer_id": "...", "invoice_number": "INV-1",
//!                  "amount": { "amount": "1200.00", "currency": "USD" },
//!                  "issue_date": "2025-01-01T00:00:00Z", "due_date": "2025-01-31T00:00:00Z" }],
//!   "risk_profiles": [{ "customer_id": "...", "risk_score": 0.4 }],
//!   "payment_profiles": [],
//!   "payments": [{ "customer_id": "...", "amount": "150.00", "method": "card" }]
//! }
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use arrears_alternatives::CustomerPaymentProfile;
use arrears_core::{Currency, DomainError, Money};
use arrears_customers::{CustomerId, CustomerRiskProfile};
use arrears_invoicing::{Invoice, NewInvoice, PaymentMethod};
use arrears_payments::{Payment, PaymentId};

use crate::adapters::InMemoryBackend;
use crate::ports::RepositoryError;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse fixture: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid fixture data: {0}")]
    Domain(#[from] DomainError),

    #[error("failed to seed fixture: {0}")]
    Repository(#[from] RepositoryError),
}

/// A payment waiting to be applied. Currency defaults to the configured one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFixture {
    pub customer_id: CustomerId,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub invoices: Vec<NewInvoice>,
    pub risk_profiles: Vec<CustomerRiskProfile>,
    pub payment_profiles: Vec<CustomerPaymentProfile>,
    pub payments: Vec<PaymentFixture>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Issue every invoice and register the customer profiles. Returns the
    /// number of invoices seeded.
    pub fn seed(&self, backend: &InMemoryBackend) -> Result<usize, FixtureError> {
        for new in &self.invoices {
            backend.invoices.insert(Invoice::issue(new.clone())?)?;
        }
        for profile in &self.risk_profiles {
            backend.customers.upsert_risk(profile.clone());
        }
        for profile in &self.payment_profiles {
            backend.customers.upsert_payment(profile.clone());
        }
        Ok(self.invoices.len())
    }

    /// Payments ready for application; `received_at` defaults to `now`.
    pub fn payments(
        &self,
        default_currency: Currency,
        now: DateTime<Utc>,
    ) -> Result<Vec<Payment>, FixtureError> {
        self.payments
            .iter()
            .map(|p| {
                let currency = match &p.currency {
                    Some(code) => Currency::new(code)?,
                    None => default_currency,
                };
                Ok(Payment::new(
                    PaymentId::new(),
                    p.customer_id,
                    Money::new(p.amount, currency)?,
                    p.received_at.unwrap_or(now),
                    p.method,
                    p.reference.clone(),
                )?)
            })
            .collect()
    }
}
