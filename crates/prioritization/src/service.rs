use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arrears_core::{DomainResult, Money};
use arrears_customers::{CustomerId, CustomerRiskProfile};
use arrears_invoicing::{Invoice, InvoiceId, InvoicePriority};

/// Weights and caps of the 0-100 priority score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub balance: f64,
    pub days_overdue: f64,
    pub risk: f64,
    pub probability: f64,
    /// Balance at which the balance factor saturates.
    pub balance_cap: f64,
    /// Days overdue at which the age factor saturates.
    pub days_cap: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            balance: 40.0,
            days_overdue: 30.0,
            risk: 20.0,
            probability: 10.0,
            balance_cap: 10_000.0,
            days_cap: 30.0,
        }
    }
}

/// One ranked row produced by [`PrioritizationService::prioritize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedInvoice {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub balance: Money,
    pub due_date: DateTime<Utc>,
    pub days_overdue: i64,
    pub risk_score: f64,
    pub score: f64,
    pub priority: InvoicePriority,
    pub collection_probability: f64,
    pub escalate_to_collections: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PrioritizationService {
    weights: ScoringWeights,
}

impl PrioritizationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Priority score in `[0, 100]`.
    ///
    /// `40*min(balance/10k, 1) + 30*min(days/30, 1) + 20*risk + 10*probability`.
    /// The probability term leaves out the large-balance discount of
    /// [`Self::estimate_collection_probability`], so a bigger balance never
    /// lowers the score.
    pub fn score(
        &self,
        invoice: &Invoice,
        profile: &CustomerRiskProfile,
        now: DateTime<Utc>,
    ) -> f64 {
        let w = &self.weights;
        let balance = invoice.current_balance().to_f64();
        let days = invoice.days_overdue(now) as f64;

        let balance_factor = (balance / w.balance_cap).min(1.0);
        let age_factor = (days / w.days_cap).min(1.0);
        let probability = behavioural_probability(invoice, profile, now);

        let score = w.balance * balance_factor
            + w.days_overdue * age_factor
            + w.risk * profile.risk_score
            + w.probability * probability;
        score.clamp(0.0, 100.0)
    }

    /// Likelihood in `[0, 1]` that the open balance is collected.
    pub fn estimate_collection_probability(
        &self,
        invoice: &Invoice,
        profile: &CustomerRiskProfile,
        now: DateTime<Utc>,
    ) -> f64 {
        let mut probability = behavioural_probability(invoice, profile, now);
        let balance = invoice.current_balance().to_f64();
        if balance > 50_000.0 {
            probability *= 0.8;
        } else if balance > 10_000.0 {
            probability *= 0.9;
        }
        probability.clamp(0.0, 1.0)
    }

    /// Whether the invoice should leave the reminder track for collections.
    pub fn should_escalate_to_collections(
        &self,
        invoice: &Invoice,
        profile: &CustomerRiskProfile,
        now: DateTime<Utc>,
    ) -> bool {
        let days = invoice.days_overdue(now);
        invoice.requires_escalation(now)
            || profile.risk_score > 0.8
            || profile.other_overdue_invoices() >= 3
            || (invoice.current_balance().to_f64() >= 5_000.0 && days >= 21)
    }

    pub fn priority_for_score(score: f64) -> InvoicePriority {
        if score >= 75.0 {
            InvoicePriority::Critical
        } else if score >= 50.0 {
            InvoicePriority::High
        } else if score >= 25.0 {
            InvoicePriority::Medium
        } else {
            InvoicePriority::Low
        }
    }

    /// Rank collectible invoices, highest score first.
    ///
    /// Ties go to the larger balance, then to the earlier due date. Invoices
    /// with nothing left to collect are dropped.
    pub fn prioritize<'a, I>(&self, candidates: I, now: DateTime<Utc>) -> Vec<PrioritizedInvoice>
    where
        I: IntoIterator<Item = (&'a Invoice, &'a CustomerRiskProfile)>,
    {
        let mut rows: Vec<PrioritizedInvoice> = candidates
            .into_iter()
            .filter(|(invoice, _)| {
                invoice.status().is_collectible() && invoice.current_balance().is_positive()
            })
            .map(|(invoice, profile)| {
                let score = self.score(invoice, profile, now);
                PrioritizedInvoice {
                    invoice_id: invoice.invoice_id(),
                    customer_id: invoice.customer_id(),
                    balance: invoice.current_balance(),
                    due_date: invoice.due_date(),
                    days_overdue: invoice.days_overdue(now),
                    risk_score: profile.risk_score,
                    score,
                    priority: Self::priority_for_score(score),
                    collection_probability: self
                        .estimate_collection_probability(invoice, profile, now),
                    escalate_to_collections: self
                        .should_escalate_to_collections(invoice, profile, now),
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.balance.amount().cmp(&a.balance.amount()))
                .then_with(|| a.due_date.cmp(&b.due_date))
        });
        rows
    }

    /// Write a ranking result back onto its invoice.
    pub fn apply_priority(invoice: &mut Invoice, row: &PrioritizedInvoice) -> DomainResult<()> {
        invoice.assess(row.risk_score, row.priority)
    }
}

/// Age, payment history and reminder responsiveness, without the balance-size
/// discount.
fn behavioural_probability(
    invoice: &Invoice,
    profile: &CustomerRiskProfile,
    now: DateTime<Utc>,
) -> f64 {
    let days = invoice.days_overdue(now) as f64;
    let mut probability = 0.8 - (days * 0.01).min(0.3);

    if let Some(on_time) = profile.payment_history.on_time_payment_rate() {
        probability = (probability + on_time) / 2.0;
    }
    if invoice.reminder_count() > 0 {
        let response = profile
            .payment_history
            .reminder_response_rate()
            .unwrap_or(0.5);
        probability *= 0.8 + 0.2 * response;
    }
    probability.clamp(0.0, 1.0)
}
