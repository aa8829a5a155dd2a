use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use arrears_campaigns::{CampaignId, PaymentCampaign};
use arrears_core::{AggregateRoot, ExpectedVersion};
use arrears_customers::CustomerId;
use arrears_invoicing::{Invoice, InvoiceId, InvoiceStatus};

use crate::ports::{CampaignRepository, InvoiceRepository, RepositoryError};

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".to_string())
}

fn check_version(
    expected: ExpectedVersion,
    actual: Option<u64>,
    what: impl std::fmt::Display,
) -> Result<(), RepositoryError> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(RepositoryError::Conflict(format!(
            "{what}: expected {expected:?}, found {actual:?}"
        )))
    }
}

/// In-memory invoice store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    invoices: RwLock<HashMap<InvoiceId, Invoice>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an invoice without a version check.
    pub fn insert(&self, invoice: Invoice) -> Result<(), RepositoryError> {
        let mut invoices = self.invoices.write().map_err(|_| poisoned())?;
        invoices.insert(invoice.invoice_id(), invoice);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.invoices.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(
        &self,
        predicate: impl Fn(&Invoice) -> bool,
    ) -> Result<Vec<Invoice>, RepositoryError> {
        let invoices = self.invoices.read().map_err(|_| poisoned())?;
        let mut found: Vec<Invoice> = invoices.values().filter(|i| predicate(i)).cloned().collect();
        found.sort_by(|a, b| {
            a.due_date()
                .cmp(&b.due_date())
                .then_with(|| a.invoice_id().cmp(&b.invoice_id()))
        });
        Ok(found)
    }
}

impl InvoiceRepository for InMemoryInvoiceRepository {
    fn find_by_id(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let invoices = self.invoices.read().map_err(|_| poisoned())?;
        Ok(invoices.get(&id).cloned())
    }

    fn find_overdue(
        &self,
        customer_id: Option<CustomerId>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, RepositoryError> {
        self.select(|invoice| {
            let overdue = match invoice.status() {
                InvoiceStatus::Overdue => true,
                InvoiceStatus::PartiallyPaid => invoice.is_past_due(as_of),
                _ => false,
            };
            overdue
                && invoice.current_balance().is_positive()
                && customer_id.is_none_or(|c| c == invoice.customer_id())
        })
    }

    fn find_open_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Invoice>, RepositoryError> {
        self.select(|invoice| invoice.customer_id() == customer_id && invoice.can_accept_payment())
    }

    fn find_due_for_overdue_check(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, RepositoryError> {
        self.select(|invoice| {
            matches!(
                invoice.status(),
                InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid
            ) && invoice.is_past_due(as_of)
        })
    }

    fn save(&self, invoice: &Invoice, expected: ExpectedVersion) -> Result<(), RepositoryError> {
        let mut invoices = self.invoices.write().map_err(|_| poisoned())?;
        let current = invoices.get(&invoice.invoice_id()).map(|i| i.version());
        check_version(expected, current, format_args!("invoice {}", invoice.invoice_id()))?;
        invoices.insert(invoice.invoice_id(), invoice.clone());
        Ok(())
    }
}

/// In-memory campaign store keyed by campaign id.
#[derive(Debug, Default)]
pub struct InMemoryCampaignRepository {
    campaigns: RwLock<HashMap<CampaignId, PaymentCampaign>>,
}

impl InMemoryCampaignRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Result<Vec<PaymentCampaign>, RepositoryError> {
        self.select(|_| true)
    }

    fn select(
        &self,
        predicate: impl Fn(&PaymentCampaign) -> bool,
    ) -> Result<Vec<PaymentCampaign>, RepositoryError> {
        let campaigns = self.campaigns.read().map_err(|_| poisoned())?;
        let mut found: Vec<PaymentCampaign> =
            campaigns.values().filter(|c| predicate(c)).cloned().collect();
        found.sort_by_key(|c| c.campaign_id());
        Ok(found)
    }
}

impl CampaignRepository for InMemoryCampaignRepository {
    fn find_by_id(&self, id: CampaignId) -> Result<Option<PaymentCampaign>, RepositoryError> {
        let campaigns = self.campaigns.read().map_err(|_| poisoned())?;
        Ok(campaigns.get(&id).cloned())
    }

    fn find_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<PaymentCampaign>, RepositoryError> {
        // Campaign ids are time-ordered, so the largest is the newest.
        Ok(self
            .select(|c| c.invoice_id() == Some(invoice_id))?
            .into_iter()
            .next_back())
    }

    fn find_active_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<PaymentCampaign>, RepositoryError> {
        self.select(|c| !c.is_terminal() && c.customer_id() == Some(customer_id))
    }

    fn find_active(&self) -> Result<Vec<PaymentCampaign>, RepositoryError> {
        self.select(|c| c.is_started() && !c.is_terminal())
    }

    fn find_escalated(&self) -> Result<Vec<PaymentCampaign>, RepositoryError> {
        self.select(|c| c.escalation_triggered())
    }

    fn save(
        &self,
        campaign: &PaymentCampaign,
        expected: ExpectedVersion,
    ) -> Result<(), RepositoryError> {
        let mut campaigns = self.campaigns.write().map_err(|_| poisoned())?;
        let current = campaigns.get(&campaign.campaign_id()).map(|c| c.version());
        check_version(expected, current, format_args!("campaign {}", campaign.campaign_id()))?;
        campaigns.insert(campaign.campaign_id(), campaign.clone());
        Ok(())
    }
}
