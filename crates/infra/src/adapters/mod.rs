//! In-process adapters for every port.
//!
//! Used by tests and by the single-process `arrears-sweep` binary.

mod customers;
mod email;
mod outbox;
mod repository;

use std::sync::Arc;

pub use customers::InMemoryCustomerDirectory;
pub use email::FallbackTemplateGenerator;
pub use outbox::{
    HandoffCase, InMemoryCollectionsHandoff, OutboxReminderChannel, TracingNotificationService,
};
pub use repository::{InMemoryCampaignRepository, InMemoryInvoiceRepository};

use crate::ports::Ports;

/// Concrete in-memory adapters, kept typed so callers can seed and inspect
/// them after wiring [`Ports`].
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    pub invoices: Arc<InMemoryInvoiceRepository>,
    pub campaigns: Arc<InMemoryCampaignRepository>,
    pub customers: Arc<InMemoryCustomerDirectory>,
    pub templates: Arc<FallbackTemplateGenerator>,
    pub channel: Arc<OutboxReminderChannel>,
    pub handoff: Arc<InMemoryCollectionsHandoff>,
    pub notifications: Arc<TracingNotificationService>,
}

impl InMemoryBackend {
    pub fn new(sender_name: impl Into<String>) -> Self {
        Self {
            invoices: Arc::new(InMemoryInvoiceRepository::new()),
            campaigns: Arc::new(InMemoryCampaignRepository::new()),
            customers: Arc::new(InMemoryCustomerDirectory::new()),
            templates: Arc::new(FallbackTemplateGenerator::new(sender_name)),
            channel: Arc::new(OutboxReminderChannel::new()),
            handoff: Arc::new(InMemoryCollectionsHandoff::new()),
            notifications: Arc::new(TracingNotificationService),
        }
    }

    pub fn ports(&self) -> Ports {
        Ports {
            invoices: self.invoices.clone(),
            campaigns: self.campaigns.clone(),
            customers: self.customers.clone(),
            templates: self.templates.clone(),
            channel: self.channel.clone(),
            handoff: self.handoff.clone(),
            notifications: self.notifications.clone(),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new("")
    }
}
