//! Ports: the collaborators the collection engine talks to.
//!
//! Repositories and the risk provider are synchronous lookups. Email
//! generation, reminder delivery, collections handoff and notifications are
//! network-bound and async; callers wrap them in [`crate::timeout::with_timeout`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use arrears_alternatives::CustomerPaymentProfile;
use arrears_campaigns::{CampaignId, PaymentCampaign, ReminderId, ReminderTone};
use arrears_core::{ExpectedVersion, Money};
use arrears_customers::{CustomerId, CustomerRiskProfile};
use arrears_escalation::{EscalationAction, EscalationReason};
use arrears_invoicing::{Invoice, InvoiceId, ReminderLevel};

/// Persistence failure reported by a repository adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// Optimistic concurrency check failed.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure of an async port call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

pub trait InvoiceRepository: Send + Sync {
    fn find_by_id(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError>;

    /// Overdue (or partially paid past due) invoices with an open balance.
    fn find_overdue(
        &self,
        customer_id: Option<CustomerId>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, RepositoryError>;

    /// Invoices of the customer that can still take a payment.
    fn find_open_by_customer(&self, customer_id: CustomerId)
    -> Result<Vec<Invoice>, RepositoryError>;

    /// Pending or partially paid invoices whose due date has passed.
    fn find_due_for_overdue_check(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, RepositoryError>;

    fn save(&self, invoice: &Invoice, expected: ExpectedVersion) -> Result<(), RepositoryError>;
}

pub trait CampaignRepository: Send + Sync {
    fn find_by_id(&self, id: CampaignId) -> Result<Option<PaymentCampaign>, RepositoryError>;

    /// The newest campaign for the invoice, whatever its status.
    fn find_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<PaymentCampaign>, RepositoryError>;

    /// Active or paused campaigns of one customer.
    fn find_active_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<PaymentCampaign>, RepositoryError>;

    /// Every active or paused campaign.
    fn find_active(&self) -> Result<Vec<PaymentCampaign>, RepositoryError>;

    fn find_escalated(&self) -> Result<Vec<PaymentCampaign>, RepositoryError>;

    fn save(
        &self,
        campaign: &PaymentCampaign,
        expected: ExpectedVersion,
    ) -> Result<(), RepositoryError>;
}

pub trait CustomerRiskProvider: Send + Sync {
    /// Falls back to a neutral profile for unknown customers.
    fn risk_profile(&self, customer_id: CustomerId) -> CustomerRiskProfile;

    fn payment_profile(&self, customer_id: CustomerId) -> Option<CustomerPaymentProfile>;
}

/// Everything a template needs to word a reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailContext {
    pub campaign_id: CampaignId,
    pub reminder_id: ReminderId,
    pub customer_id: CustomerId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub level: ReminderLevel,
    pub tone: ReminderTone,
    pub original_amount: Money,
    pub outstanding_balance: Money,
    pub due_date: DateTime<Utc>,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// A rendered reminder ready for the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundReminder {
    pub reminder_id: ReminderId,
    pub customer_id: CustomerId,
    pub invoice_id: InvoiceId,
    pub level: ReminderLevel,
    pub email: RenderedEmail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub reminder_id: ReminderId,
    /// Provider message id.
    pub message_id: String,
    /// The channel had already accepted this reminder id.
    pub duplicate: bool,
}

#[async_trait::async_trait]
pub trait EmailTemplateGenerator: Send + Sync {
    async fn render(&self, context: &EmailContext) -> Result<RenderedEmail, PortError>;
}

/// Delivery channel for reminders. Must be idempotent by reminder id.
#[async_trait::async_trait]
pub trait ReminderChannel: Send + Sync {
    async fn deliver(&self, reminder: &OutboundReminder) -> Result<DeliveryReceipt, PortError>;
}

#[async_trait::async_trait]
pub trait CollectionsHandoffService: Send + Sync {
    /// Open a collections case; returns the case id.
    async fn create_case(
        &self,
        campaign: &PaymentCampaign,
        reason: &str,
    ) -> Result<String, PortError>;

    async fn transfer_data(
        &self,
        campaign: &PaymentCampaign,
        case_id: &str,
    ) -> Result<bool, PortError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    CampaignEscalated {
        campaign_id: CampaignId,
        invoice_id: InvoiceId,
        reason: String,
        case_id: Option<String>,
    },
    ManagerReview {
        campaign_id: CampaignId,
        invoice_id: InvoiceId,
        reasons: Vec<EscalationReason>,
        actions: Vec<EscalationAction>,
        next_review_at: DateTime<Utc>,
    },
}

/// Fire-and-forget notifications; failures are logged, never retried.
#[async_trait::async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), PortError>;
}

/// Collaborators shared by the application services.
#[derive(Clone)]
pub struct Ports {
    pub invoices: Arc<dyn InvoiceRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub customers: Arc<dyn CustomerRiskProvider>,
    pub templates: Arc<dyn EmailTemplateGenerator>,
    pub channel: Arc<dyn ReminderChannel>,
    pub handoff: Arc<dyn CollectionsHandoffService>,
    pub notifications: Arc<dyn NotificationService>,
}
