//! Incoming payments: FIFO allocation across a customer's open invoices, then
//! routing each allocated amount through the invoice's campaign.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use arrears_campaigns::{CampaignCommand, CampaignId, CampaignStatus, RecordPayment};
use arrears_core::{AggregateRoot, ExpectedVersion, Money};
use arrears_events::{EventBus, EventEnvelope};
use arrears_invoicing::InvoiceId;
use arrears_payments::{Payment, PaymentAllocation, PaymentAllocationService};

use crate::command_dispatcher::{CampaignCommandDispatcher, DispatchError};
use crate::ports::Ports;

/// What happened to one payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentApplication {
    pub payment: Payment,
    pub allocations: Vec<PaymentAllocation>,
    /// Campaigns whose invoice was paid in full by this payment.
    pub completed_campaigns: Vec<CampaignId>,
    /// Part of the payment no open invoice could absorb.
    pub unallocated: Money,
}

pub struct PaymentApplicationService<B> {
    ports: Ports,
    dispatcher: Arc<CampaignCommandDispatcher<B>>,
    allocator: PaymentAllocationService,
}

impl<B> PaymentApplicationService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(ports: Ports, dispatcher: Arc<CampaignCommandDispatcher<B>>) -> Self {
        Self {
            ports,
            dispatcher,
            allocator: PaymentAllocationService::new(),
        }
    }

    /// Allocate `payment` over the customer's open invoices (oldest due date
    /// first) and persist the result.
    ///
    /// Allocation is planned in full before anything is written. Invoices with
    /// a running campaign are updated through a `RecordPayment` command so
    /// the campaign can resume or complete; the rest are saved directly with
    /// an exact version check. Writes happen per invoice: a failure part way
    /// leaves the earlier invoices updated and is returned to the caller.
    pub fn apply(
        &self,
        mut payment: Payment,
        now: DateTime<Utc>,
    ) -> Result<PaymentApplication, DispatchError> {
        let mut invoices = self
            .ports
            .invoices
            .find_open_by_customer(payment.customer_id())?;
        let loaded: HashMap<InvoiceId, u64> = invoices
            .iter()
            .map(|invoice| (invoice.invoice_id(), invoice.version()))
            .collect();

        let allocations = self.allocator.allocate(&mut payment, &mut invoices, now)?;

        let mut completed_campaigns = Vec::new();
        for allocation in &allocations {
            let campaign = self
                .ports
                .campaigns
                .find_by_invoice(allocation.invoice_id)?
                .filter(|c| !c.is_terminal());

            match campaign {
                Some(campaign) => {
                    let outcome = self.dispatcher.dispatch(CampaignCommand::RecordPayment(
                        RecordPayment {
                            campaign_id: campaign.campaign_id(),
                            amount: allocation.amount,
                            method: payment.method(),
                            reference: payment.reference().map(str::to_string),
                            occurred_at: now,
                        },
                    ))?;
                    if outcome.campaign.status() == CampaignStatus::Completed {
                        completed_campaigns.push(campaign.campaign_id());
                    }
                }
                None => {
                    let Some(invoice) = invoices
                        .iter()
                        .find(|i| i.invoice_id() == allocation.invoice_id)
                    else {
                        continue;
                    };
                    let expected = loaded
                        .get(&allocation.invoice_id)
                        .map_or(ExpectedVersion::NoAggregate, |v| ExpectedVersion::Exact(*v));
                    self.ports.invoices.save(invoice, expected)?;
                }
            }
            debug!(invoice_id = %allocation.invoice_id, amount = %allocation.amount, "payment allocated");
        }

        let unallocated = payment.remaining_amount()?;
        info!(
            payment_id = %payment.id(),
            customer_id = %payment.customer_id(),
            allocations = allocations.len(),
            completed = completed_campaigns.len(),
            %unallocated,
            "payment applied"
        );
        Ok(PaymentApplication {
            payment,
            allocations,
            completed_campaigns,
            unallocated,
        })
    }
}
