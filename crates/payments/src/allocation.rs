//! FIFO allocation of a payment across a customer's open invoices.

use chrono::{DateTime, Utc};

use arrears_core::{AggregateRoot, DomainError, DomainResult};
use arrears_invoicing::Invoice;

use crate::payment::{Payment, PaymentAllocation};

/// Spreads one payment over open invoices, oldest due date first.
///
/// Stateless; holds no ports so it can be shared freely.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaymentAllocationService;

impl PaymentAllocationService {
    pub fn new() -> Self {
        Self
    }

    /// Allocate `payment` across `invoices`.
    ///
    /// Invoices are visited by due date, then issue date, then id. Each open
    /// invoice receives `min(remaining, balance)` until the payment is used up
    /// or the invoices run out. Invoices that cannot take payments (paid,
    /// cancelled) are skipped.
    ///
    /// The whole run is planned on copies first. If any step fails, neither
    /// the payment nor any invoice is modified.
    pub fn allocate(
        &self,
        payment: &mut Payment,
        invoices: &mut [Invoice],
        allocated_at: DateTime<Utc>,
    ) -> DomainResult<Vec<PaymentAllocation>> {
        if invoices.is_empty() {
            return Err(DomainError::validation(
                "no invoices supplied for payment allocation",
            ));
        }
        for invoice in invoices.iter() {
            if invoice.customer_id() != payment.customer_id() {
                return Err(DomainError::validation(format!(
                    "invoice {} does not belong to the paying customer",
                    invoice.invoice_number()
                )));
            }
        }

        let mut order: Vec<usize> = (0..invoices.len()).collect();
        order.sort_by(|&a, &b| {
            let (x, y) = (&invoices[a], &invoices[b]);
            x.due_date()
                .cmp(&y.due_date())
                .then_with(|| x.issue_date().cmp(&y.issue_date()))
                .then_with(|| x.id().cmp(y.id()))
        });

        let mut planned_payment = payment.clone();
        let mut planned: Vec<(usize, Invoice)> = Vec::new();
        let mut allocations = Vec::new();

        for idx in order {
            let remaining = planned_payment.remaining_amount()?;
            if remaining.is_zero() {
                break;
            }
            let invoice = &invoices[idx];
            if !invoice.can_accept_payment() {
                continue;
            }
            remaining.ensure_same_currency(&invoice.current_balance())?;

            let amount = remaining.min(&invoice.current_balance())?;
            let mut updated = invoice.clone();
            updated.record_payment(
                amount,
                planned_payment.method(),
                planned_payment.reference().map(str::to_string),
                allocated_at,
            )?;
            planned_payment.add_allocation(updated.invoice_id(), amount, allocated_at)?;
            allocations.push(PaymentAllocation {
                invoice_id: updated.invoice_id(),
                amount,
                allocated_at,
            });
            planned.push((idx, updated));
        }

        for (idx, updated) in planned {
            invoices[idx] = updated;
        }
        *payment = planned_payment;
        Ok(allocations)
    }
}
