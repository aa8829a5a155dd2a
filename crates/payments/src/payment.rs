use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arrears_core::{DomainError, DomainResult, Money};
use arrears_customers::CustomerId;
use arrears_invoicing::{InvoiceId, PaymentMethod};

arrears_core::uuid_id!(
    /// Payment identifier.
    PaymentId,
    "PaymentId"
);

/// Part of a payment applied to one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub allocated_at: DateTime<Utc>,
}

/// A payment received from a customer.
///
/// Invariant: the allocations never add up to more than `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    customer_id: CustomerId,
    amount: Money,
    payment_date: DateTime<Utc>,
    method: PaymentMethod,
    reference: Option<String>,
    allocations: Vec<PaymentAllocation>,
}

impl Payment {
    pub fn new(
        id: PaymentId,
        customer_id: CustomerId,
        amount: Money,
        payment_date: DateTime<Utc>,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> DomainResult<Self> {
        if !amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        Ok(Self {
            id,
            customer_id,
            amount,
            payment_date,
            method,
            reference,
            allocations: Vec::new(),
        })
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn payment_date(&self) -> DateTime<Utc> {
        self.payment_date
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn allocations(&self) -> &[PaymentAllocation] {
        &self.allocations
    }

    pub fn allocated_amount(&self) -> DomainResult<Money> {
        self.allocations
            .iter()
            .try_fold(Money::zero(self.amount.currency()), |acc, a| {
                acc.checked_add(&a.amount)
            })
    }

    pub fn remaining_amount(&self) -> DomainResult<Money> {
        self.amount.checked_sub(&self.allocated_amount()?)
    }

    pub fn is_fully_allocated(&self) -> DomainResult<bool> {
        Ok(self.remaining_amount()?.is_zero())
    }

    /// Record that `amount` of this payment went to `invoice_id`.
    pub fn add_allocation(
        &mut self,
        invoice_id: InvoiceId,
        amount: Money,
        allocated_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !amount.is_positive() {
            return Err(DomainError::validation("allocation amount must be positive"));
        }
        self.amount.ensure_same_currency(&amount)?;
        let remaining = self.remaining_amount()?;
        if amount.compare(&remaining)?.is_gt() {
            return Err(DomainError::validation(format!(
                "allocation {amount} exceeds remaining payment amount {remaining}"
            )));
        }
        self.allocations.push(PaymentAllocation {
            invoice_id,
            amount,
            allocated_at,
        });
        Ok(())
    }
}
