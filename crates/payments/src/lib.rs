//! Incoming payments and how they are spread over open invoices.

pub mod allocation;
pub mod payment;

pub use allocation::PaymentAllocationService;
pub use payment::{Payment, PaymentAllocation, PaymentId};
