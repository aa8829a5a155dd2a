//! Invoicing domain module (collections view).
//!
//! Invoices are created by the billing subsystem; this crate models the part of
//! their lifecycle collections cares about: balance, payments, reminder level,
//! escalation and the status transition table. Pure domain logic, no IO.

pub mod invoice;
pub mod status;

pub use invoice::{Invoice, InvoiceId, InvoiceLine, InvoicePayment, NewInvoice, PaymentMethod};
pub use status::{InvoicePriority, InvoiceStatus, ReminderLevel};
