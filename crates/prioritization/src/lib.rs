//! Ranking of overdue invoices for collection work.
//!
//! Pure scoring over an invoice and its customer's risk profile; no IO.

pub mod service;

pub use service::{PrioritizationService, PrioritizedInvoice, ScoringWeights};
