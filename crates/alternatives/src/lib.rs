//! Alternative payment offers for customers who cannot settle an invoice in
//! full: installment plans, settlement discounts, early-payment incentives,
//! hardship plans and other payment methods.

pub mod option;
pub mod profile;
pub mod service;

pub use option::{AlternativeOptionType, AlternativePaymentOption, OptionId, OptionStatus, OptionTerms};
pub use profile::{CustomerPaymentProfile, HardshipDeclaration};
pub use service::{AlternativePaymentService, ScoredOption, StrategyRecommendation};
