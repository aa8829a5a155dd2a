//! Customer-side inputs to collection decisions.
//!
//! Customer master data is owned elsewhere; collections only needs the risk
//! view (score + payment behaviour) supplied by a `CustomerRiskProvider`.

pub mod risk;

pub use risk::{CustomerId, CustomerRiskProfile, PaymentHistory, RiskTier};
