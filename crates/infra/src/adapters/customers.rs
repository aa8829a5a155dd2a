use std::collections::HashMap;
use std::sync::RwLock;

use arrears_alternatives::CustomerPaymentProfile;
use arrears_customers::{CustomerId, CustomerRiskProfile};

use crate::ports::CustomerRiskProvider;

/// Customer risk and payment profiles held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCustomerDirectory {
    risk: RwLock<HashMap<CustomerId, CustomerRiskProfile>>,
    payment: RwLock<HashMap<CustomerId, CustomerPaymentProfile>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_risk(&self, profile: CustomerRiskProfile) {
        if let Ok(mut risk) = self.risk.write() {
            risk.insert(profile.customer_id, profile);
        }
    }

    pub fn upsert_payment(&self, profile: CustomerPaymentProfile) {
        if let Ok(mut payment) = self.payment.write() {
            payment.insert(profile.customer_id, profile);
        }
    }
}

impl CustomerRiskProvider for InMemoryCustomerDirectory {
    fn risk_profile(&self, customer_id: CustomerId) -> CustomerRiskProfile {
        self.risk
            .read()
            .ok()
            .and_then(|risk| risk.get(&customer_id).cloned())
            .unwrap_or_else(|| CustomerRiskProfile::neutral(customer_id))
    }

    fn payment_profile(&self, customer_id: CustomerId) -> Option<CustomerPaymentProfile> {
        self.payment
            .read()
            .ok()
            .and_then(|payment| payment.get(&customer_id).cloned())
    }
}
