use serde::{Deserialize, Serialize};

/// Why a campaign needs attention beyond automated reminders.
///
/// Declaration order is the order reasons are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationReason {
    ReminderLimitReached,
    CustomerNonResponsive,
    HighRiskCustomer,
    LargeAmountOverdue,
    MultipleInvoicesOverdue,
    CollectionProbabilityLow,
    PaymentDisputes,
}

impl EscalationReason {
    pub const ALL: [EscalationReason; 7] = [
        EscalationReason::ReminderLimitReached,
        EscalationReason::CustomerNonResponsive,
        EscalationReason::HighRiskCustomer,
        EscalationReason::LargeAmountOverdue,
        EscalationReason::MultipleInvoicesOverdue,
        EscalationReason::CollectionProbabilityLow,
        EscalationReason::PaymentDisputes,
    ];

    pub fn actions(self) -> &'static [EscalationAction] {
        use EscalationAction::*;
        match self {
            EscalationReason::ReminderLimitReached => &[CollectionsHandoff],
            EscalationReason::CustomerNonResponsive => &[ManagerReview, CollectionsHandoff],
            EscalationReason::HighRiskCustomer => &[CreditHold, ManagerReview],
            EscalationReason::LargeAmountOverdue => &[ManagerReview, PaymentPlanNegotiation],
            EscalationReason::MultipleInvoicesOverdue => {
                &[CreditHold, CustomerRelationshipIntervention]
            }
            EscalationReason::CollectionProbabilityLow => &[CollectionsHandoff, LegalReview],
            EscalationReason::PaymentDisputes => {
                &[ManagerReview, CustomerRelationshipIntervention]
            }
        }
    }

    /// Reasons that end automated reminders and hand the account to collections.
    pub fn is_handoff_reason(self) -> bool {
        matches!(
            self,
            EscalationReason::ReminderLimitReached
                | EscalationReason::CustomerNonResponsive
                | EscalationReason::CollectionProbabilityLow
        )
    }

    /// Reasons that always need a human, whatever the actions.
    pub fn requires_manual_intervention(self) -> bool {
        matches!(
            self,
            EscalationReason::PaymentDisputes
                | EscalationReason::HighRiskCustomer
                | EscalationReason::LargeAmountOverdue
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            EscalationReason::ReminderLimitReached => "reminder limit reached",
            EscalationReason::CustomerNonResponsive => "customer non-responsive",
            EscalationReason::HighRiskCustomer => "high-risk customer",
            EscalationReason::LargeAmountOverdue => "large amount overdue",
            EscalationReason::MultipleInvoicesOverdue => "multiple invoices overdue",
            EscalationReason::CollectionProbabilityLow => "collection probability low",
            EscalationReason::PaymentDisputes => "payment disputes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    CollectionsHandoff,
    ManagerReview,
    LegalReview,
    CreditHold,
    CustomerRelationshipIntervention,
    PaymentPlanNegotiation,
}

impl EscalationAction {
    pub fn requires_manual_intervention(self) -> bool {
        matches!(
            self,
            EscalationAction::LegalReview
                | EscalationAction::CustomerRelationshipIntervention
                | EscalationAction::PaymentPlanNegotiation
        )
    }
}
