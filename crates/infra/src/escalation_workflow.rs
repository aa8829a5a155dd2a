//! Periodic escalation review of a running campaign.
//!
//! The decision itself is pure ([`EscalationService::evaluate`]); this module
//! loads the inputs, escalates the campaign when the decision calls for a
//! hand-off, opens the collections case and sends notifications. The case id
//! is recorded on the campaign; an escalated campaign without one is picked
//! up again by [`EscalationWorkflow::retry_handoff`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use arrears_campaigns::{
    CampaignCommand, CampaignId, CampaignStatus, EscalateCampaign, PaymentCampaign,
    RecordCollectionsCase,
};
use arrears_escalation::{EscalationContext, EscalationDecision, EscalationService};
use arrears_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CampaignCommandDispatcher, DispatchError};
use crate::ports::{Notification, Ports};
use crate::timeout::with_timeout;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// Campaign is not active (paused campaigns are already under review).
    Skipped,
    NoAction,
    /// Reasons found, but none that ends the reminder sequence.
    ReviewRequested,
    HandedOff {
        reason: String,
        /// `None` when the collections system could not be reached; the
        /// campaign is escalated regardless and the sweep retries the case.
        case_id: Option<String>,
        data_transferred: bool,
    },
}

/// Result of [`EscalationWorkflow::retry_handoff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandoffRetry {
    NotNeeded,
    /// Collections is still unreachable; the next sweep tries again.
    StillPending,
    Completed {
        case_id: String,
        data_transferred: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationReview {
    pub campaign_id: CampaignId,
    pub decision: Option<EscalationDecision>,
    pub outcome: EscalationOutcome,
}

pub struct EscalationWorkflow<B> {
    ports: Ports,
    dispatcher: Arc<CampaignCommandDispatcher<B>>,
    service: EscalationService,
    io_timeout: Duration,
}

impl<B> EscalationWorkflow<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        ports: Ports,
        dispatcher: Arc<CampaignCommandDispatcher<B>>,
        service: EscalationService,
        io_timeout: Duration,
    ) -> Self {
        Self {
            ports,
            dispatcher,
            service,
            io_timeout,
        }
    }

    pub fn service(&self) -> &EscalationService {
        &self.service
    }

    /// Evaluate one campaign at `now` and act on the decision.
    pub async fn review(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<EscalationReview, DispatchError> {
        let campaign = self
            .ports
            .campaigns
            .find_by_id(campaign_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("campaign {campaign_id}")))?;
        if !campaign.is_started() || campaign.status() != CampaignStatus::Active {
            return Ok(EscalationReview {
                campaign_id,
                decision: None,
                outcome: EscalationOutcome::Skipped,
            });
        }

        let active_for_customer = match campaign.customer_id() {
            Some(customer_id) => self
                .ports
                .campaigns
                .find_active_by_customer(customer_id)?
                .len(),
            None => 0,
        };
        let context = EscalationContext::from_campaign(&campaign, active_for_customer, now)?;
        let decision = self.service.evaluate(&context);

        let outcome = if decision.should_hand_off() {
            self.hand_off(&campaign, &decision, now).await?
        } else if !decision.is_clear() {
            self.notify(Notification::ManagerReview {
                campaign_id,
                invoice_id: context.invoice_id,
                reasons: decision.reasons.clone(),
                actions: decision.actions.clone(),
                next_review_at: decision.next_review_at,
            })
            .await;
            EscalationOutcome::ReviewRequested
        } else {
            EscalationOutcome::NoAction
        };

        debug!(%campaign_id, reasons = ?decision.reasons, ?outcome, "escalation reviewed");
        Ok(EscalationReview {
            campaign_id,
            decision: Some(decision),
            outcome,
        })
    }

    async fn hand_off(
        &self,
        campaign: &PaymentCampaign,
        decision: &EscalationDecision,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome, DispatchError> {
        let campaign_id = campaign.campaign_id();
        let reason = decision
            .handoff_reason()
            .unwrap_or_else(|| "escalation review".to_string());

        let escalated = self
            .dispatcher
            .dispatch(CampaignCommand::EscalateCampaign(EscalateCampaign {
                campaign_id,
                reason: reason.clone(),
                occurred_at: now,
            }))?
            .campaign;

        let (case_id, data_transferred) = self.open_case(&escalated, &reason, now).await;
        info!(%campaign_id, reason = %reason, case_id = ?case_id, "campaign handed off to collections");

        if let Some(invoice_id) = escalated.invoice_id() {
            self.notify(Notification::CampaignEscalated {
                campaign_id,
                invoice_id,
                reason: reason.clone(),
                case_id: case_id.clone(),
            })
            .await;
        }

        Ok(EscalationOutcome::HandedOff {
            reason,
            case_id,
            data_transferred,
        })
    }

    /// Finish the collections side of an earlier hand-off: open the missing
    /// case, or resend the case data that did not arrive.
    pub async fn retry_handoff(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<HandoffRetry, DispatchError> {
        let campaign = self
            .ports
            .campaigns
            .find_by_id(campaign_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("campaign {campaign_id}")))?;
        if !campaign.awaits_collections_case() {
            return Ok(HandoffRetry::NotNeeded);
        }

        let had_case = campaign.collections_case_id().is_some();
        let reason = campaign
            .escalation_reason()
            .unwrap_or("escalation review")
            .to_string();
        let (case_id, data_transferred) = self.open_case(&campaign, &reason, now).await;
        let Some(case_id) = case_id.filter(|_| data_transferred || !had_case) else {
            return Ok(HandoffRetry::StillPending);
        };
        info!(%campaign_id, case_id = %case_id, data_transferred, "collections hand-off retried");

        if !had_case {
            if let Some(invoice_id) = campaign.invoice_id() {
                self.notify(Notification::CampaignEscalated {
                    campaign_id,
                    invoice_id,
                    reason,
                    case_id: Some(case_id.clone()),
                })
                .await;
            }
        }
        Ok(HandoffRetry::Completed {
            case_id,
            data_transferred,
        })
    }

    /// Open (or reuse) the collections case, push the campaign data and
    /// record the result on the campaign. Port failures leave the campaign
    /// waiting for [`Self::retry_handoff`].
    async fn open_case(
        &self,
        campaign: &PaymentCampaign,
        reason: &str,
        now: DateTime<Utc>,
    ) -> (Option<String>, bool) {
        let campaign_id = campaign.campaign_id();
        let case_id = match campaign.collections_case_id() {
            Some(existing) => existing.to_string(),
            None => match with_timeout(
                self.io_timeout,
                "collections handoff",
                self.ports.handoff.create_case(campaign, reason),
            )
            .await
            {
                Ok(case_id) => case_id,
                Err(err) => {
                    warn!(%campaign_id, error = %err, "collections hand-off failed");
                    return (None, false);
                }
            },
        };

        let transferred = match with_timeout(
            self.io_timeout,
            "collections handoff",
            self.ports.handoff.transfer_data(campaign, &case_id),
        )
        .await
        {
            Ok(transferred) => transferred,
            Err(err) => {
                warn!(%campaign_id, case_id = %case_id, error = %err, "case data transfer failed");
                false
            }
        };

        let changed = campaign.collections_case_id().is_none()
            || (transferred && !campaign.case_data_transferred());
        if changed {
            let recorded = self
                .dispatcher
                .dispatch(CampaignCommand::RecordCollectionsCase(RecordCollectionsCase {
                    campaign_id,
                    case_id: case_id.clone(),
                    data_transferred: transferred,
                    occurred_at: now,
                }));
            if let Err(err) = recorded {
                warn!(%campaign_id, case_id = %case_id, error = %err, "collections case not recorded on campaign");
            }
        }
        (Some(case_id), transferred)
    }

    /// Failures are logged and dropped.
    async fn notify(&self, notification: Notification) {
        let result = with_timeout(
            self.io_timeout,
            "notification service",
            self.ports.notifications.notify(notification),
        )
        .await;
        if let Err(err) = result {
            warn!(error = %err, "notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryBackend, InMemoryCollectionsHandoff};
    use crate::ports::{CampaignRepository, CollectionsHandoffService, PortError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use arrears_campaigns::{CampaignSettings, StartCampaign};
    use arrears_core::{Currency, Money};
    use arrears_customers::CustomerId;
    use arrears_escalation::EscalationReason;
    use arrears_events::InMemoryEventBus;
    use arrears_invoicing::{Invoice, InvoiceId, NewInvoice};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    struct OfflineHandoff;

    #[async_trait::async_trait]
    impl CollectionsHandoffService for OfflineHandoff {
        async fn create_case(&self, _: &PaymentCampaign, _: &str) -> Result<String, PortError> {
            Err(PortError::Unavailable("collections".to_string()))
        }

        async fn transfer_data(&self, _: &PaymentCampaign, _: &str) -> Result<bool, PortError> {
            Ok(false)
        }
    }

    /// Times out on the first `create_case`, then behaves.
    struct FlakyHandoff {
        inner: Arc<InMemoryCollectionsHandoff>,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl CollectionsHandoffService for FlakyHandoff {
        async fn create_case(&self, campaign: &PaymentCampaign, reason: &str) -> Result<String, PortError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PortError::Timeout("collections handoff".to_string()));
            }
            self.inner.create_case(campaign, reason).await
        }

        async fn transfer_data(&self, campaign: &PaymentCampaign, case_id: &str) -> Result<bool, PortError> {
            self.inner.transfer_data(campaign, case_id).await
        }
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()
    }

    fn start(
        backend: &InMemoryBackend,
        amount: Decimal,
        started_at: DateTime<Utc>,
    ) -> (CampaignId, Arc<CampaignCommandDispatcher<Bus>>) {
        let ports = backend.ports();
        let dispatcher = Arc::new(CampaignCommandDispatcher::new(
            ports.campaigns.clone(),
            ports.invoices.clone(),
            Arc::new(InMemoryEventBus::new()),
        ));
        let due = started_at - ChronoDuration::days(2);
        let mut invoice = Invoice::issue(NewInvoice {
            id: InvoiceId::new(),
            customer_id: CustomerId::new(),
            invoice_number: "INV-31".to_string(),
            amount: Money::new(amount, Currency::usd()).unwrap(),
            issue_date: due - ChronoDuration::days(30),
            due_date: due,
            lines: vec![],
        })
        .unwrap();
        invoice.mark_overdue(started_at).unwrap();
        let campaign_id = CampaignId::new();
        dispatcher
            .dispatch(CampaignCommand::StartCampaign(StartCampaign {
                campaign_id,
                invoice,
                settings: CampaignSettings::default(),
                occurred_at: started_at,
            }))
            .unwrap();
        (campaign_id, dispatcher)
    }

    fn workflow(ports: Ports, dispatcher: Arc<CampaignCommandDispatcher<Bus>>) -> EscalationWorkflow<Bus> {
        EscalationWorkflow::new(
            ports,
            dispatcher,
            EscalationService::new(),
            std::time::Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn fresh_small_campaign_needs_nothing() {
        let backend = InMemoryBackend::default();
        let (campaign_id, dispatcher) = start(&backend, dec!(400), test_time());

        let review = workflow(backend.ports(), dispatcher)
            .review(campaign_id, test_time())
            .await
            .unwrap();

        assert_eq!(review.outcome, EscalationOutcome::NoAction);
        assert!(backend.handoff.cases().is_empty());
    }

    #[tokio::test]
    async fn large_balance_requests_review_without_hand_off() {
        let backend = InMemoryBackend::default();
        let (campaign_id, dispatcher) = start(&backend, dec!(7500), test_time());

        let review = workflow(backend.ports(), dispatcher)
            .review(campaign_id, test_time())
            .await
            .unwrap();

        assert_eq!(review.outcome, EscalationOutcome::ReviewRequested);
        let decision = review.decision.unwrap();
        assert!(decision.has_reason(EscalationReason::LargeAmountOverdue));
        let campaign = backend.campaigns.find_by_id(campaign_id).unwrap().unwrap();
        assert_eq!(campaign.status(), CampaignStatus::Active);
    }

    #[tokio::test]
    async fn low_probability_hands_off_and_opens_case() {
        let backend = InMemoryBackend::default();
        let started_at = test_time() - ChronoDuration::days(45);
        let (campaign_id, dispatcher) = start(&backend, dec!(900), started_at);

        let review = workflow(backend.ports(), dispatcher)
            .review(campaign_id, test_time())
            .await
            .unwrap();

        let EscalationOutcome::HandedOff { case_id, data_transferred, .. } = review.outcome else {
            panic!("expected hand-off, got {:?}", review.outcome);
        };
        assert_eq!(case_id.as_deref(), Some("CASE-000001"));
        assert!(data_transferred);
        let campaign = backend.campaigns.find_by_id(campaign_id).unwrap().unwrap();
        assert_eq!(campaign.status(), CampaignStatus::Escalated);
        assert!(backend.handoff.cases()[0].data_transferred);
    }

    #[tokio::test]
    async fn unreachable_collections_still_escalates() {
        let backend = InMemoryBackend::default();
        let started_at = test_time() - ChronoDuration::days(45);
        let (campaign_id, dispatcher) = start(&backend, dec!(900), started_at);
        let mut ports = backend.ports();
        ports.handoff = Arc::new(OfflineHandoff);

        let review = workflow(ports, dispatcher)
            .review(campaign_id, test_time())
            .await
            .unwrap();

        assert!(matches!(
            review.outcome,
            EscalationOutcome::HandedOff { case_id: None, data_transferred: false, .. }
        ));
        let campaign = backend.campaigns.find_by_id(campaign_id).unwrap().unwrap();
        assert!(campaign.escalation_triggered());
    }

    #[tokio::test]
    async fn terminal_campaign_is_skipped() {
        let backend = InMemoryBackend::default();
        let started_at = test_time() - ChronoDuration::days(45);
        let (campaign_id, dispatcher) = start(&backend, dec!(900), started_at);
        let workflow = workflow(backend.ports(), dispatcher);
        workflow.review(campaign_id, test_time()).await.unwrap();

        let second = workflow.review(campaign_id, test_time()).await.unwrap();
        assert_eq!(second.outcome, EscalationOutcome::Skipped);
        assert_eq!(backend.handoff.cases().len(), 1);
    }

    #[tokio::test]
    async fn failed_hand_off_is_completed_on_retry() {
        let backend = InMemoryBackend::default();
        let started_at = test_time() - ChronoDuration::days(45);
        let (campaign_id, dispatcher) = start(&backend, dec!(900), started_at);
        let mut ports = backend.ports();
        ports.handoff = Arc::new(FlakyHandoff {
            inner: backend.handoff.clone(),
            calls: AtomicU32::new(0),
        });
        let workflow = workflow(ports, dispatcher);

        let review = workflow.review(campaign_id, test_time()).await.unwrap();
        assert!(matches!(review.outcome, EscalationOutcome::HandedOff { case_id: None, .. }));
        let pending = backend.campaigns.find_by_id(campaign_id).unwrap().unwrap();
        assert_eq!(pending.status(), CampaignStatus::Escalated);
        assert!(pending.awaits_collections_case());
        assert!(backend.handoff.cases().is_empty());

        let retry = workflow
            .retry_handoff(campaign_id, test_time() + ChronoDuration::days(1))
            .await
            .unwrap();
        assert_eq!(
            retry,
            HandoffRetry::Completed {
                case_id: "CASE-000001".to_string(),
                data_transferred: true,
            }
        );
        let done = backend.campaigns.find_by_id(campaign_id).unwrap().unwrap();
        assert_eq!(done.collections_case_id(), Some("CASE-000001"));
        assert!(!done.awaits_collections_case());
        assert!(backend.handoff.cases()[0].data_transferred);

        let again = workflow
            .retry_handoff(campaign_id, test_time() + ChronoDuration::days(2))
            .await
            .unwrap();
        assert_eq!(again, HandoffRetry::NotNeeded);
        assert_eq!(backend.handoff.cases().len(), 1);
    }
}
