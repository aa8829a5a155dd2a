//! Periodic batch sweep over invoices and campaigns.
//!
//! Phases, in order:
//!
//! 1. overdue detection (pending / partially paid invoices past due)
//! 2. prioritization and campaign start for overdue invoices without one
//! 3. escalation review of active campaigns
//! 4. delivery of due reminders
//! 5. hand-off retry for escalated campaigns still missing a collections case
//! 6. expiry of stale alternative offers
//!
//! Escalation runs before delivery so a campaign handed off this sweep gets
//! no further reminder. Hand-off retry runs after delivery so a campaign
//! escalated by exhausted reminders gets its case the same sweep. Phases 3
//! to 5 fan out over a bounded tokio task pool
//! (`max_concurrent` permits); every campaign is a separate task and the
//! dispatcher's version check keeps each aggregate single-writer. The
//! [`SweepHandle`] is checked between aggregates.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use arrears_campaigns::{
    CampaignCommand, CampaignId, CampaignSettings, CampaignStatus, PaymentCampaign, StartCampaign,
};
use arrears_core::{AggregateRoot, ExpectedVersion};
use arrears_customers::{CustomerId, CustomerRiskProfile};
use arrears_escalation::EscalationService;
use arrears_events::{EventBus, EventEnvelope};
use arrears_invoicing::{Invoice, InvoiceId};
use arrears_prioritization::{PrioritizationService, PrioritizedInvoice};

use crate::command_dispatcher::{CampaignCommandDispatcher, DispatchError};
use crate::config::CollectionsConfig;
use crate::escalation_workflow::{EscalationOutcome, EscalationWorkflow, HandoffRetry};
use crate::payment_options::PaymentOptionsService;
use crate::ports::Ports;
use crate::reminder_delivery::{DeliveryOutcome, ReminderDeliveryService};

/// Cancels a running sweep between aggregates.
///
/// A cancel applies to the sweep in progress, or to the next one when none
/// is running; the runner clears it when that sweep returns.
#[derive(Debug, Clone, Default)]
pub struct SweepHandle {
    cancelled: Arc<AtomicBool>,
}

impl SweepHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// A per-aggregate failure; the sweep carries on with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub phase: &'static str,
    pub campaign_id: Option<CampaignId>,
    pub invoice_id: Option<InvoiceId>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub as_of: DateTime<Utc>,
    pub invoices_marked_overdue: usize,
    pub ranking: Vec<PrioritizedInvoice>,
    pub campaigns_started: usize,
    pub escalation_reviews: usize,
    pub handed_off: usize,
    pub reviews_requested: usize,
    pub reminders_sent: usize,
    pub reminders_failed: usize,
    /// Campaigns escalated because a final-level reminder ran out of retries.
    pub escalated_after_failures: usize,
    /// Collections cases opened or completed for earlier escalations.
    pub handoffs_completed: usize,
    /// Escalated campaigns still waiting on the collections system.
    pub handoffs_pending: usize,
    pub options_expired: usize,
    pub failures: Vec<SweepFailure>,
    pub cancelled: bool,
}

impl SweepReport {
    fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            invoices_marked_overdue: 0,
            ranking: Vec::new(),
            campaigns_started: 0,
            escalation_reviews: 0,
            handed_off: 0,
            reviews_requested: 0,
            reminders_sent: 0,
            reminders_failed: 0,
            escalated_after_failures: 0,
            handoffs_completed: 0,
            handoffs_pending: 0,
            options_expired: 0,
            failures: Vec::new(),
            cancelled: false,
        }
    }

    fn fail(
        &mut self,
        phase: &'static str,
        campaign_id: Option<CampaignId>,
        invoice_id: Option<InvoiceId>,
        error: impl std::fmt::Display,
    ) {
        warn!(phase, campaign_id = ?campaign_id, invoice_id = ?invoice_id, error = %error, "sweep step failed");
        self.failures.push(SweepFailure {
            phase,
            campaign_id,
            invoice_id,
            message: error.to_string(),
        });
    }
}

pub struct SweepRunner<B> {
    ports: Ports,
    dispatcher: Arc<CampaignCommandDispatcher<B>>,
    delivery: Arc<ReminderDeliveryService<B>>,
    escalation: Arc<EscalationWorkflow<B>>,
    options: PaymentOptionsService<B>,
    prioritization: PrioritizationService,
    settings: CampaignSettings,
    max_concurrent: usize,
    handle: SweepHandle,
}

impl<B> SweepRunner<B>
where
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn new(ports: Ports, bus: B, config: &CollectionsConfig) -> Self {
        let dispatcher = Arc::new(CampaignCommandDispatcher::new(
            ports.campaigns.clone(),
            ports.invoices.clone(),
            bus,
        ));
        let io_timeout = config.sweep.io_timeout();
        Self {
            delivery: Arc::new(ReminderDeliveryService::new(
                ports.clone(),
                dispatcher.clone(),
                io_timeout,
            )),
            escalation: Arc::new(EscalationWorkflow::new(
                ports.clone(),
                dispatcher.clone(),
                EscalationService::with_thresholds(config.escalation),
                io_timeout,
            )),
            options: PaymentOptionsService::new(ports.clone(), dispatcher.clone()),
            prioritization: PrioritizationService::with_weights(config.scoring),
            settings: config.campaign,
            max_concurrent: config.sweep.max_concurrent.max(1),
            handle: SweepHandle::default(),
            dispatcher,
            ports,
        }
    }

    pub fn handle(&self) -> SweepHandle {
        self.handle.clone()
    }

    pub fn dispatcher(&self) -> Arc<CampaignCommandDispatcher<B>> {
        self.dispatcher.clone()
    }

    pub async fn run(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::new(now);
        info!(as_of = %now, max_concurrent = self.max_concurrent, "sweep started");

        self.detect_overdue(now, &mut report);
        self.start_campaigns(now, &mut report);
        self.review_escalations(now, &mut report).await;
        self.deliver_reminders(now, &mut report).await;
        self.retry_handoffs(now, &mut report).await;
        self.expire_options(now, &mut report);

        info!(
            marked_overdue = report.invoices_marked_overdue,
            started = report.campaigns_started,
            handed_off = report.handed_off,
            sent = report.reminders_sent,
            failed = report.reminders_failed,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "sweep finished"
        );
        if report.cancelled {
            self.handle.clear();
        }
        report
    }

    fn stop_requested(&self, report: &mut SweepReport) -> bool {
        if self.handle.is_cancelled() {
            report.cancelled = true;
        }
        report.cancelled
    }

    /// Invoices owned by a running campaign are left to the campaign.
    fn detect_overdue(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let due = match self.ports.invoices.find_due_for_overdue_check(now) {
            Ok(due) => due,
            Err(err) => return report.fail("overdue_detection", None, None, err),
        };
        for mut invoice in due {
            if self.stop_requested(report) {
                return;
            }
            let invoice_id = invoice.invoice_id();
            let owned = match self.ports.campaigns.find_by_invoice(invoice_id) {
                Ok(campaign) => campaign.is_some_and(|c| !c.is_terminal()),
                Err(err) => {
                    report.fail("overdue_detection", None, Some(invoice_id), err);
                    continue;
                }
            };
            if owned {
                continue;
            }
            let loaded = invoice.version();
            match invoice.mark_overdue(now) {
                Ok(true) => match self
                    .ports
                    .invoices
                    .save(&invoice, ExpectedVersion::Exact(loaded))
                {
                    Ok(()) => report.invoices_marked_overdue += 1,
                    Err(err) => report.fail("overdue_detection", None, Some(invoice_id), err),
                },
                Ok(false) => {}
                Err(err) => report.fail("overdue_detection", None, Some(invoice_id), err),
            }
        }
    }

    fn start_campaigns(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        if self.stop_requested(report) {
            return;
        }
        let candidates = match self.ports.invoices.find_overdue(None, now) {
            Ok(candidates) => candidates,
            Err(err) => return report.fail("campaign_start", None, None, err),
        };
        // The risk provider does not track overdue counts; the query does.
        let mut overdue_counts: BTreeMap<CustomerId, u32> = BTreeMap::new();
        for invoice in &candidates {
            *overdue_counts.entry(invoice.customer_id()).or_default() += 1;
        }
        let profiles: HashMap<CustomerId, CustomerRiskProfile> = overdue_counts
            .into_iter()
            .map(|(id, count)| {
                let profile = self.ports.customers.risk_profile(id).with_overdue_invoices(count);
                (id, profile)
            })
            .collect();
        let ranking = self.prioritization.prioritize(
            candidates
                .iter()
                .filter_map(|i| profiles.get(&i.customer_id()).map(|p| (i, p))),
            now,
        );

        for row in &ranking {
            if self.stop_requested(report) {
                break;
            }
            match self.start_campaign(row, &candidates, now) {
                Ok(Some(campaign_id)) => {
                    debug!(%campaign_id, invoice_id = %row.invoice_id, score = row.score, "campaign started");
                    report.campaigns_started += 1;
                }
                Ok(None) => {}
                Err(err) => report.fail("campaign_start", None, Some(row.invoice_id), err),
            }
        }
        report.ranking = ranking;
    }

    fn start_campaign(
        &self,
        row: &PrioritizedInvoice,
        candidates: &[Invoice],
        now: DateTime<Utc>,
    ) -> Result<Option<CampaignId>, DispatchError> {
        // One campaign per invoice; a closed campaign is not restarted.
        if self.ports.campaigns.find_by_invoice(row.invoice_id)?.is_some() {
            return Ok(None);
        }
        let Some(invoice) = candidates.iter().find(|i| i.invoice_id() == row.invoice_id) else {
            return Ok(None);
        };
        let mut invoice = invoice.clone();
        PrioritizationService::apply_priority(&mut invoice, row)?;

        let campaign_id = CampaignId::new();
        self.dispatcher
            .dispatch(CampaignCommand::StartCampaign(StartCampaign {
                campaign_id,
                invoice,
                settings: self.settings,
                occurred_at: now,
            }))?;
        Ok(Some(campaign_id))
    }

    async fn review_escalations(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        if self.stop_requested(report) {
            return;
        }
        let ids: Vec<CampaignId> = match self.ports.campaigns.find_active() {
            Ok(active) => active
                .into_iter()
                .filter(|c| c.status() == CampaignStatus::Active)
                .map(|c| c.campaign_id())
                .collect(),
            Err(err) => return report.fail("escalation_review", None, None, err),
        };

        let workflow = self.escalation.clone();
        let reviews = self
            .run_bounded("escalation_review", ids, report, move |id| {
                let workflow = workflow.clone();
                async move { workflow.review(id, now).await }
            })
            .await;

        for review in reviews {
            report.escalation_reviews += 1;
            match review.outcome {
                EscalationOutcome::HandedOff { .. } => report.handed_off += 1,
                EscalationOutcome::ReviewRequested => report.reviews_requested += 1,
                EscalationOutcome::NoAction | EscalationOutcome::Skipped => {}
            }
        }
    }

    async fn deliver_reminders(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        if self.stop_requested(report) {
            return;
        }
        let ids: Vec<CampaignId> = match self.ports.campaigns.find_active() {
            Ok(active) => active
                .into_iter()
                .filter(|c| c.is_ready_for_next_reminder(now))
                .map(|c| c.campaign_id())
                .collect(),
            Err(err) => return report.fail("reminder_delivery", None, None, err),
        };

        let delivery = self.delivery.clone();
        let outcomes = self
            .run_bounded("reminder_delivery", ids, report, move |id| {
                let delivery = delivery.clone();
                async move { delivery.deliver_next(id, now).await }
            })
            .await;

        for outcome in outcomes {
            match outcome {
                DeliveryOutcome::Sent { .. } => report.reminders_sent += 1,
                DeliveryOutcome::Failed { escalated, .. } => {
                    report.reminders_failed += 1;
                    if escalated {
                        report.escalated_after_failures += 1;
                    }
                }
                DeliveryOutcome::NotDue | DeliveryOutcome::AwaitingEscalation => {}
            }
        }
    }

    async fn retry_handoffs(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        if self.stop_requested(report) {
            return;
        }
        let ids: Vec<CampaignId> = match self.ports.campaigns.find_escalated() {
            Ok(escalated) => escalated
                .into_iter()
                .filter(PaymentCampaign::awaits_collections_case)
                .map(|c| c.campaign_id())
                .collect(),
            Err(err) => return report.fail("handoff_retry", None, None, err),
        };

        let workflow = self.escalation.clone();
        let retries = self
            .run_bounded("handoff_retry", ids, report, move |id| {
                let workflow = workflow.clone();
                async move { workflow.retry_handoff(id, now).await }
            })
            .await;

        for retry in retries {
            match retry {
                HandoffRetry::Completed { .. } => report.handoffs_completed += 1,
                HandoffRetry::StillPending => report.handoffs_pending += 1,
                HandoffRetry::NotNeeded => {}
            }
        }
    }

    fn expire_options(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        if self.stop_requested(report) {
            return;
        }
        let stale = match self.ports.campaigns.find_active() {
            Ok(active) => active.into_iter().filter(|c| {
                c.alternative_options()
                    .iter()
                    .any(|o| o.is_pending() && o.is_past_validity(now))
            }),
            Err(err) => return report.fail("option_expiry", None, None, err),
        };
        for campaign in stale {
            if self.stop_requested(report) {
                return;
            }
            let campaign_id = campaign.campaign_id();
            match self.options.expire(campaign_id, now) {
                Ok(expired) => report.options_expired += expired,
                Err(err) => report.fail("option_expiry", Some(campaign_id), None, err),
            }
        }
    }

    /// Run `op` for every campaign with at most `max_concurrent` in flight.
    ///
    /// Stops spawning once the handle is cancelled; tasks already running are
    /// awaited. Results come back in completion order.
    async fn run_bounded<T, F, Fut>(
        &self,
        phase: &'static str,
        ids: Vec<CampaignId>,
        report: &mut SweepReport,
        op: F,
    ) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(CampaignId) -> Fut,
        Fut: Future<Output = Result<T, DispatchError>> + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for id in ids {
            if self.stop_requested(report) {
                break;
            }
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let call = op(id);
            tasks.spawn(async move {
                let _permit = permit;
                (id, call.await)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(value))) => results.push(value),
                Ok((id, Err(err))) => report.fail(phase, Some(id), None, err),
                Err(err) => report.fail(phase, None, None, err),
            }
        }
        results
    }
}
