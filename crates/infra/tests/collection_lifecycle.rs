//! End-to-end collection runs over the in-memory backend.
//!
//! Each test drives [`SweepRunner`] day by day and checks what the customer
//! received, what collections got, and the campaign left behind.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use arrears_campaigns::{CampaignStatus, PaymentCampaign};
use arrears_core::{AggregateRoot, Currency, ExpectedVersion, Money};
use arrears_customers::{CustomerId, CustomerRiskProfile};
use arrears_events::{EventBus, EventEnvelope, InMemoryEventBus};
use arrears_infra::adapters::InMemoryBackend;
use arrears_infra::config::CollectionsConfig;
use arrears_infra::fixture::Fixture;
use arrears_infra::payment_application::PaymentApplicationService;
use arrears_infra::ports::{
    CampaignRepository, DeliveryReceipt, InvoiceRepository, Notification, NotificationService,
    OutboundReminder, PortError, ReminderChannel, RepositoryError,
};
use arrears_infra::sweep::SweepRunner;
use arrears_invoicing::{Invoice, InvoiceId, InvoiceStatus, NewInvoice, PaymentMethod, ReminderLevel};
use arrears_payments::{Payment, PaymentId};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 5, 9, 0, 0).unwrap()
}

fn day(n: i64) -> DateTime<Utc> {
    test_time() + Duration::days(n)
}

fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::usd()).unwrap()
}

/// Seed a pending invoice that fell due `days_late` days before day 0.
fn seed_invoice(
    backend: &InMemoryBackend,
    customer_id: CustomerId,
    number: &str,
    amount: Decimal,
    days_late: i64,
) -> InvoiceId {
    let due = test_time() - Duration::days(days_late);
    let id = InvoiceId::new();
    let invoice = Invoice::issue(NewInvoice {
        id,
        customer_id,
        invoice_number: number.to_string(),
        amount: usd(amount),
        issue_date: due - Duration::days(30),
        due_date: due,
        lines: vec![],
    })
    .unwrap();
    backend.invoices.insert(invoice).unwrap();
    id
}

fn campaign_for(backend: &InMemoryBackend, invoice_id: InvoiceId) -> PaymentCampaign {
    backend
        .campaigns
        .find_by_invoice(invoice_id)
        .unwrap()
        .expect("campaign for invoice")
}

fn runner(backend: &InMemoryBackend, bus: Bus) -> SweepRunner<Bus> {
    SweepRunner::new(backend.ports(), bus, &CollectionsConfig::default())
}

struct DownChannel;

#[async_trait::async_trait]
impl ReminderChannel for DownChannel {
    async fn deliver(&self, _: &OutboundReminder) -> Result<DeliveryReceipt, PortError> {
        Err(PortError::Unavailable("smtp relay".to_string()))
    }
}

#[derive(Default)]
struct RecordingNotifications {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifications {
    fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NotificationService for RecordingNotifications {
    async fn notify(&self, notification: Notification) -> Result<(), PortError> {
        self.seen.lock().unwrap().push(notification);
        Ok(())
    }
}

#[tokio::test]
async fn three_reminders_then_handoff_to_collections() {
    let backend = InMemoryBackend::new("Acme Billing");
    let invoice_id = seed_invoice(&backend, CustomerId::new(), "INV-1001", dec!(800), 5);
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let events = bus.subscribe();
    let runner = runner(&backend, bus.clone());

    let first = runner.run(day(0)).await;
    assert_eq!(first.invoices_marked_overdue, 1);
    assert_eq!(first.campaigns_started, 1);
    assert_eq!(first.reminders_sent, 1);

    assert_eq!(runner.run(day(7)).await.reminders_sent, 1);
    assert_eq!(runner.run(day(14)).await.reminders_sent, 1);

    let last = runner.run(day(21)).await;
    assert_eq!(last.handed_off, 1);
    assert_eq!(last.reminders_sent, 0);
    assert!(last.failures.is_empty());

    let levels: Vec<ReminderLevel> = backend.channel.sent().iter().map(|r| r.level).collect();
    assert_eq!(
        levels,
        vec![ReminderLevel::First, ReminderLevel::Second, ReminderLevel::Third]
    );

    let campaign = campaign_for(&backend, invoice_id);
    assert_eq!(campaign.status(), CampaignStatus::Escalated);
    assert_eq!(campaign.escalation_reason(), Some("reminder limit reached"));
    assert_eq!(campaign.contact_attempts(), 3);

    let invoice = backend.invoices.find_by_id(invoice_id).unwrap().unwrap();
    assert!(invoice.is_escalated());
    assert_eq!(invoice.status(), InvoiceStatus::InDefault);
    assert_eq!(invoice.reminder_count(), 3);

    let cases = backend.handoff.cases();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].invoice_id, Some(invoice_id));
    assert!(cases[0].data_transferred);

    let published: Vec<String> = events
        .drain()
        .iter()
        .map(|e| e.event_type().to_string())
        .collect();
    assert_eq!(published.first().map(String::as_str), Some("collections.campaign.started"));
    assert_eq!(
        published[published.len() - 2..],
        [
            "collections.campaign.escalated".to_string(),
            "collections.campaign.case_recorded".to_string(),
        ]
    );
    assert_eq!(campaign.collections_case_id(), Some(cases[0].case_id.as_str()));
    assert_eq!(
        published
            .iter()
            .filter(|t| *t == "collections.campaign.reminder_sent")
            .count(),
        3
    );

    let after = runner.run(day(40)).await;
    assert_eq!(after.escalation_reviews, 0);
    assert_eq!(after.reminders_sent, 0);
    assert_eq!(backend.handoff.cases().len(), 1);
}

#[tokio::test]
async fn failing_channel_exhausts_retries_and_escalates() {
    let backend = InMemoryBackend::default();
    let invoice_id = seed_invoice(&backend, CustomerId::new(), "INV-2002", dec!(450), 2);
    let mut ports = backend.ports();
    ports.channel = Arc::new(DownChannel);
    let runner = SweepRunner::new(ports, Arc::new(InMemoryEventBus::new()), &CollectionsConfig::default());

    // Three attempts per level; a failed attempt stays due the same day.
    for (start, level) in [(0, ReminderLevel::First), (7, ReminderLevel::Second)] {
        for attempt in 1..=3 {
            let report = runner.run(day(start)).await;
            assert_eq!(report.reminders_failed, 1, "{level:?} attempt {attempt}");
            assert_eq!(report.escalated_after_failures, 0);
        }
        let campaign = campaign_for(&backend, invoice_id);
        assert_eq!(campaign.status(), CampaignStatus::Active);
        assert_eq!(
            campaign.pending_reminder().map(|r| r.level()),
            level.next(),
            "next level scheduled after {level:?} ran out of retries"
        );
        assert_eq!(campaign.next_reminder_date(), Some(day(start + 7)));
    }

    let mut escalated = 0;
    for _ in 0..3 {
        escalated += runner.run(day(14)).await.escalated_after_failures;
    }
    assert_eq!(escalated, 1);

    let campaign = campaign_for(&backend, invoice_id);
    assert_eq!(campaign.status(), CampaignStatus::Escalated);
    assert_eq!(campaign.contact_attempts(), 0);
    assert_eq!(campaign.reminders().len(), 3);
    assert!(campaign.reminders().iter().all(|r| r.retries_exhausted()));
    assert!(backend.invoices.find_by_id(invoice_id).unwrap().unwrap().is_escalated());
}

#[tokio::test]
async fn payment_in_full_completes_the_campaign() {
    let backend = InMemoryBackend::default();
    let customer = CustomerId::new();
    let invoice_id = seed_invoice(&backend, customer, "INV-3003", dec!(500), 10);
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let runner = runner(&backend, bus);

    runner.run(day(0)).await;
    let campaign_id = campaign_for(&backend, invoice_id).campaign_id();

    let payments = PaymentApplicationService::new(backend.ports(), runner.dispatcher());
    let payment = Payment::new(
        PaymentId::new(),
        customer,
        usd(dec!(500)),
        day(3),
        PaymentMethod::BankTransfer,
        Some("WIRE-77".to_string()),
    )
    .unwrap();
    let application = payments.apply(payment, day(3)).unwrap();

    assert_eq!(application.completed_campaigns, vec![campaign_id]);
    assert!(application.unallocated.is_zero());

    let campaign = campaign_for(&backend, invoice_id);
    assert_eq!(campaign.status(), CampaignStatus::Completed);
    assert_eq!(campaign.total_collected(), usd(dec!(500)));
    assert_eq!(
        backend.invoices.find_by_id(invoice_id).unwrap().unwrap().status(),
        InvoiceStatus::Paid
    );

    let later = runner.run(day(7)).await;
    assert_eq!(later.campaigns_started, 0);
    assert_eq!(later.reminders_sent, 0);
    assert_eq!(backend.channel.sent().len(), 1);
}

#[tokio::test]
async fn large_balances_go_to_a_manager_before_the_handoff() {
    let backend = InMemoryBackend::default();
    let notifications = Arc::new(RecordingNotifications::default());
    let mut ports = backend.ports();
    ports.notifications = notifications.clone();
    let runner = SweepRunner::new(ports, Arc::new(InMemoryEventBus::new()), &CollectionsConfig::default());
    let invoice_id = seed_invoice(&backend, CustomerId::new(), "INV-4004", dec!(7500), 3);

    for n in [0, 7, 14] {
        let report = runner.run(day(n)).await;
        assert_eq!(report.reviews_requested, 1, "day {n}");
        assert_eq!(report.reminders_sent, 1, "day {n}");
    }
    assert_eq!(runner.run(day(21)).await.handed_off, 1);

    let seen = notifications.seen();
    assert_eq!(seen.len(), 4);
    assert!(seen[..3]
        .iter()
        .all(|n| matches!(n, Notification::ManagerReview { invoice_id: id, .. } if *id == invoice_id)));
    match &seen[3] {
        Notification::CampaignEscalated { case_id, reason, .. } => {
            assert_eq!(case_id.as_deref(), Some("CASE-000001"));
            assert_eq!(reason, "reminder limit reached");
        }
        other => panic!("expected an escalation notice, got {other:?}"),
    }
}

#[tokio::test]
async fn risky_customers_are_worked_first() {
    let backend = InMemoryBackend::default();
    let steady = CustomerId::new();
    let risky = CustomerId::new();
    backend
        .customers
        .upsert_risk(CustomerRiskProfile::neutral(steady));
    backend.customers.upsert_risk(CustomerRiskProfile {
        risk_score: 0.95,
        ..CustomerRiskProfile::neutral(risky)
    });
    let calm = seed_invoice(&backend, steady, "INV-5005", dec!(900), 4);
    let urgent = seed_invoice(&backend, risky, "INV-5006", dec!(900), 4);

    let report = runner(&backend, Arc::new(InMemoryEventBus::new()))
        .run(day(0))
        .await;

    let order: Vec<InvoiceId> = report.ranking.iter().map(|row| row.invoice_id).collect();
    assert_eq!(order, vec![urgent, calm]);
    assert_eq!(report.campaigns_started, 2);
}

#[tokio::test]
async fn cancelled_sweep_leaves_campaigns_untouched() {
    let backend = InMemoryBackend::default();
    for n in 0..5 {
        seed_invoice(&backend, CustomerId::new(), &format!("INV-60{n}"), dec!(300), 6);
    }
    let runner = runner(&backend, Arc::new(InMemoryEventBus::new()));
    runner.handle().cancel();

    let report = runner.run(day(0)).await;

    assert!(report.cancelled);
    assert_eq!(report.campaigns_started, 0);
    assert!(backend.campaigns.all().unwrap().is_empty());
    assert!(backend.channel.sent().is_empty());
}

#[tokio::test]
async fn stale_campaign_copy_is_rejected() {
    let backend = InMemoryBackend::default();
    let invoice_id = seed_invoice(&backend, CustomerId::new(), "INV-7007", dec!(650), 8);
    let runner = runner(&backend, Arc::new(InMemoryEventBus::new()));
    runner.run(day(0)).await;

    let stale = campaign_for(&backend, invoice_id);
    runner.run(day(7)).await;
    let fresh = campaign_for(&backend, invoice_id);
    assert!(fresh.version() > stale.version());

    let result = backend
        .campaigns
        .save(&stale, ExpectedVersion::Exact(stale.version()));
    assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    assert_eq!(campaign_for(&backend, invoice_id), fresh);
}

#[tokio::test]
async fn fixture_drives_a_full_day() {
    let customer = "0190f5c4-7d2a-7c3e-9a61-3f1b2c4d5e6f";
    let raw = format!(
        r#"{{
            "invoices": [
                {{
                    "id": "0190f5c4-7d2a-7c3e-9a61-3f1b2c4d5e71",
                    "customer_id": "{customer}",
                    "invoice_number": "INV-8001",
                    "amount": {{ "amount": "1200.00", "currency": "USD" }},
                    "issue_date": "2025-03-01T00:00:00Z",
                    "due_date": "2025-04-01T00:00:00Z"
                }},
                {{
                    "id": "0190f5c4-7d2a-7c3e-9a61-3f1b2c4d5e72",
                    "customer_id": "{customer}",
                    "invoice_number": "INV-8002",
                    "amount": {{ "amount": "300.00", "currency": "USD" }},
                    "issue_date": "2025-03-15T00:00:00Z",
                    "due_date": "2025-04-15T00:00:00Z"
                }}
            ],
            "risk_profiles": [{{ "customer_id": "{customer}", "risk_score": 0.6 }}],
            "payments": [{{ "customer_id": "{customer}", "amount": "1200.00", "method": "ach" }}]
        }}"#
    );
    let fixture = Fixture::from_json(&raw).unwrap();
    let backend = InMemoryBackend::default();
    assert_eq!(fixture.seed(&backend).unwrap(), 2);

    let config = CollectionsConfig::default();
    let runner = SweepRunner::new(backend.ports(), Arc::new(InMemoryEventBus::new()), &config);
    let payments = PaymentApplicationService::new(backend.ports(), runner.dispatcher());
    for payment in fixture.payments(config.currency().unwrap(), day(0)).unwrap() {
        let application = payments.apply(payment, day(0)).unwrap();
        assert_eq!(application.allocations.len(), 1);
    }

    let report = runner.run(day(0)).await;

    assert_eq!(report.campaigns_started, 1);
    let sent = backend.channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].email.subject.contains("INV-8002"));
}
