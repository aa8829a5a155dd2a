use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use arrears_campaigns::{
    CampaignCommand, CampaignId, CampaignSettings, PaymentReminder, ReminderId, ScheduleReminder,
    SendReminder, StartCampaign,
};
use arrears_core::{Currency, Money};
use arrears_customers::{CustomerId, CustomerRiskProfile};
use arrears_escalation::{EscalationContext, EscalationService};
use arrears_events::{EventEnvelope, InMemoryEventBus};
use arrears_infra::adapters::InMemoryBackend;
use arrears_infra::command_dispatcher::CampaignCommandDispatcher;
use arrears_invoicing::{Invoice, InvoiceId, NewInvoice, PaymentMethod, ReminderLevel};
use arrears_payments::{Payment, PaymentAllocationService, PaymentId};
use arrears_prioritization::PrioritizationService;

fn bench_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn usd(amount: i64) -> Money {
    Money::new(Decimal::from(amount), Currency::usd()).unwrap()
}

/// `count` overdue invoices with spread-out balances and due dates.
fn overdue_book(customer_id: CustomerId, count: usize) -> Vec<Invoice> {
    (0..count)
        .map(|i| {
            let due = bench_time() - Duration::days(1 + (i % 60) as i64);
            let mut invoice = Invoice::issue(NewInvoice {
                id: InvoiceId::new(),
                customer_id,
                invoice_number: format!("INV-{i:05}"),
                amount: usd(100 + (i as i64 * 37) % 12_000),
                issue_date: due - Duration::days(30),
                due_date: due,
                lines: vec![],
            })
            .unwrap();
            invoice.mark_overdue(bench_time()).unwrap();
            invoice
        })
        .collect()
}

fn bench_prioritization(c: &mut Criterion) {
    let mut group = c.benchmark_group("prioritization");
    let service = PrioritizationService::new();

    for size in [10usize, 100, 1000] {
        let profiles: Vec<CustomerRiskProfile> = (0..size)
            .map(|i| CustomerRiskProfile::new(CustomerId::new(), (i % 10) as f64 / 10.0).unwrap())
            .collect();
        let invoices: Vec<Invoice> = profiles
            .iter()
            .flat_map(|p| overdue_book(p.customer_id, 1))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("rank", size), &size, |b, _| {
            b.iter(|| {
                black_box(service.prioritize(invoices.iter().zip(profiles.iter()), bench_time()))
            });
        });
    }

    group.finish();
}

fn bench_payment_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("payment_allocation");
    let allocator = PaymentAllocationService::new();
    let customer_id = CustomerId::new();

    for size in [5usize, 50, 500] {
        let invoices = overdue_book(customer_id, size);
        let total: i64 = (0..size).map(|i| 100 + (i as i64 * 37) % 12_000).sum();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("spread_over", size), &size, |b, _| {
            b.iter(|| {
                let mut book = invoices.clone();
                let mut payment = Payment::new(
                    PaymentId::new(),
                    customer_id,
                    usd(total / 2 + 1),
                    bench_time(),
                    PaymentMethod::BankTransfer,
                    None,
                )
                .unwrap();
                black_box(
                    allocator
                        .allocate(&mut payment, &mut book, bench_time())
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_escalation_evaluate(c: &mut Criterion) {
    let service = EscalationService::new();
    let context = EscalationContext {
        campaign_id: CampaignId::new(),
        invoice_id: InvoiceId::new(),
        customer_id: CustomerId::new(),
        total_amount: usd(12_500),
        reminder_count: 2,
        days_active: 18,
        days_since_last_reminder: Some(15),
        last_reminder_opened: false,
        reminders_opened: 0,
        active_campaigns_for_customer: 3,
        collection_notes: vec!["customer disputes freight".to_string()],
        auto_escalation_due: false,
        as_of: bench_time(),
    };

    c.bench_function("escalation_evaluate", |b| {
        b.iter(|| black_box(service.evaluate(black_box(&context))))
    });
}

fn bench_command_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_dispatch");

    group.bench_function("start_schedule_send", |b| {
        let backend = InMemoryBackend::default();
        let ports = backend.ports();
        let dispatcher = CampaignCommandDispatcher::new(
            ports.campaigns.clone(),
            ports.invoices.clone(),
            Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new()),
        );
        let customer_id = CustomerId::new();

        b.iter(|| {
            let invoice = overdue_book(customer_id, 1).remove(0);
            let campaign_id = CampaignId::new();
            let reminder = PaymentReminder::new(
                ReminderId::new(),
                invoice.invoice_id(),
                customer_id,
                ReminderLevel::First,
                bench_time(),
            );
            let reminder_id = reminder.id();
            dispatcher
                .dispatch(CampaignCommand::StartCampaign(StartCampaign {
                    campaign_id,
                    invoice,
                    settings: CampaignSettings::default(),
                    occurred_at: bench_time(),
                }))
                .unwrap();
            dispatcher
                .dispatch(CampaignCommand::ScheduleReminder(ScheduleReminder {
                    campaign_id,
                    reminder,
                    occurred_at: bench_time(),
                }))
                .unwrap();
            black_box(
                dispatcher
                    .dispatch(CampaignCommand::SendReminder(SendReminder {
                        campaign_id,
                        reminder_id,
                        occurred_at: bench_time(),
                    }))
                    .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_prioritization,
    bench_payment_allocation,
    bench_escalation_evaluate,
    bench_command_dispatch,
);
criterion_main!(benches);
