//! One collection sweep over a JSON fixture, printed as a JSON report.
//!
//! ```text
//! arrears-sweep --fixture book.json --now 2025-03-01T09:00:00Z --pretty
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde_json::{Value as JsonValue, json};
use tracing::{info, warn};

use arrears_events::{EventEnvelope, InMemoryEventBus};
use arrears_infra::adapters::InMemoryBackend;
use arrears_infra::config::CollectionsConfig;
use arrears_infra::fixture::Fixture;
use arrears_infra::payment_application::PaymentApplicationService;
use arrears_infra::sweep::SweepRunner;
use arrears_observability::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "arrears-sweep", version, about = "Run one payment collection sweep")]
struct Args {
    /// Invoices, customer profiles and received payments to load.
    #[arg(long, env = "ARREARS_FIXTURE")]
    fixture: PathBuf,

    /// JSON configuration file; defaults apply when omitted.
    #[arg(long, env = "ARREARS_CONFIG")]
    config: Option<PathBuf>,

    /// Sweep clock (RFC 3339). Defaults to the current time.
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Sender name used in reminder emails.
    #[arg(long, default_value = "Accounts Receivable")]
    sender: String,

    /// Human-readable logs and report.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        CollectionsConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(max_concurrent) = args.max_concurrent {
        config.sweep.max_concurrent = max_concurrent;
        config.validate().context("invalid --max-concurrent")?;
    }
    if args.pretty {
        config.logging.format = LogFormat::Pretty;
    }
    arrears_observability::init_with(&config.logging);

    let now = args.now.unwrap_or_else(Utc::now);
    let fixture = Fixture::load(&args.fixture)
        .with_context(|| format!("failed to load fixture {}", args.fixture.display()))?;
    let backend = InMemoryBackend::new(args.sender);
    let seeded = fixture.seed(&backend).context("failed to seed fixture")?;
    info!(invoices = seeded, %now, "fixture loaded");

    let bus = Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new());
    let runner = SweepRunner::new(backend.ports(), bus.clone(), &config);

    let handle = runner.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    // Payments received since the last run settle before anyone is chased.
    let payments = PaymentApplicationService::new(backend.ports(), runner.dispatcher());
    let mut applied = Vec::new();
    for payment in fixture.payments(config.currency()?, now)? {
        let payment_id = payment.id();
        match payments.apply(payment, now) {
            Ok(application) => applied.push(application),
            Err(err) => warn!(%payment_id, error = %err, "payment not applied"),
        }
    }

    let report = runner.run(now).await;

    let output = json!({
        "as_of": now,
        "seeded_invoices": seeded,
        "payments": applied,
        "sweep": report,
        "reminders_delivered": backend.channel.sent().len(),
        "collections_cases": backend.handoff.cases(),
        "events_published": bus.published_count(),
    });
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");
    Ok(())
}
