//! Command execution pipeline for payment campaigns.
//!
//! ```text
//! CampaignCommand
//!   ↓
//! 1. Load the campaign snapshot (or an empty one for StartCampaign)
//!   ↓
//! 2. Handle command (pure decision logic, produces events)
//!   ↓
//! 3. Apply events, save with an optimistic version check
//!   ↓
//! 4. Mirror the campaign's invoice into the invoice repository
//!   ↓
//! 5. Publish envelopes to the bus
//! ```
//!
//! A rejected command returns before step 3, so nothing is written. If
//! publication fails after the save, the error is returned; the campaign is
//! already stored, which gives at-least-once delivery to bus consumers.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use arrears_campaigns::{CampaignCommand, CampaignEvent, PaymentCampaign};
use arrears_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion};
use arrears_events::{Event, EventBus, EventEnvelope};

use crate::ports::{CampaignRepository, InvoiceRepository, PortError, RepositoryError};

/// Aggregate type recorded on every published envelope.
pub const CAMPAIGN_AGGREGATE_TYPE: &str = "collections.campaign";

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed input; retrying will not help.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Legal request the current state does not allow.
    #[error("business rule violated: {0}")]
    BusinessRule(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency failure (stale campaign or invoice version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("repository error: {0}")]
    Repository(RepositoryError),

    #[error("failed to serialize event: {0}")]
    Serialize(String),

    /// Publication failed after a successful save.
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("port call failed: {0}")]
    Port(#[from] PortError),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_) | DispatchError::Port(_))
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                DispatchError::Validation(msg)
            }
            DomainError::BusinessRule(msg) => DispatchError::BusinessRule(msg),
            DomainError::NotFound(msg) => DispatchError::NotFound(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
        }
    }
}

impl From<RepositoryError> for DispatchError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Repository(other),
        }
    }
}

/// Result of a dispatched command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Campaign state after the command.
    pub campaign: PaymentCampaign,
    /// Events emitted by the command, in order. Empty for no-op commands.
    pub events: Vec<CampaignEvent>,
}

/// Reusable command execution engine for the campaign aggregate.
///
/// - `B`: event bus implementation (envelopes carry JSON payloads)
pub struct CampaignCommandDispatcher<B> {
    campaigns: Arc<dyn CampaignRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    bus: B,
}

impl<B> CampaignCommandDispatcher<B> {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        bus: B,
    ) -> Self {
        Self {
            campaigns,
            invoices,
            bus,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn campaigns(&self) -> &Arc<dyn CampaignRepository> {
        &self.campaigns
    }
}

impl<B> CampaignCommandDispatcher<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// Saves use `ExpectedVersion::Exact(loaded version)`, or `NoAggregate`
    /// when the campaign does not exist yet. A concurrent writer therefore
    /// surfaces as [`DispatchError::Concurrency`]; nothing retries
    /// automatically.
    pub fn dispatch(&self, command: CampaignCommand) -> Result<CommandOutcome, DispatchError> {
        let campaign_id = command.campaign_id();

        // 1) Load
        let (mut campaign, expected) = match self.campaigns.find_by_id(campaign_id)? {
            Some(existing) => {
                let version = existing.version();
                (existing, ExpectedVersion::Exact(version))
            }
            None => (
                PaymentCampaign::empty(campaign_id),
                ExpectedVersion::NoAggregate,
            ),
        };
        let base_version = campaign.version();

        // 2) Decide events (no mutation)
        let decided = campaign.handle(&command).map_err(|err| {
            debug!(command = command.name(), %campaign_id, error = %err, "command rejected");
            DispatchError::from(err)
        })?;
        if decided.is_empty() {
            return Ok(CommandOutcome {
                campaign,
                events: decided,
            });
        }

        // 3) Apply + save (optimistic)
        for event in &decided {
            campaign.apply(event);
        }
        if let Err(err) = self.campaigns.save(&campaign, expected) {
            warn!(command = command.name(), %campaign_id, error = %err, "campaign save failed");
            return Err(err.into());
        }

        // 4) The campaign owns its invoice; keep the invoice view in step.
        if let Some(invoice) = campaign.invoice() {
            self.invoices.save(invoice, ExpectedVersion::Any)?;
        }

        // 5) Publish after save
        for (offset, event) in decided.iter().enumerate() {
            let envelope = envelope_for(&campaign, base_version + offset as u64 + 1, event)?;
            self.bus
                .publish(envelope)
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        debug!(
            command = command.name(),
            %campaign_id,
            events = decided.len(),
            version = campaign.version(),
            "command dispatched"
        );
        Ok(CommandOutcome {
            campaign,
            events: decided,
        })
    }
}

fn envelope_for(
    campaign: &PaymentCampaign,
    sequence_number: u64,
    event: &CampaignEvent,
) -> Result<EventEnvelope<JsonValue>, DispatchError> {
    let payload =
        serde_json::to_value(event).map_err(|e| DispatchError::Serialize(e.to_string()))?;
    Ok(EventEnvelope::new(
        Uuid::now_v7(),
        campaign.campaign_id().as_aggregate_id(),
        CAMPAIGN_AGGREGATE_TYPE,
        event.event_type(),
        sequence_number,
        event.occurred_at(),
        payload,
    ))
}
