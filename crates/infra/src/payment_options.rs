//! Alternative payment offers for a running campaign.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use arrears_alternatives::{
    AlternativePaymentService, CustomerPaymentProfile, OptionId, StrategyRecommendation,
};
use arrears_campaigns::{
    CampaignCommand, CampaignId, ExpireAlternativeOptions, OfferAlternativeOption,
    PaymentCampaign, RespondToAlternativeOption,
};
use arrears_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CampaignCommandDispatcher, CommandOutcome, DispatchError};
use crate::ports::Ports;

pub struct PaymentOptionsService<B> {
    ports: Ports,
    dispatcher: Arc<CampaignCommandDispatcher<B>>,
    alternatives: AlternativePaymentService,
}

impl<B> PaymentOptionsService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(ports: Ports, dispatcher: Arc<CampaignCommandDispatcher<B>>) -> Self {
        Self {
            ports,
            dispatcher,
            alternatives: AlternativePaymentService::new(),
        }
    }

    /// Compute the optimal strategy for the campaign's invoice and offer the
    /// recommended option plus its runners-up.
    ///
    /// Customers without a stored payment profile get one built from their
    /// risk score alone.
    pub fn offer(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<StrategyRecommendation, DispatchError> {
        let campaign = self.load(campaign_id)?;
        let invoice = campaign
            .invoice()
            .ok_or_else(|| DispatchError::NotFound(format!("invoice of campaign {campaign_id}")))?;
        let customer_id = invoice.customer_id();
        let profile = match self.ports.customers.payment_profile(customer_id) {
            Some(profile) => profile,
            None => CustomerPaymentProfile::new(
                customer_id,
                self.ports.customers.risk_profile(customer_id).risk_score,
            )?,
        };

        let recommendation = self
            .alternatives
            .recommend_optimal_strategy(invoice, &profile, now)?;

        let offers = std::iter::once(&recommendation.recommended)
            .chain(recommendation.alternatives.iter());
        for scored in offers {
            self.dispatcher
                .dispatch(CampaignCommand::OfferAlternativeOption(OfferAlternativeOption {
                    campaign_id,
                    option: scored.option.clone(),
                    occurred_at: now,
                }))?;
        }
        info!(
            %campaign_id,
            recommended = ?recommendation.recommended.option.option_type,
            expected = %recommendation.recommended.expected_collection,
            offered = recommendation.alternatives.len() + 1,
            "alternative payment options offered"
        );
        Ok(recommendation)
    }

    pub fn respond(
        &self,
        campaign_id: CampaignId,
        option_id: OptionId,
        accepted: bool,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, DispatchError> {
        self.dispatcher
            .dispatch(CampaignCommand::RespondToAlternativeOption(
                RespondToAlternativeOption {
                    campaign_id,
                    option_id,
                    accepted,
                    occurred_at: now,
                },
            ))
    }

    /// Expire pending offers past their validity; returns how many expired.
    pub fn expire(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> Result<usize, DispatchError> {
        let before = pending_count(&self.load(campaign_id)?);
        let outcome = self
            .dispatcher
            .dispatch(CampaignCommand::ExpireAlternativeOptions(
                ExpireAlternativeOptions {
                    campaign_id,
                    occurred_at: now,
                },
            ))?;
        Ok(before.saturating_sub(pending_count(&outcome.campaign)))
    }

    fn load(&self, campaign_id: CampaignId) -> Result<PaymentCampaign, DispatchError> {
        self.ports
            .campaigns
            .find_by_id(campaign_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("campaign {campaign_id}")))
    }
}

fn pending_count(campaign: &PaymentCampaign) -> usize {
    campaign
        .alternative_options()
        .iter()
        .filter(|o| o.is_pending())
        .count()
}
