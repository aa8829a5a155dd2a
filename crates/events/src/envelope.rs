use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use arrears_core::AggregateId;

/// Envelope for a published event.
///
/// - `sequence_number` is the aggregate version *after* this event was applied,
///   so consumers can detect gaps and duplicates per aggregate.
/// - `payload` is the serialised domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    aggregate_id: AggregateId,
    aggregate_type: String,
    event_type: String,
    sequence_number: u64,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        sequence_number: u64,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            sequence_number,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
