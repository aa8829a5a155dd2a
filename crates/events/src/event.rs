use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate.
///
/// Campaign events are returned from `handle`, applied in order, then wrapped
/// in an [`crate::EventEnvelope`] and published once the aggregate is saved.
/// Bump [`Event::version`] when the payload shape changes.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, e.g. `collections.campaign.reminder_sent`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time, not the time of publication.
    fn occurred_at(&self) -> DateTime<Utc>;
}
