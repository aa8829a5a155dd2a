//! Domain event plumbing: the event trait, envelopes, command targeting and an
//! in-process pub/sub bus.
//!
//! Aggregates return events from each command; the caller (infra dispatcher)
//! wraps them in envelopes and publishes them after a successful save. There is
//! no hidden event queue on the aggregates themselves.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
