//! Infrastructure layer: ports, in-memory adapters, the campaign command
//! pipeline and the collection sweep that drives it.

pub mod adapters;
pub mod command_dispatcher;
pub mod config;
pub mod escalation_workflow;
pub mod fixture;
pub mod payment_application;
pub mod payment_options;
pub mod ports;
pub mod reminder_delivery;
pub mod sweep;
pub mod timeout;

pub use adapters::InMemoryBackend;
pub use command_dispatcher::{CampaignCommandDispatcher, CommandOutcome, DispatchError};
pub use config::{CollectionsConfig, ConfigError};
pub use ports::{PortError, Ports, RepositoryError};
pub use sweep::{SweepHandle, SweepReport, SweepRunner};
