//! Payment collection campaigns.
//!
//! A [`PaymentCampaign`] owns the collection effort for one overdue invoice:
//! the ordered reminder sequence, customer contact, payments received while
//! the campaign runs, alternative offers and the final hand-off. It is an
//! event-sourced aggregate; every command is decided by `handle` and state
//! only changes through `apply`.

pub mod campaign;
pub mod command;
pub mod event;
pub mod reminder;

pub use campaign::{CampaignId, CampaignSettings, CampaignStatus, CollectionNote, PaymentCampaign};
pub use command::*;
pub use event::*;
pub use reminder::{Engagement, PaymentReminder, ReminderId, ReminderStatus, ReminderTone};
