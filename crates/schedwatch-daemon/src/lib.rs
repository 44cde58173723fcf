//! The schedwatch daemon: configuration, the polling pipeline, the cycle
//! scheduler and subscription bookkeeping.

pub mod config;
pub mod error;
pub mod mail;
pub mod poller;
pub mod scheduler;
pub mod subscriptions;


pub use config::Settings;
pub use error::ServiceError;
pub use poller::{CycleReport, Poller};
pub use scheduler::Scheduler;
pub use subscriptions::{FilterEdit, SubscriptionService};
