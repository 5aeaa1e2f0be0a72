//! Background jobs.

pub mod command_expiry;
pub mod scheduler;

pub use command_expiry::CommandExpiryJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
