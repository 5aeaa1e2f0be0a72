//! Domain models for Brewfleet.

pub mod command;
pub mod device;

pub use command::{Command, CommandChannel, CommandStatus};
pub use device::{Device, DeviceStatus};
