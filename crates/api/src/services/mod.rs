//! Background services and shared orchestration.

pub mod dispatch;
pub mod reconciliation;

pub use dispatch::{DispatchHandle, DispatchWorker};
