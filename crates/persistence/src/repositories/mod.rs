//! Repository implementations.

pub mod command;
pub mod command_result;
pub mod device;
pub mod operation_log;

pub use command::{CommandRepository, RetryFilter};
pub use command_result::CommandResultRepository;
pub use device::DeviceRepository;
pub use operation_log::OperationLogRepository;
