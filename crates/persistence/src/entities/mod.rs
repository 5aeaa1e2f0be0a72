//! Database entities (row mappings).

pub mod command;
pub mod command_result;
pub mod device;
pub mod operation_log;

pub use command::{BatchCommandRow, BatchSummaryRow, CommandEntity, UndeliveredCommandRow};
pub use command_result::CommandResultEntity;
pub use device::DeviceEntity;
pub use operation_log::OperationLogEntity;
