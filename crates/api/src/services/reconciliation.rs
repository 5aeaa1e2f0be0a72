//! Result reconciliation.
//!
//! Single code path for device-reported command outcomes, shared by the
//! HTTP endpoint and the WebSocket event. Updates the command row (first
//! terminal result wins), always appends to the audit log, touches device
//! presence, and notifies connected admins.

use chrono::{DateTime, Utc};
use persistence::entities::DeviceEntity;
use persistence::repositories::{CommandRepository, CommandResultRepository, DeviceRepository};
use tracing::{debug, warn};

use domain::models::CommandStatus;

use crate::app::AppState;
use crate::middleware::metrics;
use crate::ws::protocol::ServerEvent;

/// A device-reported outcome, normalized across transports.
#[derive(Debug, Clone)]
pub struct ReportedResult {
    pub command_id: String,
    pub status: CommandStatus,
    pub result_payload: Option<serde_json::Value>,
    pub result_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    /// The report as received, kept verbatim in the audit log.
    pub raw: serde_json::Value,
}

/// Outcome of reconciling one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Whether a live command row was transitioned by this report.
    pub updated: bool,
}

/// Apply a device-reported outcome to the command store.
///
/// Unknown command ids and duplicate reports for settled commands do not
/// update the command row but are still audited, and the call still
/// succeeds — firmware retrying an old report must never see an error.
pub async fn record_command_result(
    state: &AppState,
    device: &DeviceEntity,
    report: ReportedResult,
) -> Result<ReconcileOutcome, sqlx::Error> {
    let command_repo = CommandRepository::new(state.pool.clone());
    let result_repo = CommandResultRepository::new(state.pool.clone());
    let device_repo = DeviceRepository::new(state.pool.clone());

    let success = report.status == CommandStatus::Success;

    let updated = command_repo
        .record_result(
            &report.command_id,
            device.id,
            report.status.as_str(),
            report.result_payload.as_ref(),
            report.result_at,
        )
        .await?;

    if !updated {
        // Distinguish a duplicate report for a settled command from an
        // outcome for a command this store never issued.
        match command_repo.find_for_device(&report.command_id, device.id).await? {
            Some(existing) => debug!(
                command_id = %report.command_id,
                device_no = %device.device_no,
                status = %existing.status,
                "Duplicate result report for a settled command; audit only"
            ),
            None => debug!(
                command_id = %report.command_id,
                device_no = %device.device_no,
                "Result report for an unknown command; audit only"
            ),
        }
    }

    result_repo
        .create(
            &report.command_id,
            device.id,
            success,
            report.message.as_deref(),
            Some(&report.raw),
        )
        .await?;

    if let Err(e) = device_repo.touch_last_seen(device.id).await {
        warn!(device_no = %device.device_no, error = %e, "Failed to update last_seen");
    }

    metrics::record_command_result(success);

    state
        .registry
        .broadcast_admins(ServerEvent::CommandResult {
            device_no: device.device_no.clone(),
            command_id: report.command_id.clone(),
            success,
            result: report.result_payload,
        })
        .await;

    Ok(ReconcileOutcome { updated })
}
