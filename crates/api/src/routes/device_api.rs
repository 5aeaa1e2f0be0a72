//! Device-facing endpoint handlers: command polling and result reporting.
//!
//! Devices identify themselves by device number, matching the firmware's
//! existing wire contract; WebSocket sessions additionally authenticate
//! with the device API key.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use persistence::repositories::{CommandRepository, DeviceRepository};
use serde::Serialize;

use domain::models::command::{CommandResultReport, PendingCommandItem};
use domain::models::CommandStatus;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::reconciliation::{self, ReportedResult};

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Device command polling.
///
/// GET /api/devices/:device_no/commands/pending
///
/// Returns the device's live commands and flips freshly delivered ones to
/// sent: the poll response is the hand-off. Polling again before reporting
/// a result returns the same set.
pub async fn poll_pending_commands(
    State(state): State<AppState>,
    Path(device_no): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let device_repo = DeviceRepository::new(state.pool.clone());
    let command_repo = CommandRepository::new(state.pool.clone());

    let device = device_repo
        .find_by_device_no(&device_no)
        .await?
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))?;

    let commands = command_repo
        .list_pending_for_device(device.id, state.config.dispatch.poll_limit)
        .await?;

    device_repo.touch_last_seen(device.id).await?;

    let newly_delivered: Vec<String> = commands
        .iter()
        .filter(|c| c.status == CommandStatus::Pending.as_str())
        .map(|c| c.command_id.clone())
        .collect();

    let items: Vec<PendingCommandItem> = commands
        .into_iter()
        .map(|c| PendingCommandItem {
            command_id: c.command_id,
            command_type: c.command_type,
            payload: c.payload.unwrap_or_else(|| serde_json::json!({})),
            issued_at: c.created_at,
        })
        .collect();

    command_repo.mark_sent_many(&newly_delivered).await?;

    Ok((StatusCode::OK, Json(items)))
}

/// Device command result reporting.
///
/// POST /api/devices/:device_no/command_result
///
/// Always returns ok for well-formed reports: unknown command ids and
/// duplicate reports are audited rather than rejected, so firmware retries
/// never error.
pub async fn report_command_result(
    State(state): State<AppState>,
    Path(device_no): Path<String>,
    Json(report): Json<CommandResultReport>,
) -> Result<impl IntoResponse, ApiError> {
    let device = DeviceRepository::new(state.pool.clone())
        .find_by_device_no(&device_no)
        .await?
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))?;

    if report.command_id.is_empty() {
        return Err(ApiError::Validation("command_id required".to_string()));
    }

    let status = report
        .terminal_status()
        .map_err(ApiError::Validation)?;

    let message = report
        .result_payload
        .as_ref()
        .and_then(|p| p.get("msg"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string());

    let raw = serde_json::json!({
        "command_id": report.command_id,
        "status": report.status,
        "result_payload": report.result_payload,
        "result_at": report.result_at,
    });

    reconciliation::record_command_result(
        &state,
        &device,
        ReportedResult {
            command_id: report.command_id.clone(),
            status,
            result_payload: report.result_payload.clone(),
            result_at: report.result_at,
            message,
            raw,
        },
    )
    .await?;

    Ok((StatusCode::OK, Json(OkResponse { ok: true })))
}
