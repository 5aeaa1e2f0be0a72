//! Command dispatch and batch tracking handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use persistence::repositories::{
    CommandRepository, DeviceRepository, OperationLogRepository, RetryFilter,
};
use serde::Deserialize;
use tracing::warn;
use validator::Validate;

use domain::models::command::{
    new_batch_id, BatchCommandDetail, BatchDetailResponse, BatchListResponse, BatchSummary,
    DispatchRequest, DispatchResponse, RetryBatchRequest, RetryBatchResponse,
};
use domain::models::{CommandChannel, CommandStatus};
use shared::pagination::PageParams;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OperatorAuth;
use crate::middleware::metrics::record_commands_dispatched;

/// Query parameters for the batch listing.
#[derive(Debug, Deserialize)]
pub struct BatchListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Dispatch a command to a set of devices.
///
/// POST /api/commands/dispatch
pub async fn dispatch_commands(
    State(state): State<AppState>,
    auth: OperatorAuth,
    Json(request): Json<DispatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    let device_repo = DeviceRepository::new(state.pool.clone());
    let command_repo = CommandRepository::new(state.pool.clone());

    // Unknown or out-of-scope device numbers are dropped here; the valid
    // remainder still gets commands (partial success).
    let devices = device_repo
        .list_by_device_nos(&request.device_ids, auth.merchant_scope())
        .await?;

    if devices.is_empty() {
        return Err(ApiError::NotFound("No devices found".to_string()));
    }

    let batch_id = new_batch_id(Utc::now());
    let ttl = request
        .timeout_seconds
        .unwrap_or(state.config.dispatch.default_command_ttl_secs);
    let priority = request.priority.unwrap_or(0);

    let mut issued_count = 0;
    for device in &devices {
        command_repo
            .create(
                device.id,
                &request.command_type,
                CommandChannel::HttpPoll.as_str(),
                request.payload.as_ref(),
                priority,
                auth.user_id,
                Some(batch_id.as_str()),
                ttl,
            )
            .await?;
        issued_count += 1;
    }

    record_commands_dispatched(issued_count);
    state.dispatch.wake();

    let detail = serde_json::json!({
        "batch_id": batch_id,
        "device_ids": request.device_ids,
        "command_type": request.command_type,
        "issued_count": issued_count,
        "note": request.note,
    });
    if let Err(e) = OperationLogRepository::new(state.pool.clone())
        .create(auth.user_id, "command_dispatch", "batch", Some(batch_id.as_str()), Some(&detail))
        .await
    {
        warn!(batch_id = %batch_id, error = %e, "Failed to write operation log");
    }

    Ok((
        StatusCode::OK,
        Json(DispatchResponse {
            ok: true,
            batch_id,
            issued_count,
        }),
    ))
}

/// List command batches with per-status counts.
///
/// GET /api/commands/batches
pub async fn list_command_batches(
    State(state): State<AppState>,
    auth: OperatorAuth,
    Query(query): Query<BatchListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PageParams::clamp(query.page, query.per_page);

    let rows = CommandRepository::new(state.pool.clone())
        .list_batches(auth.merchant_scope(), params.limit(), params.offset())
        .await?;

    let batches = rows
        .into_iter()
        .map(|row| BatchSummary {
            batch_id: row.batch_id,
            total: row.total,
            pending: row.pending,
            sent: row.sent,
            success: row.success,
            failed: row.failed,
            expired: row.expired,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
        .collect();

    Ok((
        StatusCode::OK,
        Json(BatchListResponse {
            ok: true,
            batches,
            page: params.page,
            per_page: params.per_page,
        }),
    ))
}

/// Per-command detail for one batch.
///
/// GET /api/commands/batches/:batch_id
pub async fn get_batch_detail(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    auth: OperatorAuth,
) -> Result<impl IntoResponse, ApiError> {
    let rows = CommandRepository::new(state.pool.clone())
        .list_by_batch(&batch_id, auth.merchant_scope())
        .await?;

    if rows.is_empty() {
        return Err(ApiError::NotFound("Batch not found".to_string()));
    }

    let commands: Vec<BatchCommandDetail> = rows
        .into_iter()
        .map(|row| BatchCommandDetail {
            command_id: row.command_id,
            device_no: row.device_no,
            device_id: row.device_id,
            command_type: row.command_type,
            channel: row.channel.parse().unwrap_or(CommandChannel::Legacy),
            status: row.status.parse().unwrap_or(CommandStatus::Pending),
            attempt_count: row.attempt_count,
            payload: row.payload,
            result_payload: row.result_payload,
            created_at: row.created_at,
            result_at: row.result_at,
        })
        .collect();

    let total = commands.len();

    Ok((
        StatusCode::OK,
        Json(BatchDetailResponse {
            ok: true,
            batch_id,
            commands,
            total,
        }),
    ))
}

/// Retry failed commands of a batch.
///
/// POST /api/commands/batches/:batch_id/retry
pub async fn retry_command_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    auth: OperatorAuth,
    request: Option<Json<RetryBatchRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let filter = if request.retry_all {
        RetryFilter::AllRetryable
    } else if !request.command_ids.is_empty() {
        RetryFilter::Ids(request.command_ids.clone())
    } else {
        RetryFilter::FailedOnly
    };

    let reset_ids = CommandRepository::new(state.pool.clone())
        .reset_for_retry(&batch_id, auth.merchant_scope(), &filter)
        .await?;

    if reset_ids.is_empty() {
        return Err(ApiError::NotFound("No commands to retry".to_string()));
    }

    record_commands_dispatched(reset_ids.len());
    state.dispatch.wake();

    let detail = serde_json::json!({
        "batch_id": batch_id,
        "retried_count": reset_ids.len(),
        "command_ids": reset_ids,
    });
    if let Err(e) = OperationLogRepository::new(state.pool.clone())
        .create(auth.user_id, "command_batch_retry", "batch", Some(batch_id.as_str()), Some(&detail))
        .await
    {
        warn!(batch_id = %batch_id, error = %e, "Failed to write operation log");
    }

    Ok((
        StatusCode::OK,
        Json(RetryBatchResponse {
            ok: true,
            retried_count: reset_ids.len(),
        }),
    ))
}
