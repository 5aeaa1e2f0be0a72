//! Operator-facing device read endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use persistence::entities::DeviceEntity;
use persistence::repositories::{CommandRepository, DeviceRepository};
use validator::Validate;

use domain::models::device::{Device, DeviceDetailResponse, DeviceListQuery, DeviceListResponse};
use domain::models::DeviceStatus;
use shared::pagination::PageParams;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OperatorAuth;

fn to_domain(entity: DeviceEntity) -> Device {
    Device {
        id: entity.id,
        device_no: entity.device_no,
        merchant_id: entity.merchant_id,
        model: entity.model,
        firmware_version: entity.firmware_version,
        status: entity.status.parse().unwrap_or(DeviceStatus::Offline),
        last_seen: entity.last_seen,
        created_at: entity.created_at,
    }
}

/// List devices within the operator's merchant scope.
///
/// GET /api/devices
pub async fn list_devices(
    State(state): State<AppState>,
    auth: OperatorAuth,
    Query(query): Query<DeviceListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    query.validate()?;

    let repo = DeviceRepository::new(state.pool.clone());
    let params = PageParams::clamp(query.page, query.per_page);
    let status = query.status.map(|s| s.as_str());
    let scope = auth.merchant_scope();

    let total = repo.count(scope, status, query.search.as_deref()).await?;
    let devices = repo
        .list(
            scope,
            status,
            query.search.as_deref(),
            params.limit(),
            params.offset(),
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(DeviceListResponse {
            ok: true,
            devices: devices.into_iter().map(to_domain).collect(),
            total,
            page: params.page,
            per_page: params.per_page,
        }),
    ))
}

/// Device detail with its live command count.
///
/// GET /api/devices/:device_no
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_no): Path<String>,
    auth: OperatorAuth,
) -> Result<impl IntoResponse, ApiError> {
    let device = DeviceRepository::new(state.pool.clone())
        .find_by_device_no(&device_no)
        .await?
        .filter(|d| {
            auth.merchant_scope()
                .map(|scope| d.merchant_id == scope)
                .unwrap_or(true)
        })
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))?;

    let active_commands = CommandRepository::new(state.pool.clone())
        .count_active_for_device(device.id)
        .await?;

    Ok((
        StatusCode::OK,
        Json(DeviceDetailResponse {
            ok: true,
            device: to_domain(device),
            active_commands,
        }),
    ))
}
