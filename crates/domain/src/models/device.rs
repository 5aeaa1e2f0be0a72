//! Device domain models.
//!
//! Device lifecycle (enrollment, provisioning) is owned by the fleet
//! onboarding service; this backend reads device identity and merchant
//! scope, and flips online/offline presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Device presence/health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Fault,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Fault => "fault",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "fault" => Ok(Self::Fault),
            _ => Err(format!("Invalid device status: {}", s)),
        }
    }
}

/// Device domain model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Device {
    pub id: i64,
    pub device_no: String,
    pub merchant_id: i64,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Query parameters for the device listing endpoint.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct DeviceListQuery {
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<u32>,
    /// Filter by presence status.
    pub status: Option<DeviceStatus>,
    /// Substring match on device_no.
    #[validate(length(max = 64))]
    pub search: Option<String>,
}

/// Response for the device listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DeviceListResponse {
    pub ok: bool,
    pub devices: Vec<Device>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Response for the device detail endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DeviceDetailResponse {
    pub ok: bool,
    pub device: Device,
    /// Commands currently pending or sent for this device.
    pub active_commands: i64,
}
