//! Command domain models and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Command lifecycle status.
///
/// A command only moves forward: pending → sent → success/fail, with expiry
/// possible from either live state. Retry is the single sanctioned way back
/// to pending, and only from fail or expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Sent,
    Success,
    Fail,
    Expired,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Success => "success",
            Self::Fail => "fail",
            Self::Expired => "expired",
        }
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition(&self, next: CommandStatus) -> bool {
        use CommandStatus::*;
        matches!(
            (*self, next),
            (Pending, Sent)
                | (Pending, Success)
                | (Pending, Fail)
                | (Pending, Expired)
                | (Sent, Success)
                | (Sent, Fail)
                | (Sent, Expired)
                | (Fail, Pending)
                | (Expired, Pending)
        )
    }

    /// Whether the command has reached an end state (no further device
    /// reports are accepted).
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Fail | Self::Expired)
    }

    /// Whether an operator retry may reset this command to pending.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fail | Self::Expired)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "success" => Ok(Self::Success),
            "fail" => Ok(Self::Fail),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid command status: {}", s)),
        }
    }
}

/// Transport a command was issued over.
///
/// Legacy marks rows imported from the pre-unification schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandChannel {
    HttpPoll,
    Websocket,
    Legacy,
}

impl CommandChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpPoll => "http_poll",
            Self::Websocket => "websocket",
            Self::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CommandChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_poll" => Ok(Self::HttpPoll),
            "websocket" => Ok(Self::Websocket),
            "legacy" => Ok(Self::Legacy),
            _ => Err(format!("Invalid command channel: {}", s)),
        }
    }
}

/// Command domain model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Command {
    pub command_id: String,
    pub device_id: i64,
    pub command_type: String,
    pub channel: CommandChannel,
    pub payload: Option<serde_json::Value>,
    pub priority: i32,
    pub status: CommandStatus,
    pub issued_by: i64,
    pub batch_id: Option<String>,
    pub attempt_count: i32,
    pub result_payload: Option<serde_json::Value>,
    pub result_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Generates a new opaque command identifier.
pub fn new_command_id() -> String {
    format!("cmd-{}", Uuid::new_v4().simple())
}

/// Generates a new batch identifier, e.g. `batch-20250901-a3f91c`.
pub fn new_batch_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("batch-{}-{}", now.format("%Y%m%d"), &suffix[..6])
}

/// Request to dispatch a command to one or more devices.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct DispatchRequest {
    /// Target device numbers.
    #[validate(
        length(min = 1, max = 200, message = "device_ids must contain 1..=200 entries"),
        custom(function = "validate_device_nos")
    )]
    pub device_ids: Vec<String>,
    /// Firmware command tag, e.g. "reboot", "make_product".
    #[validate(custom(function = "validate_command_type"))]
    pub command_type: String,
    /// Opaque payload interpreted by the firmware.
    pub payload: Option<serde_json::Value>,
    /// Delivery priority; higher is delivered first.
    pub priority: Option<i32>,
    /// Seconds until the command expires if not completed.
    #[validate(range(min = 1, message = "timeout_seconds must be positive"))]
    pub timeout_seconds: Option<i64>,
    /// Free-text operator note, recorded in the operation log.
    pub note: Option<String>,
}

fn validate_command_type(command_type: &str) -> Result<(), ValidationError> {
    if shared::validation::is_valid_command_type(command_type) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_command_type"))
    }
}

fn validate_device_nos(device_ids: &[String]) -> Result<(), ValidationError> {
    if device_ids
        .iter()
        .all(|d| shared::validation::is_valid_device_no(d))
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_device_no"))
    }
}

/// Response for a dispatch request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatchResponse {
    pub ok: bool,
    pub batch_id: String,
    pub issued_count: usize,
}

/// Per-status counts for one batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchSummary {
    pub batch_id: String,
    pub total: i64,
    pub pending: i64,
    pub sent: i64,
    pub success: i64,
    pub failed: i64,
    pub expired: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Response for the batch listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchListResponse {
    pub ok: bool,
    pub batches: Vec<BatchSummary>,
    pub page: u32,
    pub per_page: u32,
}

/// One command inside a batch detail view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchCommandDetail {
    pub command_id: String,
    pub device_no: String,
    pub device_id: i64,
    pub command_type: String,
    pub channel: CommandChannel,
    pub status: CommandStatus,
    pub attempt_count: i32,
    pub payload: Option<serde_json::Value>,
    pub result_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub result_at: Option<DateTime<Utc>>,
}

/// Response for the batch detail endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchDetailResponse {
    pub ok: bool,
    pub batch_id: String,
    pub commands: Vec<BatchCommandDetail>,
    pub total: usize,
}

/// Request to retry commands within a batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryBatchRequest {
    /// Retry every failed or expired command in the batch.
    #[serde(default)]
    pub retry_all: bool,
    /// Retry only these command ids (still limited to retryable statuses).
    #[serde(default)]
    pub command_ids: Vec<String>,
}

/// Response for a batch retry request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryBatchResponse {
    pub ok: bool,
    pub retried_count: usize,
}

/// One command as returned to a polling device.
#[derive(Debug, Clone, Serialize)]
pub struct PendingCommandItem {
    pub command_id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    pub payload: serde_json::Value,
    pub issued_at: DateTime<Utc>,
}

/// Device-reported command outcome (HTTP path).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandResultReport {
    pub command_id: String,
    /// "success" or "fail".
    pub status: String,
    pub result_payload: Option<serde_json::Value>,
    pub result_at: Option<DateTime<Utc>>,
}

impl CommandResultReport {
    /// Parses the reported status into a terminal command status.
    pub fn terminal_status(&self) -> Result<CommandStatus, String> {
        match self.status.as_str() {
            "success" => Ok(CommandStatus::Success),
            "fail" | "failed" => Ok(CommandStatus::Fail),
            other => Err(format!("Invalid result status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            CommandStatus::Pending,
            CommandStatus::Sent,
            CommandStatus::Success,
            CommandStatus::Fail,
            CommandStatus::Expired,
        ] {
            assert_eq!(CommandStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(CommandStatus::from_str("running").is_err());
    }

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(CommandStatus::Pending.can_transition(CommandStatus::Sent));
        assert!(CommandStatus::Pending.can_transition(CommandStatus::Success));
        assert!(CommandStatus::Pending.can_transition(CommandStatus::Fail));
        assert!(CommandStatus::Sent.can_transition(CommandStatus::Success));
        assert!(CommandStatus::Sent.can_transition(CommandStatus::Fail));
        assert!(CommandStatus::Sent.can_transition(CommandStatus::Expired));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!CommandStatus::Success.can_transition(CommandStatus::Pending));
        assert!(!CommandStatus::Success.can_transition(CommandStatus::Fail));
        assert!(!CommandStatus::Sent.can_transition(CommandStatus::Pending));
        assert!(!CommandStatus::Fail.can_transition(CommandStatus::Success));
        assert!(!CommandStatus::Expired.can_transition(CommandStatus::Sent));
    }

    #[test]
    fn test_retry_transitions() {
        assert!(CommandStatus::Fail.can_transition(CommandStatus::Pending));
        assert!(CommandStatus::Expired.can_transition(CommandStatus::Pending));
        assert!(CommandStatus::Fail.is_retryable());
        assert!(CommandStatus::Expired.is_retryable());
        assert!(!CommandStatus::Success.is_retryable());
        assert!(!CommandStatus::Pending.is_retryable());
    }

    #[test]
    fn test_settled_statuses() {
        assert!(!CommandStatus::Pending.is_settled());
        assert!(!CommandStatus::Sent.is_settled());
        assert!(CommandStatus::Success.is_settled());
        assert!(CommandStatus::Fail.is_settled());
        assert!(CommandStatus::Expired.is_settled());
    }

    #[test]
    fn test_channel_roundtrip() {
        for channel in [
            CommandChannel::HttpPoll,
            CommandChannel::Websocket,
            CommandChannel::Legacy,
        ] {
            assert_eq!(CommandChannel::from_str(channel.as_str()).unwrap(), channel);
        }
        assert!(CommandChannel::from_str("mqtt").is_err());
    }

    #[test]
    fn test_command_id_shape() {
        let id = new_command_id();
        assert!(id.starts_with("cmd-"));
        assert_eq!(id.len(), 4 + 32);
        assert_ne!(new_command_id(), new_command_id());
    }

    #[test]
    fn test_batch_id_shape() {
        let now = Utc::now();
        let id = new_batch_id(now);
        assert!(id.starts_with(&format!("batch-{}-", now.format("%Y%m%d"))));
        assert_eq!(id.len(), "batch-20250901-".len() + 6);
    }

    #[test]
    fn test_dispatch_request_validation() {
        use validator::Validate;

        let request = DispatchRequest {
            device_ids: vec![],
            command_type: "reboot".to_string(),
            payload: None,
            priority: None,
            timeout_seconds: None,
            note: None,
        };
        assert!(request.validate().is_err());

        let request = DispatchRequest {
            device_ids: vec!["D001".to_string()],
            command_type: "reboot".to_string(),
            payload: Some(serde_json::json!({"delay": 5})),
            priority: Some(1),
            timeout_seconds: Some(600),
            note: Some("maintenance window".to_string()),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_dispatch_request_rejects_malformed_inputs() {
        use validator::Validate;

        let request = DispatchRequest {
            device_ids: vec!["d001 lowercase".to_string()],
            command_type: "reboot".to_string(),
            payload: None,
            priority: None,
            timeout_seconds: None,
            note: None,
        };
        assert!(request.validate().is_err());

        let request = DispatchRequest {
            device_ids: vec!["D001".to_string()],
            command_type: "Open Door".to_string(),
            payload: None,
            priority: None,
            timeout_seconds: None,
            note: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_result_report_terminal_status() {
        let report = CommandResultReport {
            command_id: "cmd-1".to_string(),
            status: "success".to_string(),
            result_payload: None,
            result_at: None,
        };
        assert_eq!(report.terminal_status().unwrap(), CommandStatus::Success);

        let report = CommandResultReport {
            status: "failed".to_string(),
            ..report
        };
        assert_eq!(report.terminal_status().unwrap(), CommandStatus::Fail);

        let report = CommandResultReport {
            command_id: "cmd-1".to_string(),
            status: "pending".to_string(),
            result_payload: None,
            result_at: None,
        };
        assert!(report.terminal_status().is_err());
    }

    #[test]
    fn test_pending_item_serializes_type_field() {
        let item = PendingCommandItem {
            command_id: "cmd-1".to_string(),
            command_type: "open_door".to_string(),
            payload: serde_json::json!({}),
            issued_at: Utc::now(),
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"type\":\"open_door\""));
    }
}
