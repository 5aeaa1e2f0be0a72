//! WebSocket wire protocol.
//!
//! Frames are JSON objects of the form `{"event": "...", "data": {...}}`.
//! Devices authenticate with their API key, admins with an operator JWT;
//! until authentication succeeds only auth events are accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Events a client (device or admin) may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Device authentication with its API key.
    DeviceAuth { api_key: String },
    /// Admin authentication with an operator JWT.
    AdminAuth { token: String },
    /// Device liveness ping.
    Heartbeat,
    /// Device-reported command outcome.
    DeviceCommandResult {
        command_id: String,
        #[serde(default = "default_true")]
        success: bool,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        message: Option<String>,
    },
    /// Admin-issued command for a single device.
    AdminSendCommand {
        device_no: String,
        command_type: String,
        #[serde(default)]
        payload: Option<serde_json::Value>,
        #[serde(default)]
        priority: i32,
        #[serde(default)]
        timeout_seconds: Option<i64>,
    },
}

/// Events the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection accepted, prior to authentication.
    Connected { server_time: DateTime<Utc> },
    /// Authentication succeeded.
    AuthSuccess {
        #[serde(skip_serializing_if = "Option::is_none")]
        device_no: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<i64>,
        message: String,
    },
    /// Authentication failed.
    AuthError { error: String },
    /// Command pushed to a device.
    NewCommand {
        command_id: String,
        #[serde(rename = "type")]
        command_type: String,
        payload: serde_json::Value,
        priority: i32,
    },
    /// Ack to an admin that their command was accepted for delivery.
    CommandSent { command_id: String },
    /// Ack to a device that its result report was processed.
    ResultReceived { command_id: String },
    /// Heartbeat acknowledgment.
    HeartbeatAck { timestamp: DateTime<Utc> },
    /// Currently connected devices, sent to admins on authentication.
    OnlineDevices { devices: Vec<String> },
    /// A device connected.
    DeviceOnline { device_no: String },
    /// A device disconnected.
    DeviceOffline { device_no: String },
    /// A device reported a command outcome (admin broadcast).
    CommandResult {
        device_no: String,
        command_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },
    /// Protocol or authorization error.
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_device_auth_deserialize() {
        let json = r#"{"event": "device_auth", "data": {"api_key": "bf_abc12345"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::DeviceAuth {
                api_key: "bf_abc12345".to_string()
            }
        );
    }

    #[test]
    fn test_client_event_heartbeat_deserialize() {
        let json = r#"{"event": "heartbeat"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, ClientEvent::Heartbeat);
    }

    #[test]
    fn test_client_event_result_defaults() {
        let json = r#"{"event": "device_command_result", "data": {"command_id": "cmd-1"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::DeviceCommandResult {
                command_id,
                success,
                result,
                message,
            } => {
                assert_eq!(command_id, "cmd-1");
                assert!(success);
                assert!(result.is_none());
                assert!(message.is_none());
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_client_event_admin_send_command_deserialize() {
        let json = r#"{
            "event": "admin_send_command",
            "data": {"device_no": "D001", "command_type": "open_door", "priority": 2}
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::AdminSendCommand {
                device_no,
                command_type,
                payload,
                priority,
                timeout_seconds,
            } => {
                assert_eq!(device_no, "D001");
                assert_eq!(command_type, "open_door");
                assert!(payload.is_none());
                assert_eq!(priority, 2);
                assert!(timeout_seconds.is_none());
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_client_event_unknown_rejected() {
        let json = r#"{"event": "reboot_server"}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_server_event_new_command_serializes_type_field() {
        let event = ServerEvent::NewCommand {
            command_id: "cmd-1".to_string(),
            command_type: "make_product".to_string(),
            payload: serde_json::json!({"product_id": 101}),
            priority: 0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"new_command\""));
        assert!(json.contains("\"type\":\"make_product\""));
    }

    #[test]
    fn test_server_event_auth_success_omits_absent_fields() {
        let event = ServerEvent::AuthSuccess {
            device_no: Some("D001".to_string()),
            user_id: None,
            message: "Device authenticated".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"device_no\":\"D001\""));
        assert!(!json.contains("user_id"));
    }
}
