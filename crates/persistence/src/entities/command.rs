//! Command entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the commands table.
#[derive(Debug, Clone, FromRow)]
pub struct CommandEntity {
    pub id: i64,
    pub command_id: String,
    pub device_id: i64,
    pub command_type: String,
    pub channel: String,
    pub payload: Option<serde_json::Value>,
    pub priority: i32,
    pub status: String,
    pub issued_by: i64,
    pub batch_id: Option<String>,
    pub attempt_count: i32,
    pub result_payload: Option<serde_json::Value>,
    pub result_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregated per-batch status counts.
#[derive(Debug, Clone, FromRow)]
pub struct BatchSummaryRow {
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

/// An undelivered command joined with its target device number, as claimed
/// by the dispatch worker.
#[derive(Debug, Clone, FromRow)]
pub struct UndeliveredCommandRow {
    pub command_id: String,
    pub device_no: String,
    pub command_type: String,
    pub payload: Option<serde_json::Value>,
    pub priority: i32,
}

/// A command joined with its target device number, for batch detail views.
#[derive(Debug, Clone, FromRow)]
pub struct BatchCommandRow {
    pub command_id: String,
    pub device_no: String,
    pub device_id: i64,
    pub command_type: String,
    pub channel: String,
    pub status: String,
    pub attempt_count: i32,
    pub payload: Option<serde_json::Value>,
    pub result_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub result_at: Option<DateTime<Utc>>,
}
