//! Command result audit entity (database row mapping).
//!
//! Append-only: one row per device-reported outcome, kept even when the
//! referenced command row is unknown or already settled.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the command_results table.
#[derive(Debug, Clone, FromRow)]
pub struct CommandResultEntity {
    pub id: i64,
    pub command_id: String,
    pub device_id: i64,
    pub success: bool,
    pub message: Option<String>,
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
