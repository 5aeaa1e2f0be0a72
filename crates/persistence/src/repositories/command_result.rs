//! Command result audit repository.

use sqlx::PgPool;

use crate::entities::CommandResultEntity;

/// Repository for the append-only command result log.
#[derive(Debug, Clone)]
pub struct CommandResultRepository {
    pool: PgPool,
}

impl CommandResultRepository {
    /// Create a new command result repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one reported outcome.
    ///
    /// Written for every report, including duplicates and unknown command
    /// ids, so no device-reported outcome is ever lost.
    pub async fn create(
        &self,
        command_id: &str,
        device_id: i64,
        success: bool,
        message: Option<&str>,
        raw_payload: Option<&serde_json::Value>,
    ) -> Result<CommandResultEntity, sqlx::Error> {
        sqlx::query_as::<_, CommandResultEntity>(
            r#"
            INSERT INTO command_results (command_id, device_id, success, message, raw_payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, command_id, device_id, success, message, raw_payload, created_at
            "#,
        )
        .bind(command_id)
        .bind(device_id)
        .bind(success)
        .bind(message)
        .bind(raw_payload)
        .fetch_one(&self.pool)
        .await
    }
}
