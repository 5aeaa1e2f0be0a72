//! Command repository.
//!
//! The commands table doubles as the dispatch outbox: rows in status
//! `pending` are the work queue the background worker drains. Every status
//! UPDATE carries a predicate on the current status, so the lifecycle rules
//! encoded in `domain::models::command::CommandStatus` hold at the database
//! level even under concurrent writers.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use domain::models::command::new_command_id;

use crate::entities::{BatchCommandRow, BatchSummaryRow, CommandEntity, UndeliveredCommandRow};

const COMMAND_COLUMNS: &str = "id, command_id, device_id, command_type, channel, payload, \
     priority, status, issued_by, batch_id, attempt_count, result_payload, \
     result_at, sent_at, expires_at, created_at, updated_at";

/// Which commands of a batch an operator retry targets.
#[derive(Debug, Clone)]
pub enum RetryFilter {
    /// Every failed or expired command in the batch.
    AllRetryable,
    /// Only failed commands (the default when no ids are given).
    FailedOnly,
    /// Specific command ids, still limited to retryable statuses.
    Ids(Vec<String>),
}

/// Repository for command store operations.
#[derive(Debug, Clone)]
pub struct CommandRepository {
    pool: PgPool,
}

impl CommandRepository {
    /// Create a new command repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new pending command and return the stored row.
    ///
    /// Duplicate concurrent commands for the same device are allowed and not
    /// coalesced.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        device_id: i64,
        command_type: &str,
        channel: &str,
        payload: Option<&serde_json::Value>,
        priority: i32,
        issued_by: i64,
        batch_id: Option<&str>,
        ttl_secs: i64,
    ) -> Result<CommandEntity, sqlx::Error> {
        let command_id = new_command_id();
        let expires_at = Utc::now() + Duration::seconds(ttl_secs);

        sqlx::query_as::<_, CommandEntity>(&format!(
            r#"
            INSERT INTO commands (
                command_id, device_id, command_type, channel, payload,
                priority, status, issued_by, batch_id, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9)
            RETURNING {COMMAND_COLUMNS}
            "#
        ))
        .bind(&command_id)
        .bind(device_id)
        .bind(command_type)
        .bind(channel)
        .bind(payload)
        .bind(priority)
        .bind(issued_by)
        .bind(batch_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a command by id, scoped to one device.
    ///
    /// Used by result reconciliation so a device cannot complete another
    /// device's command.
    pub async fn find_for_device(
        &self,
        command_id: &str,
        device_id: i64,
    ) -> Result<Option<CommandEntity>, sqlx::Error> {
        sqlx::query_as::<_, CommandEntity>(&format!(
            "SELECT {COMMAND_COLUMNS} FROM commands WHERE command_id = $1 AND device_id = $2"
        ))
        .bind(command_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Commands a polling device should see: pending or sent, not expired,
    /// highest priority first, oldest first within a priority.
    pub async fn list_pending_for_device(
        &self,
        device_id: i64,
        limit: i64,
    ) -> Result<Vec<CommandEntity>, sqlx::Error> {
        sqlx::query_as::<_, CommandEntity>(&format!(
            r#"
            SELECT {COMMAND_COLUMNS}
            FROM commands
            WHERE device_id = $1
              AND status IN ('pending', 'sent')
              AND expires_at > NOW()
            ORDER BY priority DESC, created_at ASC
            LIMIT $2
            "#
        ))
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Outbox claim for the dispatch worker: pending commands joined with
    /// their device number for connection lookup.
    pub async fn list_undelivered(
        &self,
        limit: i64,
    ) -> Result<Vec<UndeliveredCommandRow>, sqlx::Error> {
        sqlx::query_as::<_, UndeliveredCommandRow>(
            r#"
            SELECT c.command_id, d.device_no, c.command_type, c.payload, c.priority
            FROM commands c
            JOIN devices d ON d.id = c.device_id
            WHERE c.status = 'pending'
              AND c.expires_at > NOW()
            ORDER BY c.priority DESC, c.created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Transition one command pending → sent.
    pub async fn mark_sent(&self, command_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = 'sent',
                sent_at = NOW(),
                attempt_count = attempt_count + 1,
                updated_at = NOW()
            WHERE command_id = $1 AND status = 'pending'
            "#,
        )
        .bind(command_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a set of commands pending → sent in one statement.
    ///
    /// Already-sent or settled commands in the set are left untouched.
    pub async fn mark_sent_many(&self, command_ids: &[String]) -> Result<u64, sqlx::Error> {
        if command_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = 'sent',
                sent_at = NOW(),
                attempt_count = attempt_count + 1,
                updated_at = NOW()
            WHERE command_id = ANY($1) AND status = 'pending'
            "#,
        )
        .bind(command_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Record a device-reported outcome: pending|sent → success|fail.
    ///
    /// Returns false when no live command matched, which covers unknown ids,
    /// other devices' commands, and settled commands whose first result is
    /// kept.
    pub async fn record_result(
        &self,
        command_id: &str,
        device_id: i64,
        status: &str,
        result_payload: Option<&serde_json::Value>,
        result_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = $3,
                result_payload = $4,
                result_at = COALESCE($5, NOW()),
                updated_at = NOW()
            WHERE command_id = $1
              AND device_id = $2
              AND status IN ('pending', 'sent')
              AND $3 IN ('success', 'fail')
            "#,
        )
        .bind(command_id)
        .bind(device_id)
        .bind(status)
        .bind(result_payload)
        .bind(result_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Per-batch status counts, newest batch first, scoped to a merchant
    /// unless `merchant_scope` is None.
    pub async fn list_batches(
        &self,
        merchant_scope: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BatchSummaryRow>, sqlx::Error> {
        sqlx::query_as::<_, BatchSummaryRow>(
            r#"
            SELECT c.batch_id,
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE c.status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE c.status = 'sent') AS sent,
                COUNT(*) FILTER (WHERE c.status = 'success') AS success,
                COUNT(*) FILTER (WHERE c.status = 'fail') AS failed,
                COUNT(*) FILTER (WHERE c.status = 'expired') AS expired,
                MIN(c.created_at) AS created_at,
                MAX(c.result_at) AS completed_at
            FROM commands c
            JOIN devices d ON d.id = c.device_id
            WHERE c.batch_id IS NOT NULL
              AND ($1::BIGINT IS NULL OR d.merchant_id = $1)
            GROUP BY c.batch_id
            ORDER BY MIN(c.created_at) DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(merchant_scope)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// All commands of one batch with their device numbers.
    pub async fn list_by_batch(
        &self,
        batch_id: &str,
        merchant_scope: Option<i64>,
    ) -> Result<Vec<BatchCommandRow>, sqlx::Error> {
        sqlx::query_as::<_, BatchCommandRow>(
            r#"
            SELECT c.command_id, d.device_no, c.device_id, c.command_type,
                c.channel, c.status, c.attempt_count, c.payload,
                c.result_payload, c.created_at, c.result_at
            FROM commands c
            JOIN devices d ON d.id = c.device_id
            WHERE c.batch_id = $1
              AND ($2::BIGINT IS NULL OR d.merchant_id = $2)
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(batch_id)
        .bind(merchant_scope)
        .fetch_all(&self.pool)
        .await
    }

    /// Reset matching fail/expired commands of a batch back to pending and
    /// return their ids. The caller re-enters them into the outbox.
    ///
    /// Commands outside the retryable statuses never match, regardless of
    /// the filter: success → pending is not a legal transition.
    pub async fn reset_for_retry(
        &self,
        batch_id: &str,
        merchant_scope: Option<i64>,
        filter: &RetryFilter,
    ) -> Result<Vec<String>, sqlx::Error> {
        let base = r#"
            UPDATE commands c
            SET status = 'pending',
                result_payload = NULL,
                result_at = NULL,
                sent_at = NULL,
                updated_at = NOW()
            FROM devices d
            WHERE c.device_id = d.id
              AND c.batch_id = $1
              AND ($2::BIGINT IS NULL OR d.merchant_id = $2)
        "#;

        let rows: Vec<(String,)> = match filter {
            RetryFilter::AllRetryable => {
                sqlx::query_as(&format!(
                    "{base} AND c.status IN ('fail', 'expired') RETURNING c.command_id"
                ))
                .bind(batch_id)
                .bind(merchant_scope)
                .fetch_all(&self.pool)
                .await?
            }
            RetryFilter::FailedOnly => {
                sqlx::query_as(&format!(
                    "{base} AND c.status = 'fail' RETURNING c.command_id"
                ))
                .bind(batch_id)
                .bind(merchant_scope)
                .fetch_all(&self.pool)
                .await?
            }
            RetryFilter::Ids(ids) => {
                sqlx::query_as(&format!(
                    "{base} AND c.status IN ('fail', 'expired') AND c.command_id = ANY($3) RETURNING c.command_id"
                ))
                .bind(batch_id)
                .bind(merchant_scope)
                .bind(ids)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Expire overdue live commands. Returns the number of rows touched.
    pub async fn expire_overdue(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE commands
            SET status = 'expired', updated_at = NOW()
            WHERE status IN ('pending', 'sent')
              AND expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Count live (pending or sent) commands for a device.
    pub async fn count_active_for_device(&self, device_id: i64) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM commands
            WHERE device_id = $1 AND status IN ('pending', 'sent')
            "#,
        )
        .bind(device_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0)
    }
}
