//! Operation log repository.

use sqlx::PgPool;

use crate::entities::OperationLogEntity;

/// Repository for the operator action audit log.
#[derive(Debug, Clone)]
pub struct OperationLogRepository {
    pool: PgPool,
}

impl OperationLogRepository {
    /// Create a new operation log repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one operator action.
    pub async fn create(
        &self,
        user_id: i64,
        action: &str,
        target_type: &str,
        target_id: Option<&str>,
        detail: Option<&serde_json::Value>,
    ) -> Result<OperationLogEntity, sqlx::Error> {
        sqlx::query_as::<_, OperationLogEntity>(
            r#"
            INSERT INTO operation_logs (user_id, action, target_type, target_id, detail)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, action, target_type, target_id, detail, created_at
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(target_type)
        .bind(target_id)
        .bind(detail)
        .fetch_one(&self.pool)
        .await
    }
}
