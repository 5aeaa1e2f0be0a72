//! Device repository.
//!
//! The dispatch subsystem does not own device lifecycle; this repository
//! reads identity and merchant scope, touches presence, and resolves
//! WebSocket credentials.

use sqlx::PgPool;

use crate::entities::DeviceEntity;

const DEVICE_COLUMNS: &str = "id, device_no, merchant_id, model, firmware_version, status, \
     api_key_hash, last_seen, created_at, updated_at";

/// Repository for device reads and presence updates.
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    /// Create a new device repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a device by its unique device number.
    pub async fn find_by_device_no(
        &self,
        device_no: &str,
    ) -> Result<Option<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE device_no = $1"
        ))
        .bind(device_no)
        .fetch_optional(&self.pool)
        .await
    }

    /// Find a device by the SHA-256 hash of its API key (WebSocket auth).
    pub async fn find_by_api_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE api_key_hash = $1"
        ))
        .bind(api_key_hash)
        .fetch_optional(&self.pool)
        .await
    }

    /// Resolve dispatch targets: devices matching the given numbers, within
    /// the caller's merchant scope. Unknown numbers are silently absent from
    /// the result (partial success at the dispatch layer).
    pub async fn list_by_device_nos(
        &self,
        device_nos: &[String],
        merchant_scope: Option<i64>,
    ) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(&format!(
            r#"
            SELECT {DEVICE_COLUMNS}
            FROM devices
            WHERE device_no = ANY($1)
              AND ($2::BIGINT IS NULL OR merchant_id = $2)
            ORDER BY device_no ASC
            "#
        ))
        .bind(device_nos)
        .bind(merchant_scope)
        .fetch_all(&self.pool)
        .await
    }

    /// Update the device's last_seen timestamp.
    pub async fn touch_last_seen(&self, device_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE devices SET last_seen = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set the device presence status, touching last_seen as well.
    pub async fn set_status(&self, device_id: i64, status: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE devices
            SET status = $2, last_seen = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(device_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Merchant-scoped device listing with optional status filter and
    /// device_no substring search.
    pub async fn list(
        &self,
        merchant_scope: Option<i64>,
        status: Option<&str>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeviceEntity>, sqlx::Error> {
        sqlx::query_as::<_, DeviceEntity>(&format!(
            r#"
            SELECT {DEVICE_COLUMNS}
            FROM devices
            WHERE ($1::BIGINT IS NULL OR merchant_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TEXT IS NULL OR device_no ILIKE '%' || $3 || '%')
            ORDER BY device_no ASC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(merchant_scope)
        .bind(status)
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Count devices matching the listing filters.
    pub async fn count(
        &self,
        merchant_scope: Option<i64>,
        status: Option<&str>,
        search: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM devices
            WHERE ($1::BIGINT IS NULL OR merchant_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TEXT IS NULL OR device_no ILIKE '%' || $3 || '%')
            "#,
        )
        .bind(merchant_scope)
        .bind(status)
        .bind(search)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0)
    }
}
