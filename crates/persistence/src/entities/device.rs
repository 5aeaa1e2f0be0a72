//! Device entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the devices table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceEntity {
    pub id: i64,
    pub device_no: String,
    pub merchant_id: i64,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub status: String,
    pub api_key_hash: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_entity_clone() {
        let entity = DeviceEntity {
            id: 1,
            device_no: "D001".to_string(),
            merchant_id: 7,
            model: Some("CM-500".to_string()),
            firmware_version: None,
            status: "offline".to_string(),
            api_key_hash: None,
            last_seen: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let cloned = entity.clone();
        assert_eq!(cloned.device_no, entity.device_no);
        assert_eq!(cloned.merchant_id, entity.merchant_id);
    }
}
